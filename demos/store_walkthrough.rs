use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use env_logger::Env;
use log::info;

use sesame::accreditation::{Status, ZoneAction};
use sesame::history::archiver::retention_cutoff;
use sesame::storage::types::{
    Actor, NewAccreditation, NewVehicle, ReturnRequest, StatusChange, TransferRequest, ZoneRecord,
};
use sesame::storage::{DatabaseStore, Store};

/// Walks one accreditation through a full day: submission, gate entry,
/// exit, transfer, return, then prints the audit trail and per-zone dwell
/// times. Run with `cargo run --example store_walkthrough`.
#[tokio::main]
async fn main() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();

    let out_dir: PathBuf = env::var("SESAME_DEMO_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            env::current_dir()
                .expect("cwd")
                .join("target")
                .join("store_walkthrough")
        });
    fs::create_dir_all(&out_dir).expect("create output dir");
    let db_path = out_dir.join("walkthrough.sqlite3");
    info!("Using database at {}", db_path.display());

    let store = Arc::new(DatabaseStore::open_file(&db_path).await.expect("open db"));
    let gate = Actor {
        user_name: Some("gate-terminal".to_string()),
        user_agent: None,
    };

    let (created, vehicles) = store
        .create_accreditation(
            NewAccreditation {
                company: "Acme Logistics".to_string(),
                stand: Some("A-12".to_string()),
                event_id: None,
                message: Some("Two pallets, rear unloading".to_string()),
                consent: true,
                email: Some("dispatch@acme.example".to_string()),
                vehicles: vec![NewVehicle {
                    plate: "AB-123-CD".to_string(),
                    trailer_plate: Some("TR-98-ZZ".to_string()),
                    size: "semi".to_string(),
                    phone_code: Some("+33".to_string()),
                    phone_number: Some("612345678".to_string()),
                    arrival_date: None,
                    arrival_time: Some("08:30".to_string()),
                    origin_city: Some("Lyon".to_string()),
                    unloading: vec!["rear".to_string()],
                    distance_km: Some(465.0),
                    weight_kg: Some(12_500.0),
                }],
            },
            Actor::default(),
        )
        .await
        .expect("create accreditation");
    info!(
        "Created {} for {} with {} vehicle(s), version {}",
        created.id,
        created.company,
        vehicles.len(),
        created.version
    );

    store
        .record_zone(
            created.id,
            ZoneRecord {
                zone: Some("staging".to_string()),
                action: ZoneAction::Entry,
            },
            gate.clone(),
        )
        .await
        .expect("enter staging");
    store
        .record_zone(
            created.id,
            ZoneRecord {
                zone: None,
                action: ZoneAction::Exit,
            },
            gate.clone(),
        )
        .await
        .expect("exit staging");
    store
        .transfer(
            created.id,
            TransferRequest {
                target_zone: "dock-3".to_string(),
                reason: Some("dock freed up".to_string()),
                version: None,
            },
            gate.clone(),
        )
        .await
        .expect("transfer to dock");
    store
        .set_status(
            created.id,
            StatusChange {
                status: Status::Sortie,
                version: None,
            },
            gate.clone(),
        )
        .await
        .expect("leave dock");

    let outcome = store
        .return_to_venue(
            created.id,
            ReturnRequest {
                zone: "dock-3".to_string(),
                vehicle_id: Some(vehicles[0].id),
            },
            gate.clone(),
        )
        .await
        .expect("return to venue");
    info!(
        "Returned to {} as step {} of the day",
        outcome.time_slot.zone, outcome.step_number
    );

    let totals = store
        .zone_time(created.id, None)
        .await
        .expect("zone dwell times");
    for (zone, ms) in &totals {
        info!("Time in {}: {} ms", zone, ms);
    }

    let trail = store.history(created.id).await.expect("history");
    info!("Audit trail ({} entries):", trail.len());
    for entry in &trail {
        info!(
            "  {} {:?} {}",
            entry.created_at, entry.action, entry.description
        );
    }

    let report = store
        .archive_history(retention_cutoff(Utc::now(), 13), 500)
        .await
        .expect("archive run");
    info!(
        "Archival pass: {} rows in {} batches (expected 0 on fresh data)",
        report.archived, report.batches
    );

    info!("Demo complete. Inspect the database at {}", db_path.display());
}
