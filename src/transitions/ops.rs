use chrono::{DateTime, Utc};
use log::{debug, info};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use uuid::Uuid;

use crate::accreditation::duplicates::{normalize_company, normalize_plate, DuplicateProbe};
use crate::accreditation::types::{Accreditation, Vehicle};
use crate::accreditation::{BulkAction, HistoryAction, Status, ZoneAction};
use crate::error_handling::types::OperationError;
use crate::storage::database_store::{
    accreditation_from_model, append_history, append_movement, fetch_accreditation,
    insert_vehicle, load_vehicles, slot_from_model, vehicle_from_model, HistoryRecord,
};
use crate::storage::db_entities::{accreditations, vehicle_time_slots, vehicles, zone_configs};
use crate::storage::types::{
    fmt_ts, today_str, Actor, BulkItemResult, BulkOutcome, BulkRequest, InfoUpdate,
    NewAccreditation, NewVehicle, ReturnOutcome, ReturnRequest, StatusChange, TransferRequest,
    ZoneRecord,
};

/// Fetch a row and enforce the optimistic version check when the caller
/// supplied one. A stale version fails before anything is written.
async fn fetch_checked<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    version: Option<i64>,
) -> Result<accreditations::Model, OperationError> {
    let model = fetch_accreditation(conn, id).await?;
    if let Some(seen) = version {
        if seen != model.version {
            return Err(OperationError::Conflict(format!(
                "version mismatch: client saw {}, stored is {}",
                seen, model.version
            )));
        }
    }
    Ok(model)
}

/// Start an update that bumps the version and refreshes `updated_at`.
fn touched(model: &accreditations::Model, now: DateTime<Utc>) -> accreditations::ActiveModel {
    let mut active: accreditations::ActiveModel = model.clone().into();
    active.version = Set(model.version + 1);
    active.updated_at = Set(fmt_ts(now));
    active
}

/// Zones are reference data: when the zone_configs table is populated,
/// client-supplied zones must exist in it. An empty table disables the
/// check (fresh deployments).
async fn ensure_known_zone<C: ConnectionTrait>(
    conn: &C,
    zone: &str,
) -> Result<(), OperationError> {
    if zone.trim().is_empty() {
        return Err(OperationError::Validation("zone must not be empty".into()));
    }
    let known = zone_configs::Entity::find().all(conn).await?;
    if !known.is_empty() && !known.iter().any(|z| z.name == zone) {
        return Err(OperationError::Validation(format!("unknown zone '{}'", zone)));
    }
    Ok(())
}

fn validate_vehicle(input: &NewVehicle) -> Result<(), OperationError> {
    if input.plate.trim().is_empty() {
        return Err(OperationError::Validation("vehicle plate is required".into()));
    }
    if input.size.trim().is_empty() {
        return Err(OperationError::Validation("vehicle size is required".into()));
    }
    Ok(())
}

/// Create an accreditation and its vehicles atomically. New submissions
/// start as NOUVEAU.
pub async fn create_accreditation(
    conn: &DatabaseConnection,
    input: NewAccreditation,
    actor: &Actor,
) -> Result<(Accreditation, Vec<Vehicle>), OperationError> {
    if input.company.trim().is_empty() {
        return Err(OperationError::Validation("company is required".into()));
    }
    if input.vehicles.is_empty() {
        return Err(OperationError::Validation(
            "at least one vehicle is required".into(),
        ));
    }
    for vehicle in &input.vehicles {
        validate_vehicle(vehicle)?;
    }

    let now = Utc::now();
    let id = Uuid::new_v4();
    let txn = conn.begin().await?;
    let model = accreditations::ActiveModel {
        id: Set(id.to_string()),
        created_at: Set(fmt_ts(now)),
        updated_at: Set(fmt_ts(now)),
        version: Set(1),
        company: Set(input.company.trim().to_string()),
        stand: Set(input.stand),
        event_id: Set(input.event_id.map(|e| e.to_string())),
        message: Set(input.message),
        consent: Set(input.consent),
        status: Set(Status::Nouveau.as_str().to_string()),
        current_zone: Set(None),
        entry_at: Set(None),
        exit_at: Set(None),
        is_archived: Set(false),
        email: Set(input.email),
        sent_at: Set(None),
    }
    .insert(&txn)
    .await?;
    for vehicle in input.vehicles {
        insert_vehicle(&txn, id, vehicle).await?;
    }
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::Created,
            field: None,
            old_value: None,
            new_value: None,
            description: format!("Accreditation created for {}", model.company),
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    info!("accreditation {} created ({})", id, model.company);

    let vehicles = load_vehicles(conn, id).await?;
    Ok((accreditation_from_model(model)?, vehicles))
}

/// Change the lifecycle status, optionally version-checked.
pub async fn set_status(
    conn: &DatabaseConnection,
    id: Uuid,
    change: StatusChange,
    actor: &Actor,
) -> Result<Accreditation, OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_checked(&txn, id, change.version).await?;
    let old_status = model.status.clone();
    let mut active = touched(&model, now);
    active.status = Set(change.status.as_str().to_string());
    match change.status {
        Status::Entree if model.entry_at.is_none() => active.entry_at = Set(Some(fmt_ts(now))),
        Status::Sortie => active.exit_at = Set(Some(fmt_ts(now))),
        _ => {}
    }
    let updated = active.update(&txn).await?;
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::StatusChanged,
            field: Some("status".into()),
            old_value: Some(old_status.clone()),
            new_value: Some(change.status.as_str().to_string()),
            description: format!(
                "Status changed from {} to {}",
                old_status,
                change.status.as_str()
            ),
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    Ok(accreditation_from_model(updated)?)
}

/// Record a plain zone entry or exit. Not version-checked: the gate posts
/// from low-contention terminals and always wants the write to land.
pub async fn record_zone(
    conn: &DatabaseConnection,
    id: Uuid,
    record: ZoneRecord,
    actor: &Actor,
) -> Result<Accreditation, OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_accreditation(&txn, id).await?;
    let updated = match record.action {
        ZoneAction::Entry => {
            let zone = record
                .zone
                .ok_or_else(|| OperationError::Validation("zone is required for entry".into()))?;
            ensure_known_zone(&txn, &zone).await?;
            let mut active = touched(&model, now);
            active.current_zone = Set(Some(zone.clone()));
            active.status = Set(Status::Entree.as_str().to_string());
            active.entry_at = Set(Some(fmt_ts(now)));
            let updated = active.update(&txn).await?;
            append_movement(
                &txn,
                id,
                model.current_zone.clone(),
                zone.clone(),
                ZoneAction::Entry,
                actor,
                now,
            )
            .await?;
            append_history(
                &txn,
                HistoryRecord {
                    accreditation_id: id,
                    action: HistoryAction::ZoneChanged,
                    field: Some("currentZone".into()),
                    old_value: model.current_zone.clone(),
                    new_value: Some(zone.clone()),
                    description: format!("Vehicle entered zone {}", zone),
                },
                actor,
                now,
            )
            .await?;
            updated
        }
        ZoneAction::Exit => {
            let occupied = model.current_zone.clone().ok_or_else(|| {
                OperationError::Conflict("vehicle is not currently in a zone".into())
            })?;
            if let Some(requested) = &record.zone {
                if requested != &occupied {
                    return Err(OperationError::Conflict(format!(
                        "vehicle is in zone {}, not {}",
                        occupied, requested
                    )));
                }
            }
            let mut active = touched(&model, now);
            active.current_zone = Set(None);
            active.status = Set(Status::Sortie.as_str().to_string());
            active.exit_at = Set(Some(fmt_ts(now)));
            let updated = active.update(&txn).await?;
            append_movement(
                &txn,
                id,
                Some(occupied.clone()),
                occupied.clone(),
                ZoneAction::Exit,
                actor,
                now,
            )
            .await?;
            append_history(
                &txn,
                HistoryRecord {
                    accreditation_id: id,
                    action: HistoryAction::ZoneChanged,
                    field: Some("currentZone".into()),
                    old_value: Some(occupied.clone()),
                    new_value: None,
                    description: format!("Vehicle exited zone {}", occupied),
                },
                actor,
                now,
            )
            .await?;
            updated
        }
        ZoneAction::Transfer => {
            return Err(OperationError::Validation(
                "transfers go through the transfer operation".into(),
            ));
        }
    };
    txn.commit().await?;
    Ok(accreditation_from_model(updated)?)
}

/// Move a vehicle between zones. Requires status SORTIE; the target must
/// differ from the current zone. On success the accreditation waits in
/// the new zone (ATTENTE).
pub async fn transfer(
    conn: &DatabaseConnection,
    id: Uuid,
    request: TransferRequest,
    actor: &Actor,
) -> Result<Accreditation, OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_checked(&txn, id, request.version).await?;
    if model.status != Status::Sortie.as_str() {
        return Err(OperationError::Validation(format!(
            "transfer requires status SORTIE, current is {}",
            model.status
        )));
    }
    if model.current_zone.as_deref() == Some(request.target_zone.as_str()) {
        return Err(OperationError::Conflict(format!(
            "vehicle is already in zone {}",
            request.target_zone
        )));
    }
    ensure_known_zone(&txn, &request.target_zone).await?;

    let mut active = touched(&model, now);
    active.current_zone = Set(Some(request.target_zone.clone()));
    active.status = Set(Status::Attente.as_str().to_string());
    let updated = active.update(&txn).await?;
    append_movement(
        &txn,
        id,
        model.current_zone.clone(),
        request.target_zone.clone(),
        ZoneAction::Transfer,
        actor,
        now,
    )
    .await?;
    let description = match &request.reason {
        Some(reason) => format!(
            "Transferred to zone {} ({})",
            request.target_zone, reason
        ),
        None => format!("Transferred to zone {}", request.target_zone),
    };
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::ZoneTransfer,
            field: Some("currentZone".into()),
            old_value: model.current_zone.clone(),
            new_value: Some(request.target_zone.clone()),
            description,
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    debug!("accreditation {} transferred to {}", id, request.target_zone);
    Ok(accreditation_from_model(updated)?)
}

/// Re-admit a vehicle that has left (SORTIE): allocate the next step
/// number for today, open a time slot, and flip the row back to ENTREE.
pub async fn return_to_venue(
    conn: &DatabaseConnection,
    id: Uuid,
    request: ReturnRequest,
    actor: &Actor,
) -> Result<ReturnOutcome, OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_accreditation(&txn, id).await?;
    if model.status != Status::Sortie.as_str() {
        return Err(OperationError::Validation(format!(
            "return requires status SORTIE, current is {}",
            model.status
        )));
    }
    ensure_known_zone(&txn, &request.zone).await?;

    let today = today_str(now);
    let mut slot_query = vehicle_time_slots::Entity::find()
        .filter(vehicle_time_slots::Column::AccreditationId.eq(id.to_string()))
        .filter(vehicle_time_slots::Column::Date.eq(today.clone()));
    slot_query = match &request.vehicle_id {
        Some(vehicle_id) => {
            slot_query.filter(vehicle_time_slots::Column::VehicleId.eq(vehicle_id.to_string()))
        }
        None => slot_query.filter(vehicle_time_slots::Column::VehicleId.is_null()),
    };
    let existing = slot_query.all(&txn).await?;
    // Steps are never renumbered: always previous max + 1.
    let step_number = existing.iter().map(|s| s.step_number).max().unwrap_or(0) + 1;

    let slot = vehicle_time_slots::ActiveModel {
        accreditation_id: Set(id.to_string()),
        vehicle_id: Set(request.vehicle_id.map(|v| v.to_string())),
        date: Set(today),
        step_number: Set(step_number),
        zone: Set(request.zone.clone()),
        entry_at: Set(fmt_ts(now)),
        exit_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mut active = touched(&model, now);
    active.status = Set(Status::Entree.as_str().to_string());
    active.current_zone = Set(Some(request.zone.clone()));
    active.entry_at = Set(Some(fmt_ts(now)));
    active.exit_at = Set(None);
    active.update(&txn).await?;

    append_movement(
        &txn,
        id,
        model.current_zone.clone(),
        request.zone.clone(),
        ZoneAction::Entry,
        actor,
        now,
    )
    .await?;
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::ZoneChanged,
            field: Some("currentZone".into()),
            old_value: model.current_zone.clone(),
            new_value: Some(request.zone.clone()),
            description: format!(
                "Vehicle returned to zone {} (step {})",
                request.zone, step_number
            ),
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;

    Ok(ReturnOutcome {
        time_slot: slot_from_model(slot)?,
        step_number,
    })
}

/// Flip the archived flag. Rows are never hard-deleted.
pub async fn set_archived(
    conn: &DatabaseConnection,
    id: Uuid,
    archive: bool,
    actor: &Actor,
) -> Result<Accreditation, OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_accreditation(&txn, id).await?;
    let mut active = touched(&model, now);
    active.is_archived = Set(archive);
    let updated = active.update(&txn).await?;
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::Archived,
            field: Some("isArchived".into()),
            old_value: Some(model.is_archived.to_string()),
            new_value: Some(archive.to_string()),
            description: if archive {
                "Accreditation archived".into()
            } else {
                "Accreditation unarchived".into()
            },
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    Ok(accreditation_from_model(updated)?)
}

/// Edit info fields. Only supplied fields are written; the history row
/// carries the per-field diff when exactly one field changed.
pub async fn update_info(
    conn: &DatabaseConnection,
    id: Uuid,
    update: InfoUpdate,
    actor: &Actor,
) -> Result<Accreditation, OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_checked(&txn, id, update.version).await?;

    let mut diffs: Vec<(&'static str, Option<String>, Option<String>)> = Vec::new();
    let mut active = touched(&model, now);
    if let Some(company) = update.company {
        if company.trim().is_empty() {
            return Err(OperationError::Validation("company must not be empty".into()));
        }
        diffs.push(("company", Some(model.company.clone()), Some(company.clone())));
        active.company = Set(company);
    }
    if let Some(stand) = update.stand {
        diffs.push(("stand", model.stand.clone(), Some(stand.clone())));
        active.stand = Set(Some(stand));
    }
    if let Some(message) = update.message {
        diffs.push(("message", model.message.clone(), Some(message.clone())));
        active.message = Set(Some(message));
    }
    if let Some(email) = update.email {
        diffs.push(("email", model.email.clone(), Some(email.clone())));
        active.email = Set(Some(email));
    }
    if diffs.is_empty() {
        return Err(OperationError::Validation("no fields to update".into()));
    }

    let updated = active.update(&txn).await?;
    let changed: Vec<&'static str> = diffs.iter().map(|(name, _, _)| *name).collect();
    let description = format!("Updated {}", changed.join(", "));
    let (field, old_value, new_value) = if diffs.len() == 1 {
        let (name, old, new) = diffs.remove(0);
        (Some(name.to_string()), old, new)
    } else {
        (None, None, None)
    };
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::InfoUpdated,
            field,
            old_value,
            new_value,
            description,
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    Ok(accreditation_from_model(updated)?)
}

pub async fn add_vehicle(
    conn: &DatabaseConnection,
    id: Uuid,
    vehicle: NewVehicle,
    actor: &Actor,
) -> Result<Vehicle, OperationError> {
    validate_vehicle(&vehicle)?;
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_accreditation(&txn, id).await?;
    let inserted = insert_vehicle(&txn, id, vehicle).await?;
    touched(&model, now).update(&txn).await?;
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::VehicleAdded,
            field: None,
            old_value: None,
            new_value: Some(inserted.plate.clone()),
            description: format!("Vehicle {} added", inserted.plate),
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    Ok(vehicle_from_model(inserted)?)
}

pub async fn update_vehicle(
    conn: &DatabaseConnection,
    id: Uuid,
    vehicle_id: Uuid,
    vehicle: NewVehicle,
    actor: &Actor,
) -> Result<Vehicle, OperationError> {
    validate_vehicle(&vehicle)?;
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_accreditation(&txn, id).await?;
    let existing = vehicles::Entity::find_by_id(vehicle_id.to_string())
        .one(&txn)
        .await?
        .filter(|v| v.accreditation_id == id.to_string())
        .ok_or(OperationError::NotFound)?;
    let old_plate = existing.plate.clone();

    let unloading = serde_json::to_string(&vehicle.unloading)
        .map_err(|_| OperationError::Validation("unloading is not serializable".into()))?;
    let mut active: vehicles::ActiveModel = existing.into();
    active.plate = Set(vehicle.plate.trim().to_string());
    active.trailer_plate = Set(vehicle.trailer_plate);
    active.size = Set(vehicle.size.trim().to_string());
    active.phone_code = Set(vehicle.phone_code);
    active.phone_number = Set(vehicle.phone_number);
    active.arrival_date = Set(vehicle.arrival_date);
    active.arrival_time = Set(vehicle.arrival_time);
    active.origin_city = Set(vehicle.origin_city);
    active.unloading = Set(unloading);
    active.distance_km = Set(vehicle.distance_km);
    active.weight_kg = Set(vehicle.weight_kg);
    let updated = active.update(&txn).await?;

    touched(&model, now).update(&txn).await?;
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::VehicleUpdated,
            field: Some("plate".into()),
            old_value: Some(old_plate),
            new_value: Some(updated.plate.clone()),
            description: format!("Vehicle {} updated", updated.plate),
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    Ok(vehicle_from_model(updated)?)
}

pub async fn remove_vehicle(
    conn: &DatabaseConnection,
    id: Uuid,
    vehicle_id: Uuid,
    actor: &Actor,
) -> Result<(), OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_accreditation(&txn, id).await?;
    let existing = vehicles::Entity::find_by_id(vehicle_id.to_string())
        .one(&txn)
        .await?
        .filter(|v| v.accreditation_id == id.to_string())
        .ok_or(OperationError::NotFound)?;
    let owned = vehicles::Entity::find()
        .filter(vehicles::Column::AccreditationId.eq(id.to_string()))
        .all(&txn)
        .await?;
    // An accreditation always keeps at least one vehicle.
    if owned.len() <= 1 {
        return Err(OperationError::Conflict(
            "cannot remove the last vehicle".into(),
        ));
    }
    vehicles::Entity::delete_by_id(existing.id.clone())
        .exec(&txn)
        .await?;
    touched(&model, now).update(&txn).await?;
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::VehicleRemoved,
            field: None,
            old_value: Some(existing.plate.clone()),
            new_value: None,
            description: format!("Vehicle {} removed", existing.plate),
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    Ok(())
}

pub async fn mark_email_sent(
    conn: &DatabaseConnection,
    id: Uuid,
    actor: &Actor,
) -> Result<Accreditation, OperationError> {
    let now = Utc::now();
    let txn = conn.begin().await?;
    let model = fetch_accreditation(&txn, id).await?;
    let mut active = touched(&model, now);
    active.sent_at = Set(Some(fmt_ts(now)));
    let updated = active.update(&txn).await?;
    append_history(
        &txn,
        HistoryRecord {
            accreditation_id: id,
            action: HistoryAction::EmailSent,
            field: None,
            old_value: None,
            new_value: model.email.clone(),
            description: "Notification email sent".into(),
        },
        actor,
        now,
    )
    .await?;
    txn.commit().await?;
    Ok(accreditation_from_model(updated)?)
}

/// Best-effort fan-out: each identifier is processed in its own
/// transaction; one failure never aborts its siblings.
pub async fn bulk_apply(
    conn: &DatabaseConnection,
    request: BulkRequest,
    actor: &Actor,
) -> Result<BulkOutcome, OperationError> {
    let action = BulkAction::parse(&request.action).ok_or_else(|| {
        OperationError::Validation(format!("unknown bulk action '{}'", request.action))
    })?;
    let mut results = Vec::with_capacity(request.ids.len());
    let mut succeeded = 0;
    for id in &request.ids {
        let outcome = match action {
            BulkAction::Status(status) => set_status(
                conn,
                *id,
                StatusChange {
                    status,
                    version: None,
                },
                actor,
            )
            .await
            .map(|_| ()),
            BulkAction::Archive => set_archived(conn, *id, true, actor).await.map(|_| ()),
            BulkAction::Unarchive => set_archived(conn, *id, false, actor).await.map(|_| ()),
        };
        match outcome {
            Ok(()) => {
                succeeded += 1;
                results.push(BulkItemResult {
                    id: *id,
                    ok: true,
                    error: None,
                });
            }
            Err(err) => results.push(BulkItemResult {
                id: *id,
                ok: false,
                error: Some(err.to_string()),
            }),
        }
    }
    let total = request.ids.len();
    info!(
        "bulk {}: {} of {} succeeded",
        request.action, succeeded, total
    );
    Ok(BulkOutcome {
        total,
        succeeded,
        failed: total - succeeded,
        results,
    })
}

/// Soft duplicate detection for public submissions. Company names compare
/// case-insensitively; plates compare after stripping punctuation. Returns
/// the candidates so the submitter can confirm, never a hard rejection.
pub async fn find_duplicates(
    conn: &DatabaseConnection,
    probe: DuplicateProbe,
) -> Result<Vec<Accreditation>, OperationError> {
    let company = normalize_company(&probe.company);
    let plate = normalize_plate(&probe.plate);
    if company.is_empty() || plate.is_empty() {
        return Err(OperationError::Validation(
            "company and plate are required".into(),
        ));
    }
    let trailer = probe
        .trailer_plate
        .as_deref()
        .map(normalize_plate)
        .filter(|t| !t.is_empty());

    let candidates = accreditations::Entity::find()
        .filter(accreditations::Column::IsArchived.eq(false))
        .all(conn)
        .await?;
    let mut matches = Vec::new();
    for model in candidates {
        if normalize_company(&model.company) != company {
            continue;
        }
        let owned = vehicles::Entity::find()
            .filter(vehicles::Column::AccreditationId.eq(model.id.clone()))
            .all(conn)
            .await?;
        let plate_match = owned.iter().any(|v| normalize_plate(&v.plate) == plate);
        let trailer_match = match &trailer {
            Some(wanted) => owned.iter().any(|v| {
                v.trailer_plate
                    .as_deref()
                    .map(normalize_plate)
                    .as_deref()
                    == Some(wanted.as_str())
            }),
            None => true,
        };
        if plate_match && trailer_match {
            matches.push(accreditation_from_model(model)?);
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db_entities::{accreditation_history, zone_movements};
    use crate::storage::{DatabaseStore, Store};

    fn vehicle(plate: &str) -> NewVehicle {
        NewVehicle {
            plate: plate.to_string(),
            trailer_plate: None,
            size: "semi".to_string(),
            phone_code: None,
            phone_number: None,
            arrival_date: None,
            arrival_time: None,
            origin_city: None,
            unloading: Vec::new(),
            distance_km: None,
            weight_kg: None,
        }
    }

    fn submission(company: &str, plate: &str) -> NewAccreditation {
        NewAccreditation {
            company: company.to_string(),
            stand: None,
            event_id: None,
            message: None,
            consent: true,
            email: Some("ops@example.test".to_string()),
            vehicles: vec![vehicle(plate)],
        }
    }

    async fn memory_store() -> DatabaseStore {
        DatabaseStore::in_memory().await.unwrap()
    }

    async fn seed(store: &DatabaseStore) -> Uuid {
        let (created, _) = store
            .create_accreditation(submission("Acme", "AB-123-CD"), Actor::default())
            .await
            .unwrap();
        created.id
    }

    async fn history_count(store: &DatabaseStore, id: Uuid) -> usize {
        accreditation_history::Entity::find()
            .filter(accreditation_history::Column::AccreditationId.eq(id.to_string()))
            .all(store.connection())
            .await
            .unwrap()
            .len()
    }

    async fn movement_count(store: &DatabaseStore, id: Uuid) -> usize {
        zone_movements::Entity::find()
            .filter(zone_movements::Column::AccreditationId.eq(id.to_string()))
            .all(store.connection())
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_create_requires_vehicles_and_plate() {
        let store = memory_store().await;
        let mut no_vehicles = submission("Acme", "AB-123-CD");
        no_vehicles.vehicles.clear();
        assert!(matches!(
            store
                .create_accreditation(no_vehicles, Actor::default())
                .await,
            Err(OperationError::Validation(_))
        ));

        let mut blank_plate = submission("Acme", "AB-123-CD");
        blank_plate.vehicles[0].plate = "  ".to_string();
        assert!(matches!(
            store
                .create_accreditation(blank_plate, Actor::default())
                .await,
            Err(OperationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_version_increments_and_stale_version_conflicts() {
        let store = memory_store().await;
        let id = seed(&store).await;

        let updated = store
            .set_status(
                id,
                StatusChange {
                    status: Status::Attente,
                    version: Some(1),
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        // Replaying the old version must fail and leave the row untouched.
        let stale = store
            .set_status(
                id,
                StatusChange {
                    status: Status::Refus,
                    version: Some(1),
                },
                Actor::default(),
            )
            .await;
        assert!(matches!(stale, Err(OperationError::Conflict(_))));
        let (current, _) = store.get_accreditation(id).await.unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.status, Status::Attente);
    }

    #[tokio::test]
    async fn test_set_status_timestamps() {
        let store = memory_store().await;
        let id = seed(&store).await;
        let entered = store
            .set_status(
                id,
                StatusChange {
                    status: Status::Entree,
                    version: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert!(entered.entry_at.is_some());

        let exited = store
            .set_status(
                id,
                StatusChange {
                    status: Status::Sortie,
                    version: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert!(exited.exit_at.is_some());
    }

    #[tokio::test]
    async fn test_transfer_requires_sortie_and_different_zone() {
        let store = memory_store().await;
        let id = seed(&store).await;

        let wrong_status = store
            .transfer(
                id,
                TransferRequest {
                    target_zone: "staging".into(),
                    reason: None,
                    version: None,
                },
                Actor::default(),
            )
            .await;
        assert!(matches!(wrong_status, Err(OperationError::Validation(_))));

        store
            .record_zone(
                id,
                ZoneRecord {
                    zone: Some("staging".into()),
                    action: ZoneAction::Entry,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        store
            .record_zone(
                id,
                ZoneRecord {
                    zone: None,
                    action: ZoneAction::Exit,
                },
                Actor::default(),
            )
            .await
            .unwrap();

        // current_zone is cleared on exit, so transferring into any zone
        // is allowed; same-zone rejection needs an occupied zone.
        let before_history = history_count(&store, id).await;
        let before_movements = movement_count(&store, id).await;
        let transferred = store
            .transfer(
                id,
                TransferRequest {
                    target_zone: "venue".into(),
                    reason: Some("dock free".into()),
                    version: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert_eq!(transferred.status, Status::Attente);
        assert_eq!(transferred.current_zone.as_deref(), Some("venue"));
        assert_eq!(history_count(&store, id).await, before_history + 1);
        assert_eq!(movement_count(&store, id).await, before_movements + 1);

        let same_zone = store
            .set_status(
                id,
                StatusChange {
                    status: Status::Sortie,
                    version: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert_eq!(same_zone.current_zone.as_deref(), Some("venue"));
        let rejected = store
            .transfer(
                id,
                TransferRequest {
                    target_zone: "venue".into(),
                    reason: None,
                    version: None,
                },
                Actor::default(),
            )
            .await;
        assert!(matches!(rejected, Err(OperationError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_return_to_venue_step_numbering() {
        let store = memory_store().await;
        let id = seed(&store).await;
        store
            .set_status(
                id,
                StatusChange {
                    status: Status::Sortie,
                    version: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();

        let first = store
            .return_to_venue(
                id,
                ReturnRequest {
                    zone: "venue".into(),
                    vehicle_id: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert_eq!(first.step_number, 1);
        assert_eq!(first.time_slot.zone, "venue");
        assert!(first.time_slot.exit_at.is_none());

        let (after_first, _) = store.get_accreditation(id).await.unwrap();
        assert_eq!(after_first.status, Status::Entree);
        assert!(after_first.entry_at.is_some());
        assert!(after_first.exit_at.is_none());

        store
            .set_status(
                id,
                StatusChange {
                    status: Status::Sortie,
                    version: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        let second = store
            .return_to_venue(
                id,
                ReturnRequest {
                    zone: "venue".into(),
                    vehicle_id: None,
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert_eq!(second.step_number, 2);
    }

    #[tokio::test]
    async fn test_return_requires_sortie() {
        let store = memory_store().await;
        let id = seed(&store).await;
        let refused = store
            .return_to_venue(
                id,
                ReturnRequest {
                    zone: "venue".into(),
                    vehicle_id: None,
                },
                Actor::default(),
            )
            .await;
        assert!(matches!(refused, Err(OperationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_bulk_isolates_failures() {
        let store = memory_store().await;
        let first = seed(&store).await;
        let (second, _) = store
            .create_accreditation(submission("Globex", "EF-456-GH"), Actor::default())
            .await
            .unwrap();
        let missing = Uuid::new_v4();

        let outcome = store
            .bulk_apply(
                BulkRequest {
                    ids: vec![first, missing, second.id],
                    action: "REFUS".into(),
                },
                Actor::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        let failed_item = outcome.results.iter().find(|r| !r.ok).unwrap();
        assert_eq!(failed_item.id, missing);

        let (a, _) = store.get_accreditation(first).await.unwrap();
        let (b, _) = store.get_accreditation(second.id).await.unwrap();
        assert_eq!(a.status, Status::Refus);
        assert_eq!(b.status, Status::Refus);
    }

    #[tokio::test]
    async fn test_bulk_rejects_unknown_action() {
        let store = memory_store().await;
        let id = seed(&store).await;
        let rejected = store
            .bulk_apply(
                BulkRequest {
                    ids: vec![id],
                    action: "EXPLODE".into(),
                },
                Actor::default(),
            )
            .await;
        assert!(matches!(rejected, Err(OperationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_vehicle_lifecycle_writes_history() {
        let store = memory_store().await;
        let id = seed(&store).await;
        let before = history_count(&store, id).await;

        let added = store
            .add_vehicle(id, vehicle("XY-999-ZZ"), Actor::default())
            .await
            .unwrap();
        let mut edited = vehicle("XY-000-AA");
        edited.origin_city = Some("Lyon".to_string());
        let updated = store
            .update_vehicle(id, added.id, edited, Actor::default())
            .await
            .unwrap();
        assert_eq!(updated.plate, "XY-000-AA");
        store
            .remove_vehicle(id, added.id, Actor::default())
            .await
            .unwrap();
        assert_eq!(history_count(&store, id).await, before + 3);

        let (current, vehicles_left) = store.get_accreditation(id).await.unwrap();
        assert_eq!(vehicles_left.len(), 1);
        // Three aggregate mutations, three version bumps.
        assert_eq!(current.version, 4);
    }

    #[tokio::test]
    async fn test_remove_last_vehicle_rejected() {
        let store = memory_store().await;
        let id = seed(&store).await;
        let (_, vehicles_owned) = store.get_accreditation(id).await.unwrap();
        let rejected = store
            .remove_vehicle(id, vehicles_owned[0].id, Actor::default())
            .await;
        assert!(matches!(rejected, Err(OperationError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_info_records_single_field_diff() {
        let store = memory_store().await;
        let id = seed(&store).await;
        store
            .update_info(
                id,
                InfoUpdate {
                    stand: Some("B-7".to_string()),
                    ..Default::default()
                },
                Actor::default(),
            )
            .await
            .unwrap();
        let entries = store.history(id).await.unwrap();
        let info = entries
            .iter()
            .find(|e| e.action == HistoryAction::InfoUpdated)
            .unwrap();
        assert_eq!(info.field.as_deref(), Some("stand"));
        assert_eq!(info.new_value.as_deref(), Some("B-7"));
    }

    #[tokio::test]
    async fn test_update_info_multi_field_lists_all_names() {
        let store = memory_store().await;
        let id = seed(&store).await;
        store
            .update_info(
                id,
                InfoUpdate {
                    stand: Some("B-7".to_string()),
                    message: Some("late arrival".to_string()),
                    ..Default::default()
                },
                Actor::default(),
            )
            .await
            .unwrap();
        let entries = store.history(id).await.unwrap();
        let info = entries
            .iter()
            .find(|e| e.action == HistoryAction::InfoUpdated)
            .unwrap();
        // Multi-field edits carry no single-field diff, just the names.
        assert!(info.field.is_none());
        assert!(info.old_value.is_none());
        assert_eq!(info.description, "Updated stand, message");
    }

    #[tokio::test]
    async fn test_mark_email_sent() {
        let store = memory_store().await;
        let id = seed(&store).await;
        let updated = store.mark_email_sent(id, Actor::default()).await.unwrap();
        assert!(updated.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_detection_normalizes_company_and_plate() {
        let store = memory_store().await;
        seed(&store).await;

        let found = store
            .find_duplicates(DuplicateProbe {
                company: "acme".into(),
                plate: "ab123cd".into(),
                trailer_plate: None,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].company, "Acme");

        let other_company = store
            .find_duplicates(DuplicateProbe {
                company: "globex".into(),
                plate: "ab123cd".into(),
                trailer_plate: None,
            })
            .await
            .unwrap();
        assert!(other_company.is_empty());

        let trailer_mismatch = store
            .find_duplicates(DuplicateProbe {
                company: "acme".into(),
                plate: "ab123cd".into(),
                trailer_plate: Some("TR-1".into()),
            })
            .await
            .unwrap();
        assert!(trailer_mismatch.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_detection_ignores_archived() {
        let store = memory_store().await;
        let id = seed(&store).await;
        store
            .set_archived(id, true, Actor::default())
            .await
            .unwrap();
        let found = store
            .find_duplicates(DuplicateProbe {
                company: "ACME".into(),
                plate: "AB 123 CD".into(),
                trailer_plate: None,
            })
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
