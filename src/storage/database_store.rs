use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Schema, Statement,
};
use uuid::Uuid;

use crate::access_control::gate::{self, AuthedUser};
use crate::accreditation::duplicates::DuplicateProbe;
use crate::accreditation::types::{
    normalize_unloading, Accreditation, EventInfo, HistoryEntry, Vehicle, VehicleTimeSlot,
    ZoneConfig, ZoneMovement,
};
use crate::accreditation::{HistoryAction, Status, ZoneAction};
use crate::error_handling::types::{OperationError, StorageError};
use crate::history::{archiver, changes};
use crate::storage::db_entities;
use crate::storage::store_trait::Store;
use crate::storage::types::{
    fmt_ts, parse_opt_ts, parse_ts, AccreditationFilter, Actor, ArchiveReport, BulkOutcome,
    BulkRequest, ChangeFeed, InfoUpdate, NewAccreditation, NewVehicle, ReturnOutcome,
    ReturnRequest, StatusChange, TransferRequest, ZoneRecord,
};
use crate::transitions::ops;
use crate::zone_time::calculator;

// Row-to-domain conversions. Every read goes through these, so the
// unloading normalization and timestamp parsing happen in one place.

pub(crate) fn accreditation_from_model(
    model: db_entities::accreditations::Model,
) -> Result<Accreditation, StorageError> {
    let status = Status::parse(&model.status).ok_or(StorageError::ReadFailed)?;
    let event_id = match model.event_id {
        Some(raw) => Some(Uuid::parse_str(&raw).map_err(|_| StorageError::ReadFailed)?),
        None => None,
    };
    Ok(Accreditation {
        id: Uuid::parse_str(&model.id).map_err(|_| StorageError::ReadFailed)?,
        created_at: parse_ts(&model.created_at)?,
        updated_at: parse_ts(&model.updated_at)?,
        version: model.version,
        company: model.company,
        stand: model.stand,
        event_id,
        message: model.message,
        consent: model.consent,
        status,
        current_zone: model.current_zone,
        entry_at: parse_opt_ts(model.entry_at.as_deref())?,
        exit_at: parse_opt_ts(model.exit_at.as_deref())?,
        is_archived: model.is_archived,
        email: model.email,
        sent_at: parse_opt_ts(model.sent_at.as_deref())?,
    })
}

pub(crate) fn vehicle_from_model(
    model: db_entities::vehicles::Model,
) -> Result<Vehicle, StorageError> {
    Ok(Vehicle {
        id: Uuid::parse_str(&model.id).map_err(|_| StorageError::ReadFailed)?,
        accreditation_id: Uuid::parse_str(&model.accreditation_id)
            .map_err(|_| StorageError::ReadFailed)?,
        plate: model.plate,
        trailer_plate: model.trailer_plate,
        size: model.size,
        phone_code: model.phone_code,
        phone_number: model.phone_number,
        arrival_date: model.arrival_date,
        arrival_time: model.arrival_time,
        origin_city: model.origin_city,
        unloading: normalize_unloading(&model.unloading),
        distance_km: model.distance_km,
        weight_kg: model.weight_kg,
    })
}

pub(crate) fn movement_from_model(
    model: db_entities::zone_movements::Model,
) -> Result<ZoneMovement, StorageError> {
    Ok(ZoneMovement {
        id: model.id,
        accreditation_id: Uuid::parse_str(&model.accreditation_id)
            .map_err(|_| StorageError::ReadFailed)?,
        from_zone: model.from_zone,
        to_zone: model.to_zone,
        action: ZoneAction::parse(&model.action).ok_or(StorageError::ReadFailed)?,
        created_at: parse_ts(&model.created_at)?,
        user_name: model.user_name,
    })
}

pub(crate) fn slot_from_model(
    model: db_entities::vehicle_time_slots::Model,
) -> Result<VehicleTimeSlot, StorageError> {
    let vehicle_id = match model.vehicle_id {
        Some(raw) => Some(Uuid::parse_str(&raw).map_err(|_| StorageError::ReadFailed)?),
        None => None,
    };
    Ok(VehicleTimeSlot {
        id: model.id,
        accreditation_id: Uuid::parse_str(&model.accreditation_id)
            .map_err(|_| StorageError::ReadFailed)?,
        vehicle_id,
        date: model.date,
        step_number: model.step_number,
        zone: model.zone,
        entry_at: parse_ts(&model.entry_at)?,
        exit_at: parse_opt_ts(model.exit_at.as_deref())?,
    })
}

pub(crate) fn history_from_model(
    model: db_entities::accreditation_history::Model,
) -> Result<HistoryEntry, StorageError> {
    Ok(HistoryEntry {
        id: Uuid::parse_str(&model.id).map_err(|_| StorageError::ReadFailed)?,
        accreditation_id: Uuid::parse_str(&model.accreditation_id)
            .map_err(|_| StorageError::ReadFailed)?,
        action: HistoryAction::parse(&model.action).ok_or(StorageError::ReadFailed)?,
        field: model.field,
        old_value: model.old_value,
        new_value: model.new_value,
        description: model.description,
        user_name: model.user_name,
        user_agent: model.user_agent,
        created_at: parse_ts(&model.created_at)?,
    })
}

// Shared write helpers used by the transition operations. They take any
// `ConnectionTrait` so they run inside the caller's transaction.

pub(crate) struct HistoryRecord {
    pub accreditation_id: Uuid,
    pub action: HistoryAction,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: String,
}

pub(crate) async fn fetch_accreditation<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<db_entities::accreditations::Model, OperationError> {
    db_entities::accreditations::Entity::find_by_id(id.to_string())
        .one(conn)
        .await?
        .ok_or(OperationError::NotFound)
}

pub(crate) async fn load_vehicles<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Vec<Vehicle>, OperationError> {
    let rows = db_entities::vehicles::Entity::find()
        .filter(db_entities::vehicles::Column::AccreditationId.eq(id.to_string()))
        .order_by_asc(db_entities::vehicles::Column::Id)
        .all(conn)
        .await?;
    rows.into_iter()
        .map(|m| vehicle_from_model(m).map_err(OperationError::from))
        .collect()
}

pub(crate) async fn append_history<C: ConnectionTrait>(
    conn: &C,
    record: HistoryRecord,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), OperationError> {
    db_entities::accreditation_history::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        accreditation_id: Set(record.accreditation_id.to_string()),
        action: Set(record.action.as_str().to_string()),
        field: Set(record.field),
        old_value: Set(record.old_value),
        new_value: Set(record.new_value),
        description: Set(record.description),
        user_name: Set(actor.user_name.clone()),
        user_agent: Set(actor.user_agent.clone()),
        created_at: Set(fmt_ts(now)),
    }
    .insert(conn)
    .await?;
    Ok(())
}

pub(crate) async fn append_movement<C: ConnectionTrait>(
    conn: &C,
    accreditation_id: Uuid,
    from_zone: Option<String>,
    to_zone: String,
    action: ZoneAction,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), OperationError> {
    db_entities::zone_movements::ActiveModel {
        accreditation_id: Set(accreditation_id.to_string()),
        from_zone: Set(from_zone),
        to_zone: Set(to_zone),
        action: Set(action.as_str().to_string()),
        created_at: Set(fmt_ts(now)),
        user_name: Set(actor.user_name.clone()),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}

pub(crate) async fn insert_vehicle<C: ConnectionTrait>(
    conn: &C,
    accreditation_id: Uuid,
    input: NewVehicle,
) -> Result<db_entities::vehicles::Model, OperationError> {
    let unloading = serde_json::to_string(&input.unloading)
        .map_err(|_| OperationError::Storage(StorageError::WriteFailed))?;
    let model = db_entities::vehicles::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        accreditation_id: Set(accreditation_id.to_string()),
        plate: Set(input.plate.trim().to_string()),
        trailer_plate: Set(input.trailer_plate),
        size: Set(input.size.trim().to_string()),
        phone_code: Set(input.phone_code),
        phone_number: Set(input.phone_number),
        arrival_date: Set(input.arrival_date),
        arrival_time: Set(input.arrival_time),
        origin_city: Set(input.origin_city),
        unloading: Set(unloading),
        distance_km: Set(input.distance_km),
        weight_kg: Set(input.weight_kg),
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// SQLite-backed store. All transition operations run inside one
/// transaction on the pooled connection.
pub struct DatabaseStore {
    conn: DatabaseConnection,
}

impl DatabaseStore {
    /// Create or open the database file, bootstrapping the schema.
    pub async fn open_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|_| StorageError::WriteFailed)?;
            }
        }
        let url = format!("sqlite://{}?mode=rwc", path_ref.display());
        Self::connect(&url, 5).await
    }

    /// Fresh in-memory database. Pinned to a single pooled connection so
    /// the database survives across calls.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let mut options = ConnectOptions::new(url.to_owned());
        options
            .max_connections(max_connections)
            .min_connections(1)
            .sqlx_logging(false);
        let conn = Database::connect(options)
            .await
            .map_err(|_| StorageError::ConnectionFailed)?;
        let store = Self { conn };
        store.bootstrap().await?;
        info!("database ready ({})", url);
        Ok(store)
    }

    pub(crate) fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    async fn bootstrap(&self) -> Result<(), StorageError> {
        let backend = self.conn.get_database_backend();
        let schema = Schema::new(backend);
        let mut statements = vec![
            schema.create_table_from_entity(db_entities::accreditations::Entity),
            schema.create_table_from_entity(db_entities::vehicles::Entity),
            schema.create_table_from_entity(db_entities::zone_movements::Entity),
            schema.create_table_from_entity(db_entities::vehicle_time_slots::Entity),
            schema.create_table_from_entity(db_entities::accreditation_history::Entity),
            schema.create_table_from_entity(db_entities::accreditation_history_archive::Entity),
            schema.create_table_from_entity(db_entities::zone_configs::Entity),
            schema.create_table_from_entity(db_entities::events::Entity),
            schema.create_table_from_entity(db_entities::users::Entity),
            schema.create_table_from_entity(db_entities::user_permissions::Entity),
        ];
        for statement in statements.iter_mut() {
            statement.if_not_exists();
            self.conn.execute(backend.build(&*statement)).await?;
        }
        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_vehicles_accreditation ON vehicles (accreditation_id);",
            "CREATE INDEX IF NOT EXISTS idx_movements_accreditation ON zone_movements (accreditation_id);",
            "CREATE INDEX IF NOT EXISTS idx_history_accreditation ON accreditation_history (accreditation_id);",
            "CREATE INDEX IF NOT EXISTS idx_history_created_at ON accreditation_history (created_at);",
            "CREATE INDEX IF NOT EXISTS idx_slots_lookup ON vehicle_time_slots (accreditation_id, date);",
        ];
        for sql in indexes {
            self.conn
                .execute(Statement::from_string(backend, sql))
                .await?;
        }
        debug!("schema bootstrap complete");
        Ok(())
    }
}

#[async_trait]
impl Store for DatabaseStore {
    async fn create_accreditation(
        &self,
        input: NewAccreditation,
        actor: Actor,
    ) -> Result<(Accreditation, Vec<Vehicle>), OperationError> {
        ops::create_accreditation(&self.conn, input, &actor).await
    }

    async fn set_status(
        &self,
        id: Uuid,
        change: StatusChange,
        actor: Actor,
    ) -> Result<Accreditation, OperationError> {
        ops::set_status(&self.conn, id, change, &actor).await
    }

    async fn record_zone(
        &self,
        id: Uuid,
        record: ZoneRecord,
        actor: Actor,
    ) -> Result<Accreditation, OperationError> {
        ops::record_zone(&self.conn, id, record, &actor).await
    }

    async fn transfer(
        &self,
        id: Uuid,
        request: TransferRequest,
        actor: Actor,
    ) -> Result<Accreditation, OperationError> {
        ops::transfer(&self.conn, id, request, &actor).await
    }

    async fn return_to_venue(
        &self,
        id: Uuid,
        request: ReturnRequest,
        actor: Actor,
    ) -> Result<ReturnOutcome, OperationError> {
        ops::return_to_venue(&self.conn, id, request, &actor).await
    }

    async fn set_archived(
        &self,
        id: Uuid,
        archive: bool,
        actor: Actor,
    ) -> Result<Accreditation, OperationError> {
        ops::set_archived(&self.conn, id, archive, &actor).await
    }

    async fn update_info(
        &self,
        id: Uuid,
        update: InfoUpdate,
        actor: Actor,
    ) -> Result<Accreditation, OperationError> {
        ops::update_info(&self.conn, id, update, &actor).await
    }

    async fn add_vehicle(
        &self,
        id: Uuid,
        vehicle: NewVehicle,
        actor: Actor,
    ) -> Result<Vehicle, OperationError> {
        ops::add_vehicle(&self.conn, id, vehicle, &actor).await
    }

    async fn update_vehicle(
        &self,
        id: Uuid,
        vehicle_id: Uuid,
        vehicle: NewVehicle,
        actor: Actor,
    ) -> Result<Vehicle, OperationError> {
        ops::update_vehicle(&self.conn, id, vehicle_id, vehicle, &actor).await
    }

    async fn remove_vehicle(
        &self,
        id: Uuid,
        vehicle_id: Uuid,
        actor: Actor,
    ) -> Result<(), OperationError> {
        ops::remove_vehicle(&self.conn, id, vehicle_id, &actor).await
    }

    async fn mark_email_sent(
        &self,
        id: Uuid,
        actor: Actor,
    ) -> Result<Accreditation, OperationError> {
        ops::mark_email_sent(&self.conn, id, &actor).await
    }

    async fn bulk_apply(
        &self,
        request: BulkRequest,
        actor: Actor,
    ) -> Result<BulkOutcome, OperationError> {
        ops::bulk_apply(&self.conn, request, &actor).await
    }

    async fn get_accreditation(
        &self,
        id: Uuid,
    ) -> Result<(Accreditation, Vec<Vehicle>), OperationError> {
        let model = fetch_accreditation(&self.conn, id).await?;
        let vehicles = load_vehicles(&self.conn, id).await?;
        Ok((accreditation_from_model(model)?, vehicles))
    }

    async fn list_accreditations(
        &self,
        filter: AccreditationFilter,
    ) -> Result<Vec<Accreditation>, OperationError> {
        // Archived rows are hidden unless explicitly requested.
        let archived = filter.archived.unwrap_or(false);
        let mut query = db_entities::accreditations::Entity::find()
            .filter(db_entities::accreditations::Column::IsArchived.eq(archived));
        if let Some(status) = filter.status {
            query = query.filter(db_entities::accreditations::Column::Status.eq(status.as_str()));
        }
        if let Some(zone) = filter.zone {
            query = query.filter(db_entities::accreditations::Column::CurrentZone.eq(zone));
        }
        let rows = query
            .order_by_desc(db_entities::accreditations::Column::CreatedAt)
            .all(&self.conn)
            .await?;
        rows.into_iter()
            .map(|m| accreditation_from_model(m).map_err(OperationError::from))
            .collect()
    }

    async fn find_duplicates(
        &self,
        probe: DuplicateProbe,
    ) -> Result<Vec<Accreditation>, OperationError> {
        ops::find_duplicates(&self.conn, probe).await
    }

    async fn zone_movements(&self, id: Uuid) -> Result<Vec<ZoneMovement>, OperationError> {
        fetch_accreditation(&self.conn, id).await?;
        let rows = db_entities::zone_movements::Entity::find()
            .filter(db_entities::zone_movements::Column::AccreditationId.eq(id.to_string()))
            .order_by_asc(db_entities::zone_movements::Column::CreatedAt)
            .order_by_asc(db_entities::zone_movements::Column::Id)
            .all(&self.conn)
            .await?;
        rows.into_iter()
            .map(|m| movement_from_model(m).map_err(OperationError::from))
            .collect()
    }

    async fn zone_time(
        &self,
        id: Uuid,
        zone: Option<String>,
    ) -> Result<BTreeMap<String, i64>, OperationError> {
        let movements = self.zone_movements(id).await?;
        let mut totals = calculator::time_by_zone(&movements, Utc::now());
        if let Some(zone) = zone {
            totals.retain(|name, _| name == &zone);
        }
        Ok(totals)
    }

    async fn history(&self, id: Uuid) -> Result<Vec<HistoryEntry>, OperationError> {
        fetch_accreditation(&self.conn, id).await?;
        let rows = db_entities::accreditation_history::Entity::find()
            .filter(db_entities::accreditation_history::Column::AccreditationId.eq(id.to_string()))
            .order_by_desc(db_entities::accreditation_history::Column::CreatedAt)
            .all(&self.conn)
            .await?;
        rows.into_iter()
            .map(|m| history_from_model(m).map_err(OperationError::from))
            .collect()
    }

    async fn changes_since(
        &self,
        since: DateTime<Utc>,
        zone: Option<String>,
        limit: u64,
    ) -> Result<ChangeFeed, OperationError> {
        changes::changes_since(&self.conn, since, zone, limit).await
    }

    async fn archive_history(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u64,
    ) -> Result<ArchiveReport, OperationError> {
        archiver::archive_history(&self.conn, cutoff, batch_size).await
    }

    async fn zones(&self) -> Result<Vec<ZoneConfig>, OperationError> {
        let rows = db_entities::zone_configs::Entity::find()
            .order_by_asc(db_entities::zone_configs::Column::Position)
            .all(&self.conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| ZoneConfig {
                name: m.name,
                label: m.label,
                position: m.position,
            })
            .collect())
    }

    async fn events(&self) -> Result<Vec<EventInfo>, OperationError> {
        let rows = db_entities::events::Entity::find()
            .order_by_asc(db_entities::events::Column::StartsOn)
            .all(&self.conn)
            .await?;
        rows.into_iter()
            .map(|m| {
                Ok(EventInfo {
                    id: Uuid::parse_str(&m.id)
                        .map_err(|_| OperationError::Storage(StorageError::ReadFailed))?,
                    name: m.name,
                    starts_on: m.starts_on,
                    ends_on: m.ends_on,
                })
            })
            .collect()
    }

    async fn user_by_token(&self, token: &str) -> Result<Option<AuthedUser>, OperationError> {
        gate::lookup_user(&self.conn, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{NewAccreditation, NewVehicle};
    use serial_test::serial;
    use tempfile::TempDir;

    fn submission(company: &str, plate: &str) -> NewAccreditation {
        NewAccreditation {
            company: company.to_string(),
            stand: Some("A-12".to_string()),
            event_id: None,
            message: None,
            consent: true,
            email: None,
            vehicles: vec![NewVehicle {
                plate: plate.to_string(),
                trailer_plate: None,
                size: "semi".to_string(),
                phone_code: None,
                phone_number: None,
                arrival_date: None,
                arrival_time: None,
                origin_city: None,
                unloading: vec!["rear".to_string()],
                distance_km: None,
                weight_kg: None,
            }],
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = DatabaseStore::open_file(dir.path().join("test.sqlite3"))
            .await
            .unwrap();
        let (created, vehicles) = store
            .create_accreditation(submission("Acme", "AB-123-CD"), Actor::default())
            .await
            .unwrap();
        assert_eq!(vehicles.len(), 1);
        let (fetched, fetched_vehicles) = store.get_accreditation(created.id).await.unwrap();
        assert_eq!(fetched.company, "Acme");
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched_vehicles[0].unloading, vec!["rear".to_string()]);
    }

    #[tokio::test]
    async fn test_legacy_unloading_normalized_on_read() {
        let store = DatabaseStore::in_memory().await.unwrap();
        let (created, _) = store
            .create_accreditation(submission("Acme", "AB-123-CD"), Actor::default())
            .await
            .unwrap();
        // Simulate a legacy row holding a bare string instead of JSON.
        let legacy = db_entities::vehicles::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            accreditation_id: Set(created.id.to_string()),
            plate: Set("XY-999-ZZ".to_string()),
            trailer_plate: Set(None),
            size: Set("van".to_string()),
            phone_code: Set(None),
            phone_number: Set(None),
            arrival_date: Set(None),
            arrival_time: Set(None),
            origin_city: Set(None),
            unloading: Set("left".to_string()),
            distance_km: Set(None),
            weight_kg: Set(None),
        };
        legacy.insert(store.connection()).await.unwrap();
        let (_, vehicles) = store.get_accreditation(created.id).await.unwrap();
        let legacy_vehicle = vehicles.iter().find(|v| v.plate == "XY-999-ZZ").unwrap();
        assert_eq!(legacy_vehicle.unloading, vec!["left".to_string()]);
    }

    #[tokio::test]
    async fn test_list_hides_archived_by_default() {
        let store = DatabaseStore::in_memory().await.unwrap();
        let (a, _) = store
            .create_accreditation(submission("Acme", "AB-123-CD"), Actor::default())
            .await
            .unwrap();
        store
            .create_accreditation(submission("Globex", "EF-456-GH"), Actor::default())
            .await
            .unwrap();
        store.set_archived(a.id, true, Actor::default()).await.unwrap();

        let visible = store
            .list_accreditations(AccreditationFilter::default())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].company, "Globex");

        let archived = store
            .list_accreditations(AccreditationFilter {
                archived: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].company, "Acme");
    }

    #[tokio::test]
    async fn test_zone_reference_data() {
        let store = DatabaseStore::in_memory().await.unwrap();
        assert!(store.zones().await.unwrap().is_empty());
        db_entities::zone_configs::ActiveModel {
            name: Set("staging".to_string()),
            label: Set("Staging area".to_string()),
            position: Set(1),
        }
        .insert(store.connection())
        .await
        .unwrap();
        let zones = store.zones().await.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "staging");
    }
}
