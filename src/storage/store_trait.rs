//! Store Trait
//!
//! This module defines the `Store` trait, the interface the web layer and
//! background jobs program against.
//!
//! Implementors are responsible for:
//! - Running every transition operation inside one database transaction
//! - Appending exactly one history row per mutation (and one movement row
//!   per zone change)
//! - Enforcing the optimistic version check where a version is supplied
//!
//! All methods return a `Result` carrying `OperationError`, which the web
//! boundary maps to HTTP statuses.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::access_control::gate::AuthedUser;
use crate::accreditation::duplicates::DuplicateProbe;
use crate::accreditation::types::{
    Accreditation, EventInfo, HistoryEntry, Vehicle, ZoneConfig, ZoneMovement,
};
use crate::error_handling::types::OperationError;
use crate::storage::types::{
    AccreditationFilter, Actor, ArchiveReport, BulkOutcome, BulkRequest, ChangeFeed, InfoUpdate,
    NewAccreditation, NewVehicle, ReturnOutcome, ReturnRequest, StatusChange, TransferRequest,
    ZoneRecord,
};

#[async_trait]
pub trait Store: Send + Sync {
    /// Creates an accreditation and its vehicles atomically.
    async fn create_accreditation(
        &self,
        input: NewAccreditation,
        actor: Actor,
    ) -> Result<(Accreditation, Vec<Vehicle>), OperationError>;

    /// Changes the lifecycle status, optionally version-checked.
    async fn set_status(
        &self,
        id: Uuid,
        change: StatusChange,
        actor: Actor,
    ) -> Result<Accreditation, OperationError>;

    /// Records a plain zone entry or exit. Not version-checked.
    async fn record_zone(
        &self,
        id: Uuid,
        record: ZoneRecord,
        actor: Actor,
    ) -> Result<Accreditation, OperationError>;

    /// Transfers a vehicle between zones. Requires status SORTIE and a
    /// target different from the current zone.
    async fn transfer(
        &self,
        id: Uuid,
        request: TransferRequest,
        actor: Actor,
    ) -> Result<Accreditation, OperationError>;

    /// Re-admits a vehicle, creating the next time slot for today.
    async fn return_to_venue(
        &self,
        id: Uuid,
        request: ReturnRequest,
        actor: Actor,
    ) -> Result<ReturnOutcome, OperationError>;

    /// Flips the archived flag. Accreditations are never hard-deleted.
    async fn set_archived(
        &self,
        id: Uuid,
        archive: bool,
        actor: Actor,
    ) -> Result<Accreditation, OperationError>;

    /// Edits info fields, optionally version-checked.
    async fn update_info(
        &self,
        id: Uuid,
        update: InfoUpdate,
        actor: Actor,
    ) -> Result<Accreditation, OperationError>;

    async fn add_vehicle(
        &self,
        id: Uuid,
        vehicle: NewVehicle,
        actor: Actor,
    ) -> Result<Vehicle, OperationError>;

    async fn update_vehicle(
        &self,
        id: Uuid,
        vehicle_id: Uuid,
        vehicle: NewVehicle,
        actor: Actor,
    ) -> Result<Vehicle, OperationError>;

    async fn remove_vehicle(
        &self,
        id: Uuid,
        vehicle_id: Uuid,
        actor: Actor,
    ) -> Result<(), OperationError>;

    /// Records that the notification email went out.
    async fn mark_email_sent(&self, id: Uuid, actor: Actor)
        -> Result<Accreditation, OperationError>;

    /// Best-effort fan-out: one transaction per identifier, per-item
    /// failures isolated.
    async fn bulk_apply(
        &self,
        request: BulkRequest,
        actor: Actor,
    ) -> Result<BulkOutcome, OperationError>;

    async fn get_accreditation(
        &self,
        id: Uuid,
    ) -> Result<(Accreditation, Vec<Vehicle>), OperationError>;

    async fn list_accreditations(
        &self,
        filter: AccreditationFilter,
    ) -> Result<Vec<Accreditation>, OperationError>;

    /// Soft duplicate warning for public submissions: returns the full
    /// candidate list, never rejects.
    async fn find_duplicates(
        &self,
        probe: DuplicateProbe,
    ) -> Result<Vec<Accreditation>, OperationError>;

    async fn zone_movements(&self, id: Uuid) -> Result<Vec<ZoneMovement>, OperationError>;

    /// Cumulative milliseconds spent per zone, optionally restricted to one.
    async fn zone_time(
        &self,
        id: Uuid,
        zone: Option<String>,
    ) -> Result<BTreeMap<String, i64>, OperationError>;

    async fn history(&self, id: Uuid) -> Result<Vec<HistoryEntry>, OperationError>;

    /// History entries strictly newer than `since`, for the polling feed.
    async fn changes_since(
        &self,
        since: DateTime<Utc>,
        zone: Option<String>,
        limit: u64,
    ) -> Result<ChangeFeed, OperationError>;

    /// Moves history rows older than `cutoff` into the archive table in
    /// bounded batches. Safe to re-run.
    async fn archive_history(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u64,
    ) -> Result<ArchiveReport, OperationError>;

    async fn zones(&self) -> Result<Vec<ZoneConfig>, OperationError>;

    async fn events(&self) -> Result<Vec<EventInfo>, OperationError>;

    /// Resolves an API token to a user and its feature permissions.
    async fn user_by_token(&self, token: &str) -> Result<Option<AuthedUser>, OperationError>;
}
