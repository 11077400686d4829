use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accreditation::types::{HistoryEntry, VehicleTimeSlot};
use crate::accreditation::{Status, ZoneAction};
use crate::error_handling::types::StorageError;

/// Render a timestamp in the canonical persisted form: RFC3339, UTC,
/// fixed millisecond precision. Fixed precision keeps lexicographic
/// order identical to temporal order, which the history queries rely on.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StorageError::ReadFailed)
}

pub fn parse_opt_ts(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, StorageError> {
    match raw {
        Some(s) => parse_ts(s).map(Some),
        None => Ok(None),
    }
}

/// Today's calendar day in the persisted `YYYY-MM-DD` form.
pub fn today_str(now: DateTime<Utc>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

/// Who performed a mutation, recorded on history and movement rows.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_name: Option<String>,
    pub user_agent: Option<String>,
}

/// Public submission payload: an accreditation plus its vehicles,
/// created atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccreditation {
    pub company: String,
    pub stand: Option<String>,
    pub event_id: Option<Uuid>,
    pub message: Option<String>,
    #[serde(default)]
    pub consent: bool,
    pub email: Option<String>,
    #[serde(default)]
    pub vehicles: Vec<NewVehicle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
    pub plate: String,
    pub trailer_plate: Option<String>,
    pub size: String,
    pub phone_code: Option<String>,
    pub phone_number: Option<String>,
    pub arrival_date: Option<String>,
    pub arrival_time: Option<String>,
    pub origin_city: Option<String>,
    #[serde(default)]
    pub unloading: Vec<String>,
    pub distance_km: Option<f64>,
    pub weight_kg: Option<f64>,
}

/// Status change with an optional optimistic version check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: Status,
    pub version: Option<i64>,
}

/// Zone transfer request. Requires status SORTIE and a target different
/// from the current zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub target_zone: String,
    pub reason: Option<String>,
    pub version: Option<i64>,
}

/// Return-to-venue request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub zone: String,
    pub vehicle_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOutcome {
    pub time_slot: VehicleTimeSlot,
    pub step_number: i32,
}

/// Record a plain zone entry or exit. Deliberately not version-checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRecord {
    pub zone: Option<String>,
    pub action: ZoneAction,
}

/// Partial edit of accreditation info fields, with an optional optimistic
/// version check. Only supplied fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoUpdate {
    pub company: Option<String>,
    pub stand: Option<String>,
    pub message: Option<String>,
    pub email: Option<String>,
    pub version: Option<i64>,
}

/// Best-effort fan-out request: one action applied to many accreditations,
/// each in its own transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub ids: Vec<Uuid>,
    /// A status value, `ARCHIVE` or `UNARCHIVE`.
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResult {
    pub id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

/// Change feed returned by the polling endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFeed {
    pub events: Vec<HistoryEntry>,
    pub server_time: DateTime<Utc>,
}

/// Outcome of one archival run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    pub archived: u64,
    pub batches: u64,
}

/// Listing filter for accreditations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccreditationFilter {
    pub archived: Option<bool>,
    pub status: Option<Status>,
    pub zone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fmt_ts_fixed_precision_orders_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let later = earlier + chrono::Duration::milliseconds(500);
        let (a, b) = (fmt_ts(earlier), fmt_ts(later));
        assert!(a < b);
        assert_eq!(parse_ts(&a).unwrap(), earlier);
        assert_eq!(parse_ts(&b).unwrap(), later);
    }

    #[test]
    fn test_parse_ts_rejects_garbage() {
        assert!(parse_ts("yesterday").is_err());
    }

    #[test]
    fn test_today_str() {
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 23, 59, 0).unwrap();
        assert_eq!(today_str(now), "2026-08-30");
    }
}
