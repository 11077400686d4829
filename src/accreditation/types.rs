use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{HistoryAction, Status, ZoneAction};

/// One vehicle-access grant tied to a company/event/stand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accreditation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-lock counter, incremented on every mutating write.
    pub version: i64,
    pub company: String,
    pub stand: Option<String>,
    pub event_id: Option<Uuid>,
    pub message: Option<String>,
    pub consent: bool,
    pub status: Status,
    pub current_zone: Option<String>,
    pub entry_at: Option<DateTime<Utc>>,
    pub exit_at: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub email: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// One physical vehicle owned by an accreditation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Uuid,
    pub accreditation_id: Uuid,
    pub plate: String,
    pub trailer_plate: Option<String>,
    pub size: String,
    pub phone_code: Option<String>,
    pub phone_number: Option<String>,
    /// Calendar date as `YYYY-MM-DD`.
    pub arrival_date: Option<String>,
    /// Wall-clock time as `HH:MM`.
    pub arrival_time: Option<String>,
    pub origin_city: Option<String>,
    /// Unloading-side selection, normalized from the JSON-in-string column.
    pub unloading: Vec<String>,
    pub distance_km: Option<f64>,
    pub weight_kg: Option<f64>,
}

/// Append-only record of a zone entry, exit or transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneMovement {
    pub id: i32,
    pub accreditation_id: Uuid,
    pub from_zone: Option<String>,
    pub to_zone: String,
    pub action: ZoneAction,
    pub created_at: DateTime<Utc>,
    pub user_name: Option<String>,
}

/// A dated, step-numbered interval of zone occupancy for one vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleTimeSlot {
    pub id: i32,
    pub accreditation_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    /// Calendar day as `YYYY-MM-DD`.
    pub date: String,
    /// 1-based, previous maximum for (accreditation, vehicle, date) plus one.
    pub step_number: i32,
    pub zone: String,
    pub entry_at: DateTime<Utc>,
    pub exit_at: Option<DateTime<Utc>>,
}

/// Immutable audit log entry, also served by the change-polling endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub accreditation_id: Uuid,
    pub action: HistoryAction,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: String,
    pub user_name: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Zone reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneConfig {
    pub name: String,
    pub label: String,
    pub position: i32,
}

/// Event reference data (date window).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub id: Uuid,
    pub name: String,
    pub starts_on: String,
    pub ends_on: String,
}

/// Normalize the persisted `unloading` column into a list.
///
/// The column holds a JSON-encoded array, but legacy rows may hold a JSON
/// string or a bare unquoted string. This is the single place where that
/// debt is absorbed; every read boundary goes through here.
pub fn normalize_unloading(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
        Ok(serde_json::Value::String(s)) => {
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s]
            }
        }
        _ => vec![trimmed.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unloading_json_array() {
        assert_eq!(
            normalize_unloading(r#"["left","rear"]"#),
            vec!["left".to_string(), "rear".to_string()]
        );
    }

    #[test]
    fn test_normalize_unloading_json_string() {
        assert_eq!(normalize_unloading(r#""left""#), vec!["left".to_string()]);
    }

    #[test]
    fn test_normalize_unloading_bare_legacy_string() {
        assert_eq!(normalize_unloading("left"), vec!["left".to_string()]);
    }

    #[test]
    fn test_normalize_unloading_empty() {
        assert!(normalize_unloading("").is_empty());
        assert!(normalize_unloading("  ").is_empty());
        assert!(normalize_unloading("[]").is_empty());
        assert!(normalize_unloading(r#""""#).is_empty());
    }
}
