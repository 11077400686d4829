use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accreditation::types::{Accreditation, Vehicle};

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Accreditation plus its vehicles, flattened into one JSON object.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccreditationDetail {
    #[serde(flatten)]
    pub accreditation: Accreditation,
    pub vehicles: Vec<Vehicle>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub archived: Option<bool>,
    pub status: Option<String>,
    pub zone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangesQuery {
    pub since: Option<String>,
    pub zone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ZoneTimeQuery {
    pub zone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub archive: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneTimeResponse {
    pub accreditation_id: Uuid,
    pub totals_ms: std::collections::BTreeMap<String, i64>,
}
