use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Incoming submission fields checked against existing accreditations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateProbe {
    pub company: String,
    pub plate: String,
    pub trailer_plate: Option<String>,
}

fn plate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("[^A-Z0-9]").unwrap())
}

/// Case-fold and trim a company name for comparison.
pub fn normalize_company(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Case-fold a plate and strip everything that is not a letter or digit,
/// so `AB-123-CD` and `ab123cd` compare equal.
pub fn normalize_plate(raw: &str) -> String {
    plate_pattern()
        .replace_all(&raw.trim().to_uppercase(), "")
        .into_owned()
}
