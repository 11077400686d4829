use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::accreditation::types::ZoneMovement;
use crate::accreditation::ZoneAction;

/// Cumulative milliseconds spent per zone.
///
/// Walks the movement log in timestamp order. ENTRY and TRANSFER rows
/// establish occupancy of their `to_zone`; the occupancy is closed by the
/// next movement that leaves the zone (`from_zone` matches) or by any
/// TRANSFER, falling back to `now` for a still-open occupancy.
/// Non-positive durations are discarded. Quadratic over the per-
/// accreditation movement list, which stays in the low tens.
pub fn time_by_zone(movements: &[ZoneMovement], now: DateTime<Utc>) -> BTreeMap<String, i64> {
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for (index, movement) in movements.iter().enumerate() {
        if movement.action == ZoneAction::Exit {
            continue;
        }
        let zone = movement.to_zone.as_str();
        let mut exit_time = now;
        for later in &movements[index + 1..] {
            if later.from_zone.as_deref() == Some(zone) || later.action == ZoneAction::Transfer {
                exit_time = later.created_at;
                break;
            }
        }
        let elapsed = (exit_time - movement.created_at).num_milliseconds();
        if elapsed > 0 {
            *totals.entry(zone.to_string()).or_insert(0) += elapsed;
        }
    }
    totals
}
