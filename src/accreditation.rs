//! Accreditation domain module.
//!
//! This module provides the core types shared by the transition engine,
//! the storage backend and the web interface: lifecycle status, zone
//! movement actions, audit-history actions and the domain structs.

use serde::{Deserialize, Serialize};

/// Submodule for domain data structures and read-boundary normalization.
pub mod types;
/// Submodule for duplicate-submission detection helpers.
pub mod duplicates;

/// Lifecycle status of an accreditation.
///
/// Variants:
/// - `Nouveau`: freshly submitted, not yet reviewed.
/// - `Attente`: waiting in a staging zone.
/// - `Entree`: vehicle currently inside a zone.
/// - `Sortie`: vehicle has left its zone.
/// - `Refus`: request refused.
/// - `Absent`: vehicle never showed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Attente,
    Entree,
    Sortie,
    Nouveau,
    Refus,
    Absent,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Attente => "ATTENTE",
            Status::Entree => "ENTREE",
            Status::Sortie => "SORTIE",
            Status::Nouveau => "NOUVEAU",
            Status::Refus => "REFUS",
            Status::Absent => "ABSENT",
        }
    }

    pub fn parse(raw: &str) -> Option<Status> {
        match raw {
            "ATTENTE" => Some(Status::Attente),
            "ENTREE" => Some(Status::Entree),
            "SORTIE" => Some(Status::Sortie),
            "NOUVEAU" => Some(Status::Nouveau),
            "REFUS" => Some(Status::Refus),
            "ABSENT" => Some(Status::Absent),
            _ => None,
        }
    }
}

/// Kind of a zone movement log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneAction {
    Entry,
    Exit,
    Transfer,
}

impl ZoneAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneAction::Entry => "ENTRY",
            ZoneAction::Exit => "EXIT",
            ZoneAction::Transfer => "TRANSFER",
        }
    }

    pub fn parse(raw: &str) -> Option<ZoneAction> {
        match raw {
            "ENTRY" => Some(ZoneAction::Entry),
            "EXIT" => Some(ZoneAction::Exit),
            "TRANSFER" => Some(ZoneAction::Transfer),
            _ => None,
        }
    }
}

/// Kind of an audit-history entry. One row is appended per mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Created,
    StatusChanged,
    ZoneChanged,
    ZoneTransfer,
    VehicleAdded,
    VehicleRemoved,
    VehicleUpdated,
    InfoUpdated,
    Archived,
    EmailSent,
    ChatMessage,
    Deleted,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "CREATED",
            HistoryAction::StatusChanged => "STATUS_CHANGED",
            HistoryAction::ZoneChanged => "ZONE_CHANGED",
            HistoryAction::ZoneTransfer => "ZONE_TRANSFER",
            HistoryAction::VehicleAdded => "VEHICLE_ADDED",
            HistoryAction::VehicleRemoved => "VEHICLE_REMOVED",
            HistoryAction::VehicleUpdated => "VEHICLE_UPDATED",
            HistoryAction::InfoUpdated => "INFO_UPDATED",
            HistoryAction::Archived => "ARCHIVED",
            HistoryAction::EmailSent => "EMAIL_SENT",
            HistoryAction::ChatMessage => "CHAT_MESSAGE",
            HistoryAction::Deleted => "DELETED",
        }
    }

    pub fn parse(raw: &str) -> Option<HistoryAction> {
        match raw {
            "CREATED" => Some(HistoryAction::Created),
            "STATUS_CHANGED" => Some(HistoryAction::StatusChanged),
            "ZONE_CHANGED" => Some(HistoryAction::ZoneChanged),
            "ZONE_TRANSFER" => Some(HistoryAction::ZoneTransfer),
            "VEHICLE_ADDED" => Some(HistoryAction::VehicleAdded),
            "VEHICLE_REMOVED" => Some(HistoryAction::VehicleRemoved),
            "VEHICLE_UPDATED" => Some(HistoryAction::VehicleUpdated),
            "INFO_UPDATED" => Some(HistoryAction::InfoUpdated),
            "ARCHIVED" => Some(HistoryAction::Archived),
            "EMAIL_SENT" => Some(HistoryAction::EmailSent),
            "CHAT_MESSAGE" => Some(HistoryAction::ChatMessage),
            "DELETED" => Some(HistoryAction::Deleted),
            _ => None,
        }
    }
}

/// Action applied by the bulk endpoint: a target status or an archive flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Status(Status),
    Archive,
    Unarchive,
}

impl BulkAction {
    pub fn parse(raw: &str) -> Option<BulkAction> {
        match raw {
            "ARCHIVE" => Some(BulkAction::Archive),
            "UNARCHIVE" => Some(BulkAction::Unarchive),
            other => Status::parse(other).map(BulkAction::Status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            Status::Attente,
            Status::Entree,
            Status::Sortie,
            Status::Nouveau,
            Status::Refus,
            Status::Absent,
        ] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("attente"), None);
    }

    #[test]
    fn test_bulk_action_parse() {
        assert_eq!(BulkAction::parse("ARCHIVE"), Some(BulkAction::Archive));
        assert_eq!(BulkAction::parse("UNARCHIVE"), Some(BulkAction::Unarchive));
        assert_eq!(
            BulkAction::parse("SORTIE"),
            Some(BulkAction::Status(Status::Sortie))
        );
        assert_eq!(BulkAction::parse("NOPE"), None);
    }

    #[test]
    fn test_history_action_roundtrip() {
        assert_eq!(
            HistoryAction::parse(HistoryAction::ZoneTransfer.as_str()),
            Some(HistoryAction::ZoneTransfer)
        );
        assert_eq!(HistoryAction::parse(""), None);
    }
}
