use chrono::{DateTime, Months, Utc};
use log::info;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use serde_json::json;

use crate::error_handling::types::{OperationError, StorageError};
use crate::storage::db_entities::{accreditation_history, accreditation_history_archive};
use crate::storage::types::{fmt_ts, ArchiveReport};

/// Everything older than this many months ago is eligible for archival.
/// Falls back to the epoch-adjacent minimum when the subtraction would
/// underflow, which cannot happen for sane retention values.
pub fn retention_cutoff(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Move history rows older than `cutoff` into the archive table.
///
/// Rows are processed oldest first in batches of `batch_size`, each batch
/// in its own transaction: the archive row is inserted, then the live row
/// deleted, so a crash mid-run loses at most the current batch's progress
/// and a re-run picks up exactly where it stopped. The run is idempotent;
/// a second pass over the same cutoff archives nothing.
pub async fn archive_history(
    conn: &DatabaseConnection,
    cutoff: DateTime<Utc>,
    batch_size: u64,
) -> Result<ArchiveReport, OperationError> {
    let mut archived: u64 = 0;
    let mut batches: u64 = 0;
    let cutoff_str = fmt_ts(cutoff);
    loop {
        let rows = accreditation_history::Entity::find()
            .filter(accreditation_history::Column::CreatedAt.lt(cutoff_str.clone()))
            .order_by_asc(accreditation_history::Column::CreatedAt)
            .order_by_asc(accreditation_history::Column::Id)
            .limit(batch_size)
            .all(conn)
            .await?;
        if rows.is_empty() {
            break;
        }
        let count = rows.len() as u64;
        let archived_at = fmt_ts(Utc::now());

        let txn = conn.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let summary = json!({
                "a": row.action,
                "f": row.field,
                "o": row.old_value,
                "n": row.new_value,
                "d": row.description,
                "u": row.user_name,
            });
            let summary = serde_json::to_string(&summary)
                .map_err(|_| OperationError::Storage(StorageError::WriteFailed))?;
            accreditation_history_archive::ActiveModel {
                id: Set(row.id.clone()),
                accreditation_id: Set(row.accreditation_id.clone()),
                summary: Set(summary),
                created_at: Set(row.created_at.clone()),
                archived_at: Set(archived_at.clone()),
            }
            .insert(&txn)
            .await?;
            ids.push(row.id);
        }
        accreditation_history::Entity::delete_many()
            .filter(accreditation_history::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        archived += count;
        batches += 1;
        if count < batch_size {
            break;
        }
    }
    if archived > 0 {
        info!("archived {} history rows in {} batches", archived, batches);
    }
    Ok(ArchiveReport { archived, batches })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use crate::storage::DatabaseStore;

    async fn seed_history(store: &DatabaseStore, count: usize, at: DateTime<Utc>) {
        for i in 0..count {
            accreditation_history::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                accreditation_id: Set(Uuid::nil().to_string()),
                action: Set("STATUS_CHANGED".to_string()),
                field: Set(Some("status".to_string())),
                old_value: Set(Some("ATTENTE".to_string())),
                new_value: Set(Some("ENTREE".to_string())),
                description: Set(format!("row {i}")),
                user_name: Set(None),
                user_agent: Set(None),
                created_at: Set(fmt_ts(at + Duration::seconds(i as i64))),
            }
            .insert(store.connection())
            .await
            .unwrap();
        }
    }

    #[test]
    fn test_retention_cutoff_thirteen_months() {
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let cutoff = retention_cutoff(now, 13);
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2025, 7, 30, 12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_archives_old_rows_in_batches_and_is_idempotent() {
        let store = DatabaseStore::in_memory().await.unwrap();
        let old = Utc::now() - Duration::days(500);
        seed_history(&store, 5, old).await;
        seed_history(&store, 2, Utc::now()).await;

        let cutoff = retention_cutoff(Utc::now(), 13);
        let report = archive_history(store.connection(), cutoff, 2)
            .await
            .unwrap();
        assert_eq!(report.archived, 5);
        assert_eq!(report.batches, 3);

        let live = accreditation_history::Entity::find()
            .all(store.connection())
            .await
            .unwrap();
        assert_eq!(live.len(), 2);
        let archived = accreditation_history_archive::Entity::find()
            .all(store.connection())
            .await
            .unwrap();
        assert_eq!(archived.len(), 5);
        // Archive rows keep the original id and timestamp, and carry a
        // compact JSON summary.
        let sample: serde_json::Value = serde_json::from_str(&archived[0].summary).unwrap();
        assert_eq!(sample["a"], "STATUS_CHANGED");
        assert_eq!(sample["f"], "status");

        let rerun = archive_history(store.connection(), cutoff, 2)
            .await
            .unwrap();
        assert_eq!(rerun.archived, 0);
        assert_eq!(rerun.batches, 0);
    }

    #[tokio::test]
    async fn test_nothing_to_archive() {
        let store = DatabaseStore::in_memory().await.unwrap();
        seed_history(&store, 3, Utc::now()).await;
        let report = archive_history(store.connection(), retention_cutoff(Utc::now(), 13), 100)
            .await
            .unwrap();
        assert_eq!(report.archived, 0);
        assert_eq!(report.batches, 0);
        let live = accreditation_history::Entity::find()
            .all(store.connection())
            .await
            .unwrap();
        assert_eq!(live.len(), 3);
    }
}
