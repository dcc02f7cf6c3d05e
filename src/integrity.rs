//! Deletion integrity checking
//!
//! After a task and its dependent rows are deleted, nothing may keep
//! referencing the task id. [`IntegrityValidator`] snapshots row counts
//! before and after a deletion, reports leftovers as orphans, and sweeps
//! expired cache rows best-effort. It only ever reads and deletes counts
//! through the narrow [`Storage`] contract; it never issues raw queries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// The parent table holding analysis tasks.
pub const TASK_TABLE: &str = "analysis_tasks";

/// Child tables that reference a task id and must be emptied with it.
pub const CHILD_TABLES: [&str; 3] = ["market_results", "price_samples", "analysis_cache"];

/// Tables subject to the expired-row sweep.
pub const EXPIRING_TABLES: [&str; 2] = ["analysis_cache", "search_cache"];

/// Row selection for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// Every row in the table.
    All,
    /// Rows referencing the given task id.
    Task(String),
    /// Rows whose parent task no longer exists.
    Orphaned,
    /// Rows past their expiry.
    Expired,
}

/// The narrow storage contract: counts and deletions only.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn count_rows(&self, table: &str, filter: &RowFilter) -> Result<u64, PipelineError>;
    async fn delete_rows(&self, table: &str, filter: &RowFilter) -> Result<u64, PipelineError>;
}

/// Point-in-time row counts for one task across all related tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub task_id: String,
    pub table_counts: BTreeMap<String, u64>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Count for one table, zero when the table was not captured.
    pub fn count(&self, table: &str) -> u64 {
        self.table_counts.get(table).copied().unwrap_or(0)
    }
}

/// Outcome of an orphan check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyResult {
    pub orphan_ids: BTreeSet<String>,
    pub is_consistent: bool,
}

impl ConsistencyResult {
    fn from_orphans(orphan_ids: BTreeSet<String>) -> Self {
        Self {
            is_consistent: orphan_ids.is_empty(),
            orphan_ids,
        }
    }
}

/// Outcome of the expired-row sweep. Per-row failures are recorded and the
/// sweep continues; it is best-effort, not fail-fast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
    pub removed_count: u64,
    pub errors: Vec<String>,
}

/// Validates that deletions leave no orphaned references behind.
pub struct IntegrityValidator {
    storage: Arc<dyn Storage>,
}

impl IntegrityValidator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Captures current row counts for the task across the task table and
    /// every child table.
    pub async fn create_snapshot(&self, task_id: &str) -> Result<Snapshot, PipelineError> {
        let filter = RowFilter::Task(task_id.to_string());
        let mut table_counts = BTreeMap::new();
        for table in std::iter::once(TASK_TABLE).chain(CHILD_TABLES) {
            let count = self.storage.count_rows(table, &filter).await?;
            table_counts.insert(table.to_string(), count);
        }
        Ok(Snapshot {
            task_id: task_id.to_string(),
            table_counts,
            captured_at: Utc::now(),
        })
    }

    /// Snapshot taken before the deletion, for later comparison.
    pub async fn check_pre_deletion(&self, task_id: &str) -> Result<Snapshot, PipelineError> {
        let snapshot = self.create_snapshot(task_id).await?;
        debug!(task_id, counts = ?snapshot.table_counts, "pre-deletion snapshot");
        Ok(snapshot)
    }

    /// Re-snapshots after the deletion and reports any child row still
    /// referencing the deleted task as an orphan.
    pub async fn check_post_deletion(
        &self,
        task_id: &str,
        pre: &Snapshot,
    ) -> Result<ConsistencyResult, PipelineError> {
        let post = self.create_snapshot(task_id).await?;

        if post.count(TASK_TABLE) >= pre.count(TASK_TABLE) && pre.count(TASK_TABLE) > 0 {
            warn!(task_id, "task row count did not decrease across deletion");
        }

        let mut orphans = BTreeSet::new();
        for table in CHILD_TABLES {
            if post.count(table) > 0 {
                orphans.insert(format!("{table}:{task_id}"));
            }
        }
        Ok(ConsistencyResult::from_orphans(orphans))
    }

    /// Full sweep independent of any task: reports every child table that
    /// holds rows whose parent task no longer exists.
    pub async fn detect_orphaned_data(&self) -> Result<ConsistencyResult, PipelineError> {
        let mut orphans = BTreeSet::new();
        for table in CHILD_TABLES {
            let count = self.storage.count_rows(table, &RowFilter::Orphaned).await?;
            if count > 0 {
                orphans.insert(format!("{table} ({count} rows)"));
            }
        }
        Ok(ConsistencyResult::from_orphans(orphans))
    }

    /// Removes expired cache rows table by table. A failure on one table is
    /// recorded and sweeping continues.
    pub async fn cleanup_expired_data(&self) -> CleanupOutcome {
        let mut removed_count = 0;
        let mut errors = Vec::new();
        for table in EXPIRING_TABLES {
            match self.storage.delete_rows(table, &RowFilter::Expired).await {
                Ok(removed) => {
                    if removed > 0 {
                        debug!(table, removed, "expired rows removed");
                    }
                    removed_count += removed;
                }
                Err(error) => {
                    warn!(table, error = %error, "expired-row sweep failed for table");
                    errors.push(format!("{table}: {error}"));
                }
            }
        }
        CleanupOutcome {
            removed_count,
            errors,
        }
    }
}

/// In-memory storage used by tests and the CLI's self-validation run.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<BTreeMap<String, Vec<MemoryRow>>>,
}

/// One stored row: the task it references plus the flags the filters select
/// on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRow {
    pub task_id: Option<String>,
    pub orphaned: bool,
    pub expired: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row referencing `task_id`.
    pub fn insert(&self, table: &str, row: MemoryRow) {
        let mut tables = self.tables.lock().expect("storage lock poisoned");
        tables.entry(table.to_string()).or_default().push(row);
    }

    /// Seeds a task row plus one referencing row in every child table.
    pub fn seed_task(&self, task_id: &str) {
        let row = MemoryRow {
            task_id: Some(task_id.to_string()),
            orphaned: false,
            expired: false,
        };
        self.insert(TASK_TABLE, row.clone());
        for table in CHILD_TABLES {
            self.insert(table, row.clone());
        }
    }

    fn matches(row: &MemoryRow, filter: &RowFilter) -> bool {
        match filter {
            RowFilter::All => true,
            RowFilter::Task(task_id) => row.task_id.as_deref() == Some(task_id.as_str()),
            RowFilter::Orphaned => row.orphaned,
            RowFilter::Expired => row.expired,
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn count_rows(&self, table: &str, filter: &RowFilter) -> Result<u64, PipelineError> {
        let tables = self.tables.lock().expect("storage lock poisoned");
        let count = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| Self::matches(r, filter)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn delete_rows(&self, table: &str, filter: &RowFilter) -> Result<u64, PipelineError> {
        let mut tables = self.tables.lock().expect("storage lock poisoned");
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !Self::matches(r, filter));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator_with(storage: Arc<MemoryStorage>) -> IntegrityValidator {
        IntegrityValidator::new(storage)
    }

    #[tokio::test]
    async fn test_snapshot_counts_all_related_tables() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed_task("task-1");
        storage.seed_task("task-2");

        let validator = validator_with(storage);
        let snapshot = validator.create_snapshot("task-1").await.unwrap();
        assert_eq!(snapshot.count(TASK_TABLE), 1);
        for table in CHILD_TABLES {
            assert_eq!(snapshot.count(table), 1, "{table}");
        }
    }

    #[tokio::test]
    async fn test_post_deletion_clean_when_children_removed() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed_task("task-1");
        let validator = validator_with(Arc::clone(&storage));

        let pre = validator.check_pre_deletion("task-1").await.unwrap();
        assert_eq!(pre.count(TASK_TABLE), 1);

        let filter = RowFilter::Task("task-1".to_string());
        for table in std::iter::once(TASK_TABLE).chain(CHILD_TABLES) {
            storage.delete_rows(table, &filter).await.unwrap();
        }

        let result = validator.check_post_deletion("task-1", &pre).await.unwrap();
        assert!(result.is_consistent);
        assert!(result.orphan_ids.is_empty());

        let post = validator.create_snapshot("task-1").await.unwrap();
        assert_eq!(pre.count(TASK_TABLE) - post.count(TASK_TABLE), 1);
    }

    #[tokio::test]
    async fn test_post_deletion_reports_orphans() {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed_task("task-1");
        let validator = validator_with(Arc::clone(&storage));

        let pre = validator.check_pre_deletion("task-1").await.unwrap();
        // Delete the task row but "forget" the price_samples child.
        let filter = RowFilter::Task("task-1".to_string());
        storage.delete_rows(TASK_TABLE, &filter).await.unwrap();
        storage.delete_rows("market_results", &filter).await.unwrap();
        storage.delete_rows("analysis_cache", &filter).await.unwrap();

        let result = validator.check_post_deletion("task-1", &pre).await.unwrap();
        assert!(!result.is_consistent);
        assert!(result.orphan_ids.contains("price_samples:task-1"));
    }

    #[tokio::test]
    async fn test_detect_orphaned_data_flags_marked_rows() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            "market_results",
            MemoryRow {
                task_id: Some("gone".to_string()),
                orphaned: true,
                expired: false,
            },
        );
        let validator = validator_with(storage);

        let result = validator.detect_orphaned_data().await.unwrap();
        assert!(!result.is_consistent);
        assert_eq!(result.orphan_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_rows() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            "analysis_cache",
            MemoryRow {
                task_id: None,
                orphaned: false,
                expired: true,
            },
        );
        storage.insert(
            "analysis_cache",
            MemoryRow {
                task_id: None,
                orphaned: false,
                expired: false,
            },
        );
        let validator = validator_with(Arc::clone(&storage));

        let outcome = validator.cleanup_expired_data().await;
        assert_eq!(outcome.removed_count, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            storage
                .count_rows("analysis_cache", &RowFilter::All)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_cleanup_continues_past_failing_table() {
        // A storage that fails deletions on one table only.
        struct FlakyStorage {
            inner: MemoryStorage,
        }

        #[async_trait]
        impl Storage for FlakyStorage {
            async fn count_rows(
                &self,
                table: &str,
                filter: &RowFilter,
            ) -> Result<u64, PipelineError> {
                self.inner.count_rows(table, filter).await
            }

            async fn delete_rows(
                &self,
                table: &str,
                filter: &RowFilter,
            ) -> Result<u64, PipelineError> {
                if table == "analysis_cache" {
                    return Err(PipelineError::storage("table locked"));
                }
                self.inner.delete_rows(table, filter).await
            }
        }

        let inner = MemoryStorage::new();
        inner.insert(
            "search_cache",
            MemoryRow {
                task_id: None,
                orphaned: false,
                expired: true,
            },
        );
        let validator = IntegrityValidator::new(Arc::new(FlakyStorage { inner }));

        let outcome = validator.cleanup_expired_data().await;
        assert_eq!(outcome.removed_count, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("analysis_cache"));
    }
}
