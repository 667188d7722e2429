pub mod batch;
pub mod chunk;
pub mod enumerate;
pub mod syncer;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, FailureKind, Result};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_PAGE_SIZE: usize = 500;
/// The remote rejects batch_delete and batch_create calls with more records.
pub const MAX_BATCH_SIZE: usize = 500;
/// Largest `page_size` the list endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 500;
pub const DEFAULT_MAX_PAGES: usize = 100_000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Options controlling a sync operation.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Records per delete/create call.
    pub batch_size: usize,
    /// Records per list page.
    pub page_size: usize,
    /// Listing fails with a protocol error past this many pages.
    pub max_pages: usize,
    pub request_timeout: Duration,
    /// Batches in flight per phase. `1` issues them strictly one at a time.
    pub concurrency: usize,
    /// Checked before every batch and between list pages.
    pub cancellation: CancellationToken,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: 1,
            cancellation: CancellationToken::new(),
        }
    }
}

impl SyncOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be positive".into()));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::InvalidInput(format!(
                "batch_size {} exceeds the per-call limit of {MAX_BATCH_SIZE}",
                self.batch_size
            )));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidInput("page_size must be positive".into()));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidInput(format!(
                "page_size {} exceeds the per-page limit of {MAX_PAGE_SIZE}",
                self.page_size
            )));
        }
        if self.max_pages == 0 {
            return Err(Error::InvalidInput("max_pages must be positive".into()));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidInput("concurrency must be positive".into()));
        }
        Ok(())
    }
}

/// Whether existing remote records are removed before inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Enumerate and delete every existing record, then insert.
    Replace,
    /// Insert only.
    Append,
}

impl SyncMode {
    pub fn from_replace_existing(replace_existing: bool) -> Self {
        if replace_existing {
            SyncMode::Replace
        } else {
            SyncMode::Append
        }
    }
}

/// Stages of a sync run, in order. A run is idle until `sync` is called, so
/// the first stage reported is `Authenticating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Authenticating,
    EnumeratingOld,
    DeletingOld,
    Inserting,
    Reported,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncPhase::Authenticating => "authenticating",
            SyncPhase::EnumeratingOld => "listing existing records",
            SyncPhase::DeletingOld => "deleting",
            SyncPhase::Inserting => "inserting",
            SyncPhase::Reported => "done",
        };
        f.write_str(s)
    }
}

/// Outcome of one batch call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Records deleted, or records the remote reports as created.
    Success { affected_count: usize },
    Failure {
        kind: FailureKind,
        http_status: Option<u16>,
        message: String,
    },
    /// Insert was called with no rows; nothing was sent.
    NoRecords,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub batch_index: usize,
    pub requested_count: usize,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchResult {
    pub fn success(batch_index: usize, requested_count: usize, affected_count: usize) -> Self {
        Self {
            batch_index,
            requested_count,
            outcome: BatchOutcome::Success { affected_count },
        }
    }

    pub fn failure(batch_index: usize, requested_count: usize, error: &Error) -> Self {
        Self {
            batch_index,
            requested_count,
            outcome: BatchOutcome::Failure {
                kind: error.failure_kind(),
                http_status: error.http_status(),
                message: error.ledger_message(),
            },
        }
    }

    /// Sentinel for an insert with nothing to insert.
    pub fn no_records() -> Self {
        Self {
            batch_index: 0,
            requested_count: 0,
            outcome: BatchOutcome::NoRecords,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Failure { .. })
    }

    pub fn is_no_records(&self) -> bool {
        matches!(self.outcome, BatchOutcome::NoRecords)
    }

    pub fn affected_count(&self) -> usize {
        match self.outcome {
            BatchOutcome::Success { affected_count } => affected_count,
            _ => 0,
        }
    }
}

/// Ledger for one phase (delete or insert).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub total_batches: usize,
    pub total_items: usize,
    pub success_batches: usize,
    pub failure_batches: usize,
    /// Sum of affected counts over successful batches.
    pub succeeded_items: usize,
    pub batch_results: Vec<BatchResult>,
}

impl PhaseReport {
    /// Build the ledger from batch results. The no-records sentinel is kept
    /// in `batch_results` but is not counted as a batch.
    pub fn from_results(total_items: usize, batch_results: Vec<BatchResult>) -> Self {
        let success_batches = batch_results.iter().filter(|r| r.is_success()).count();
        let failure_batches = batch_results.iter().filter(|r| r.is_failure()).count();
        let succeeded_items = batch_results.iter().map(BatchResult::affected_count).sum();
        Self {
            total_batches: success_batches + failure_batches,
            total_items,
            success_batches,
            failure_batches,
            succeeded_items,
            batch_results,
        }
    }

    pub fn is_no_op(&self) -> bool {
        self.batch_results.iter().all(BatchResult::is_no_records)
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchResult> {
        self.batch_results.iter().filter(|r| r.is_failure())
    }

    /// True when some batch was skipped because the run was cancelled.
    pub fn has_cancelled_batches(&self) -> bool {
        self.failed_batches().any(|r| {
            matches!(
                r.outcome,
                BatchOutcome::Failure {
                    kind: FailureKind::Cancelled,
                    ..
                }
            )
        })
    }
}

/// Summary of the enumeration of existing records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingSummary {
    pub records_found: usize,
    pub pages_fetched: usize,
    /// True when the listing walked every page.
    pub complete: bool,
    /// True when cancellation stopped the listing.
    pub cancelled: bool,
    pub error: Option<String>,
}

/// Report returned after a sync operation completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub table: String,
    pub mode: SyncMode,
    pub status: SyncStatus,
    /// Present in replace mode.
    pub listing: Option<ListingSummary>,
    /// Present in replace mode.
    pub delete: Option<PhaseReport>,
    pub insert: PhaseReport,
    /// Set when cancellation cut the run short: the listing stopped or a
    /// batch was skipped.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn total_failures(&self) -> usize {
        self.delete.as_ref().map_or(0, |d| d.failure_batches) + self.insert.failure_batches
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
}

impl SyncStatus {
    /// Derive status from batch counts: no failures is success, failures
    /// alongside some success is partial, otherwise failed.
    pub fn from_counts(success_batches: usize, failures: usize) -> Self {
        if failures == 0 {
            SyncStatus::Success
        } else if success_batches > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        }
    }
}

/// Observer for sync progress. All methods default to no-ops.
pub trait SyncProgress {
    fn on_phase_start(&self, _phase: SyncPhase) {}
    fn on_page_fetched(&self, _page: usize, _records_so_far: usize) {}
    fn on_phase_batches(&self, _phase: SyncPhase, _total_items: usize, _total_batches: usize) {}
    /// Called in batch order, so `result.batch_index` is monotonic.
    fn on_batch_complete(&self, _phase: SyncPhase, _result: &BatchResult, _total_batches: usize) {}
    fn on_sync_complete(&self, _report: &SyncReport) {}
}

pub struct NoopProgress;

impl SyncProgress for NoopProgress {}
