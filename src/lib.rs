pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod rows;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use api::BitableClient;
pub use auth::AccessToken;
pub use config::{Credential, Settings, TableCoordinate};
pub use error::{Error, FailureKind, Result};
pub use rows::{CellValue, InputRow};
pub use sync::{
    BatchOutcome, BatchResult, ListingSummary, NoopProgress, PhaseReport, SyncMode, SyncOptions,
    SyncPhase, SyncProgress, SyncReport, SyncStatus,
};

use sync::syncer;

/// Main entry point: a configured client bound to one application identity.
///
/// Each operation authenticates afresh; tokens are never kept between calls.
pub struct BitableSync {
    client: BitableClient,
    credential: Credential,
    options: SyncOptions,
}

impl BitableSync {
    pub fn new(credential: Credential, options: SyncOptions) -> Result<Self> {
        options.validate()?;
        let client = BitableClient::new(credential.api_endpoint.clone(), options.request_timeout)?;
        Ok(Self {
            client,
            credential,
            options,
        })
    }

    // ── Sync commands ──────────────────────────────────────────────

    /// Replace (or, with `replace_existing = false`, append to) the table's
    /// records with `rows`.
    pub async fn sync(
        &self,
        rows: &[InputRow],
        table: &TableCoordinate,
        replace_existing: bool,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        syncer::sync(
            &self.client,
            &self.credential,
            table,
            rows,
            SyncMode::from_replace_existing(replace_existing),
            &self.options,
            progress,
        )
        .await
    }

    /// Delete every record in the table. The insert section of the report
    /// is the no-records sentinel.
    pub async fn purge(
        &self,
        table: &TableCoordinate,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        syncer::sync(
            &self.client,
            &self.credential,
            table,
            &[],
            SyncMode::Replace,
            &self.options,
            progress,
        )
        .await
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub async fn list_record_ids(&self, table: &TableCoordinate) -> Result<Vec<String>> {
        syncer::list_record_ids(&self.client, &self.credential, table, &self.options).await
    }
}

/// Sync `rows` into `table` with default options and no progress reporting.
pub async fn sync_table(
    rows: &[InputRow],
    credential: &Credential,
    table: &TableCoordinate,
    replace_existing: bool,
) -> Result<SyncReport> {
    BitableSync::new(credential.clone(), SyncOptions::default())?
        .sync(rows, table, replace_existing, &NoopProgress)
        .await
}
