use chrono::Utc;

use crate::api::BitableClient;
use crate::auth::{authenticate, AccessToken};
use crate::config::{Credential, TableCoordinate};
use crate::error::Result;
use crate::rows::InputRow;
use crate::sync::batch::{create_all, delete_all};
use crate::sync::enumerate::{enumerate_records, list_all_record_ids};
use crate::sync::{
    ListingSummary, PhaseReport, SyncMode, SyncOptions, SyncPhase, SyncProgress, SyncReport,
    SyncStatus,
};

/// Make the remote table reflect `rows`.
///
/// Authenticates, then in [`SyncMode::Replace`] lists and deletes every
/// existing record before inserting. Only authentication failure (or invalid
/// input, rejected before any request) is returned as an error; every
/// batch-level failure is recorded in the report.
pub async fn sync(
    client: &BitableClient,
    credential: &Credential,
    table: &TableCoordinate,
    rows: &[InputRow],
    mode: SyncMode,
    options: &SyncOptions,
    progress: &dyn SyncProgress,
) -> Result<SyncReport> {
    table.validate()?;
    options.validate()?;
    let started_at = Utc::now();

    progress.on_phase_start(SyncPhase::Authenticating);
    let token = authenticate(client, credential).await?;

    let (listing, delete) = match mode {
        SyncMode::Replace => {
            let (listing, delete) = clear_existing(client, &token, table, options, progress).await;
            (Some(listing), Some(delete))
        }
        SyncMode::Append => (None, None),
    };

    progress.on_phase_start(SyncPhase::Inserting);
    let insert_results = create_all(client, &token, table, rows, options, progress).await;
    let insert = PhaseReport::from_results(rows.len(), insert_results);

    let report = build_report(table, mode, listing, delete, insert, started_at);
    log::info!(
        "Sync of {table} finished: {:?}, {} inserted, {} deleted, {} failed batches",
        report.status,
        report.insert.succeeded_items,
        report.delete.as_ref().map_or(0, |d| d.succeeded_items),
        report.total_failures()
    );

    progress.on_phase_start(SyncPhase::Reported);
    progress.on_sync_complete(&report);
    Ok(report)
}

/// Authenticate and list every record id in the table.
pub async fn list_record_ids(
    client: &BitableClient,
    credential: &Credential,
    table: &TableCoordinate,
    options: &SyncOptions,
) -> Result<Vec<String>> {
    table.validate()?;
    options.validate()?;
    let token = authenticate(client, credential).await?;
    list_all_record_ids(client, &token, table, options).await
}

async fn clear_existing(
    client: &BitableClient,
    token: &AccessToken,
    table: &TableCoordinate,
    options: &SyncOptions,
    progress: &dyn SyncProgress,
) -> (ListingSummary, PhaseReport) {
    progress.on_phase_start(SyncPhase::EnumeratingOld);
    let listing = enumerate_records(client, token, table, options, progress).await;
    log::info!(
        "Found {} existing records in {table} over {} pages",
        listing.record_ids.len(),
        listing.pages_fetched
    );

    progress.on_phase_start(SyncPhase::DeletingOld);
    let results = delete_all(client, token, table, &listing.record_ids, options, progress).await;
    let delete = PhaseReport::from_results(listing.record_ids.len(), results);
    (listing.summary(), delete)
}

fn build_report(
    table: &TableCoordinate,
    mode: SyncMode,
    listing: Option<ListingSummary>,
    delete: Option<PhaseReport>,
    insert: PhaseReport,
    started_at: chrono::DateTime<Utc>,
) -> SyncReport {
    let listing_failures = listing.as_ref().map_or(0, |l| usize::from(!l.complete));
    let failures = listing_failures
        + delete.as_ref().map_or(0, |d| d.failure_batches)
        + insert.failure_batches;
    let successes = delete.as_ref().map_or(0, |d| d.success_batches) + insert.success_batches;
    // Only skipped work marks the run cancelled.
    let cancelled = listing.as_ref().is_some_and(|l| l.cancelled)
        || delete.as_ref().is_some_and(PhaseReport::has_cancelled_batches)
        || insert.has_cancelled_batches();

    SyncReport {
        table: table.to_string(),
        mode,
        status: SyncStatus::from_counts(successes, failures),
        listing,
        delete,
        insert,
        cancelled,
        started_at,
        finished_at: Utc::now(),
    }
}
