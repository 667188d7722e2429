use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::api::{BitableClient, NewRecord};
use crate::auth::AccessToken;
use crate::config::TableCoordinate;
use crate::error::{Error, Result};
use crate::rows::InputRow;
use crate::sync::chunk::{batch_count, partition};
use crate::sync::{BatchResult, SyncOptions, SyncPhase, SyncProgress};

/// Delete `ids` in batches of `options.batch_size`.
///
/// Every batch is attempted even when earlier ones fail. Returns one result
/// per batch in batch order; an empty `ids` makes no calls and returns no
/// results.
pub async fn delete_all(
    client: &BitableClient,
    token: &AccessToken,
    table: &TableCoordinate,
    ids: &[String],
    options: &SyncOptions,
    progress: &dyn SyncProgress,
) -> Vec<BatchResult> {
    if ids.is_empty() {
        return Vec::new();
    }
    log::info!(
        "Deleting {} records from {table} in {} batches",
        ids.len(),
        batch_count(ids.len(), options.batch_size)
    );
    run_batches(SyncPhase::DeletingOld, ids, options, progress, |chunk| {
        client.batch_delete(token, table, chunk)
    })
    .await
}

/// Insert `rows` in batches of `options.batch_size`.
///
/// Same failure policy as [`delete_all`]. An empty `rows` makes no calls and
/// returns the single [`BatchResult::no_records`] sentinel.
pub async fn create_all(
    client: &BitableClient,
    token: &AccessToken,
    table: &TableCoordinate,
    rows: &[InputRow],
    options: &SyncOptions,
    progress: &dyn SyncProgress,
) -> Vec<BatchResult> {
    if rows.is_empty() {
        log::info!("No rows to insert into {table}");
        return vec![BatchResult::no_records()];
    }
    let records: Vec<NewRecord> = rows
        .iter()
        .map(|row| NewRecord {
            fields: row.to_wire_fields(),
        })
        .collect();
    log::info!(
        "Inserting {} records into {table} in {} batches",
        records.len(),
        batch_count(records.len(), options.batch_size)
    );
    run_batches(SyncPhase::Inserting, &records, options, progress, |chunk| {
        client.batch_create(token, table, chunk)
    })
    .await
}

/// Send each chunk of `items` through `send`, up to `options.concurrency`
/// at a time, yielding results in chunk order. Chunks reached after
/// cancellation are recorded as cancelled failures without being sent.
async fn run_batches<'a, T, F, Fut>(
    phase: SyncPhase,
    items: &'a [T],
    options: &SyncOptions,
    progress: &dyn SyncProgress,
    send: F,
) -> Vec<BatchResult>
where
    F: Fn(&'a [T]) -> Fut,
    Fut: Future<Output = Result<usize>>,
{
    let total_batches = batch_count(items.len(), options.batch_size);
    progress.on_phase_batches(phase, items.len(), total_batches);

    let send = &send;
    let cancellation = &options.cancellation;
    let batches = stream::iter(partition(items, options.batch_size))
        .map(|chunk| async move {
            let requested = chunk.items.len();
            if cancellation.is_cancelled() {
                return BatchResult::failure(chunk.index, requested, &Error::Cancelled);
            }
            log::debug!(
                "{phase}: batch {}/{total_batches} ({requested} records)",
                chunk.index + 1
            );
            match send(chunk.items).await {
                Ok(affected) => {
                    if affected != requested {
                        log::warn!(
                            "{phase}: batch {}/{total_batches} affected {affected} of {requested}",
                            chunk.index + 1
                        );
                    }
                    BatchResult::success(chunk.index, requested, affected)
                }
                Err(e) => {
                    log::error!(
                        "{phase}: batch {}/{total_batches} failed: {e}",
                        chunk.index + 1
                    );
                    BatchResult::failure(chunk.index, requested, &e)
                }
            }
        })
        .buffered(options.concurrency.max(1));
    let mut batches = std::pin::pin!(batches);

    let mut results = Vec::with_capacity(total_batches);
    while let Some(result) = batches.next().await {
        progress.on_batch_complete(phase, &result, total_batches);
        results.push(result);
    }
    results
}
