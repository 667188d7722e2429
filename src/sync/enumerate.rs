use crate::api::BitableClient;
use crate::auth::AccessToken;
use crate::config::TableCoordinate;
use crate::error::{Error, Result};
use crate::sync::{ListingSummary, SyncOptions, SyncProgress};

/// Why a listing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingStop {
    /// The last page carried no continuation cursor.
    Exhausted,
    /// A page request failed; earlier pages were kept.
    PageFailed { message: String },
    /// The remote kept returning cursors past the page cap.
    PageLimitExceeded { limit: usize },
    Cancelled,
}

/// Record ids collected by walking the list endpoint.
#[derive(Debug, Clone)]
pub struct RecordListing {
    /// In page order, as received.
    pub record_ids: Vec<String>,
    pub pages_fetched: usize,
    pub stop: ListingStop,
}

impl RecordListing {
    pub fn is_complete(&self) -> bool {
        self.stop == ListingStop::Exhausted
    }

    pub fn summary(&self) -> ListingSummary {
        let error = match &self.stop {
            ListingStop::Exhausted => None,
            ListingStop::PageFailed { message } => Some(message.clone()),
            ListingStop::PageLimitExceeded { limit } => Some(page_limit_error(*limit).to_string()),
            ListingStop::Cancelled => Some(Error::Cancelled.to_string()),
        };
        ListingSummary {
            records_found: self.record_ids.len(),
            pages_fetched: self.pages_fetched,
            complete: self.is_complete(),
            cancelled: self.stop == ListingStop::Cancelled,
            error,
        }
    }
}

/// Walk every page of the table's records.
///
/// A failing page ends the walk with what was collected so far; the failure
/// is logged and recorded in [`RecordListing::stop`], not returned as an
/// error.
pub async fn enumerate_records(
    client: &BitableClient,
    token: &AccessToken,
    table: &TableCoordinate,
    options: &SyncOptions,
    progress: &dyn SyncProgress,
) -> RecordListing {
    let mut record_ids = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages_fetched = 0;

    let stop = loop {
        if options.cancellation.is_cancelled() {
            log::warn!("Listing of {table} cancelled after {pages_fetched} pages");
            break ListingStop::Cancelled;
        }
        if pages_fetched >= options.max_pages {
            log::error!(
                "Listing of {table} still had more pages after {} pages; giving up",
                options.max_pages
            );
            break ListingStop::PageLimitExceeded {
                limit: options.max_pages,
            };
        }

        let page = match client
            .list_records_page(token, table, options.page_size, cursor.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                log::error!(
                    "Listing of {table} failed on page {}: {e}; keeping {} ids",
                    pages_fetched + 1,
                    record_ids.len()
                );
                break ListingStop::PageFailed {
                    message: e.to_string(),
                };
            }
        };
        pages_fetched += 1;

        let next = page.next_cursor().map(str::to_string);
        record_ids.extend(page.into_record_ids());
        log::debug!(
            "Listed page {pages_fetched} of {table}: {} ids so far",
            record_ids.len()
        );
        progress.on_page_fetched(pages_fetched, record_ids.len());

        match next {
            Some(next) => cursor = Some(next),
            None => break ListingStop::Exhausted,
        }
    };

    RecordListing {
        record_ids,
        pages_fetched,
        stop,
    }
}

/// Collect every record id in the table.
///
/// Per-page failures end the listing early and return the ids gathered so
/// far. Exceeding `options.max_pages` is a [`Error::Protocol`].
pub async fn list_all_record_ids(
    client: &BitableClient,
    token: &AccessToken,
    table: &TableCoordinate,
    options: &SyncOptions,
) -> Result<Vec<String>> {
    let progress = &crate::sync::NoopProgress;
    let listing = enumerate_records(client, token, table, options, progress).await;
    match listing.stop {
        ListingStop::PageLimitExceeded { limit } => Err(page_limit_error(limit)),
        _ => Ok(listing.record_ids),
    }
}

fn page_limit_error(limit: usize) -> Error {
    Error::Protocol(format!(
        "list endpoint returned a continuation cursor on every one of {limit} pages"
    ))
}
