pub mod models;

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::AccessToken;
use crate::config::TableCoordinate;
use crate::error::{Error, Result};

pub use models::{NewRecord, RecordItem, RecordPage};
use models::{ApiResponse, CreateData, CreateRequest, DeleteRequest};

/// Longest slice of a non-JSON error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// HTTP client for the Bitable open API.
///
/// Cheap to clone; clones share the underlying connection pool. Every request
/// carries the timeout given at construction.
#[derive(Debug, Clone)]
pub struct BitableClient {
    http: reqwest::Client,
    base: Url,
}

impl BitableClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("{base} cannot be used as a base URL")));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Base URL with `segments` appended as percent-encoded path segments.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be used as a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn records_endpoint(&self, table: &TableCoordinate, action: Option<&str>) -> Result<Url> {
        let mut segments = vec![
            "bitable",
            "v1",
            "apps",
            table.app_token.as_str(),
            "tables",
            table.table_id.as_str(),
            "records",
        ];
        segments.extend(action);
        self.endpoint(&segments)
    }

    /// Fetch one page of record ids.
    pub async fn list_records_page(
        &self,
        token: &AccessToken,
        table: &TableCoordinate,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<RecordPage> {
        let url = self.records_endpoint(table, None)?;
        let mut query = vec![("page_size", page_size.to_string())];
        if let Some(cursor) = page_token {
            query.push(("page_token", cursor.to_string()));
        }
        let request = self
            .http
            .get(url)
            .bearer_auth(token.value())
            .query(&query);
        let page: Option<RecordPage> = send(request).await?;
        Ok(page.unwrap_or_default())
    }

    /// Delete `ids` in a single call. Returns the number of records deleted.
    pub async fn batch_delete(
        &self,
        token: &AccessToken,
        table: &TableCoordinate,
        ids: &[String],
    ) -> Result<usize> {
        let url = self.records_endpoint(table, Some("batch_delete"))?;
        let request = self
            .http
            .post(url)
            .bearer_auth(token.value())
            .json(&DeleteRequest { records: ids });
        send::<serde_json::Value>(request).await?;
        Ok(ids.len())
    }

    /// Create `records` in a single call. Returns the number of records the
    /// remote reports as created.
    pub async fn batch_create(
        &self,
        token: &AccessToken,
        table: &TableCoordinate,
        records: &[NewRecord],
    ) -> Result<usize> {
        let url = self.records_endpoint(table, Some("batch_create"))?;
        let request = self
            .http
            .post(url)
            .bearer_auth(token.value())
            .json(&CreateRequest { records });
        let data: Option<CreateData> = send(request).await?;
        match data.and_then(|d| d.records) {
            Some(created) => Ok(created.len()),
            None => {
                log::warn!(
                    "batch_create on {table} succeeded without reporting created records"
                );
                Ok(0)
            }
        }
    }
}

async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<Option<T>> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    decode_response(status, &body)
}

/// Classify a response: non-2xx is an HTTP error, a non-zero `code` is a
/// remote error, an unparseable 2xx body is a protocol error.
pub(crate) fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<Option<T>> {
    let success = (200..300).contains(&status);
    let envelope: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if success => {
            return Err(Error::Protocol(format!("malformed response body: {e}")));
        }
        Err(_) => {
            return Err(Error::Http {
                status,
                message: truncate(body),
            });
        }
    };
    if !success {
        let message = if envelope.msg.is_empty() {
            format!("HTTP {status}")
        } else {
            envelope.msg
        };
        return Err(Error::Http { status, message });
    }
    if envelope.code != 0 {
        return Err(Error::Remote {
            code: envelope.code,
            http_status: status,
            message: envelope.msg,
        });
    }
    Ok(envelope.data)
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
