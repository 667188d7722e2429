//! Wire types for the Bitable open API.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Common response envelope: a status code (`0` on success), a message and
/// an optional payload.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub app_id: &'a str,
    pub app_secret: &'a str,
}

/// The token endpoint returns its payload at the top level, not under `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub tenant_access_token: Option<String>,
    /// Lifetime in seconds.
    pub expire: Option<i64>,
}

/// One page of the list records endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPage {
    /// `null` on an empty table.
    #[serde(default)]
    pub items: Option<Vec<RecordItem>>,
    pub page_token: Option<String>,
    pub has_more: Option<bool>,
}

impl RecordPage {
    /// Cursor for the next page, if there is one. An empty token or an
    /// explicit `has_more: false` ends the listing.
    pub fn next_cursor(&self) -> Option<&str> {
        if self.has_more == Some(false) {
            return None;
        }
        self.page_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn into_record_ids(self) -> Vec<String> {
        self.items
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.record_id)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordItem {
    pub record_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteRequest<'a> {
    pub records: &'a [String],
}

/// A record to create: field name to wire value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecord {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRequest<'a> {
    pub records: &'a [NewRecord],
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateData {
    pub records: Option<Vec<IgnoredAny>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_cursor() {
        let page: RecordPage =
            serde_json::from_str(r#"{"items": [], "page_token": "A", "has_more": true}"#).unwrap();
        assert_eq!(page.next_cursor(), Some("A"));

        let page: RecordPage = serde_json::from_str(r#"{"items": [], "page_token": ""}"#).unwrap();
        assert_eq!(page.next_cursor(), None);

        let page: RecordPage =
            serde_json::from_str(r#"{"page_token": "A", "has_more": false}"#).unwrap();
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn test_null_items() {
        let page: RecordPage =
            serde_json::from_str(r#"{"items": null, "has_more": false, "total": 0}"#).unwrap();
        assert!(page.into_record_ids().is_empty());
    }

    #[test]
    fn test_record_ids_ignore_fields() {
        let page: RecordPage = serde_json::from_str(
            r#"{"items": [{"record_id": "rec1", "fields": {"a": 1}}, {"record_id": "rec2"}]}"#,
        )
        .unwrap();
        assert_eq!(page.into_record_ids(), vec!["rec1", "rec2"]);
    }
}
