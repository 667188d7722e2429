//! Mock Bitable server and responders shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::api::BitableClient;
use crate::auth::AccessToken;
use crate::config::{Credential, TableCoordinate};

pub const APP_TOKEN: &str = "bascnTest";
pub const TABLE_ID: &str = "tblTest";
pub const TOKEN: &str = "t-test";

/// Body of a list records page.
pub fn list_page(ids: &[&str], cursor: Option<&str>) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| json!({"record_id": id, "fields": {}}))
        .collect();
    let mut data = json!({
        "items": items,
        "has_more": cursor.is_some_and(|c| !c.is_empty()),
        "total": ids.len(),
    });
    if let Some(cursor) = cursor {
        data["page_token"] = json!(cursor);
    }
    json!({"code": 0, "msg": "success", "data": data})
}

/// Replies success to batch calls, echoing one record per requested record
/// (optionally capped to simulate partial acceptance).
#[derive(Default)]
pub struct EchoBatch {
    accept_at_most: Option<usize>,
    delay: Option<Duration>,
}

impl EchoBatch {
    pub fn accepting_at_most(n: usize) -> Self {
        Self {
            accept_at_most: Some(n),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Respond for EchoBatch {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let requested = serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body["records"].as_array().map(Vec::len))
            .unwrap_or(0);
        let accepted = self.accept_at_most.map_or(requested, |max| requested.min(max));
        let records: Vec<Value> = (0..accepted)
            .map(|i| json!({"record_id": format!("recNew{i}"), "fields": {}}))
            .collect();
        let template = ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "success",
            "data": {"records": records}
        }));
        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

/// Like [`EchoBatch`], but the n-th call (1-based) gets a non-zero code.
pub struct FailNth {
    fail_on: usize,
    calls: AtomicUsize,
    echo: EchoBatch,
}

impl FailNth {
    pub fn new(fail_on: usize) -> Self {
        Self {
            fail_on,
            calls: AtomicUsize::new(0),
            echo: EchoBatch::default(),
        }
    }
}

impl Respond for FailNth {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 1254001, "msg": "WrongRequestBody"}))
        } else {
            self.echo.respond(request)
        }
    }
}

/// A mock Bitable open API.
pub struct MockBitable {
    pub server: MockServer,
}

impl MockBitable {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn base_url(&self) -> Url {
        Url::parse(&format!("{}/open-apis", self.server.uri())).unwrap()
    }

    pub fn client(&self) -> BitableClient {
        self.client_with_timeout(Duration::from_secs(5))
    }

    pub fn client_with_timeout(&self, timeout: Duration) -> BitableClient {
        BitableClient::new(self.base_url(), timeout).unwrap()
    }

    pub fn credential(&self) -> Credential {
        Credential::new("cli_test", "secret", self.base_url())
    }

    pub fn token(&self) -> AccessToken {
        AccessToken::new(TOKEN)
    }

    pub fn table(&self) -> TableCoordinate {
        TableCoordinate::new(APP_TOKEN, TABLE_ID)
    }

    pub fn auth_path(&self) -> String {
        "/open-apis/auth/v3/tenant_access_token/internal".to_string()
    }

    pub fn records_path(&self) -> String {
        format!("/open-apis/bitable/v1/apps/{APP_TOKEN}/tables/{TABLE_ID}/records")
    }

    pub fn batch_delete_path(&self) -> String {
        format!("{}/batch_delete", self.records_path())
    }

    pub fn batch_create_path(&self) -> String {
        format!("{}/batch_create", self.records_path())
    }

    pub async fn mock_auth_success(&self) {
        Mock::given(method("POST"))
            .and(path(self.auth_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": TOKEN,
                "expire": 7200
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_auth_failure(&self, code: i64, msg: &str) {
        Mock::given(method("POST"))
            .and(path(self.auth_path()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": code, "msg": msg})),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve `pages` from the list endpoint, chained with cursors `c1`, `c2`, ...
    pub async fn mock_list(&self, pages: &[&[&str]]) {
        let last = pages.len().saturating_sub(1);
        for (i, ids) in pages.iter().enumerate() {
            let cursor = (i < last).then(|| format!("c{}", i + 1));
            let body = list_page(ids, cursor.as_deref());
            let mock = Mock::given(method("GET")).and(path(self.records_path()));
            let mock = if i == 0 {
                mock.and(query_param_is_missing("page_token"))
            } else {
                mock.and(query_param("page_token", format!("c{i}")))
            };
            mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&self.server)
                .await;
        }
    }

    pub async fn mock_batch_delete(&self, responder: impl Respond + 'static) {
        Mock::given(method("POST"))
            .and(path(self.batch_delete_path()))
            .respond_with(responder)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_batch_create(&self, responder: impl Respond + 'static) {
        Mock::given(method("POST"))
            .and(path(self.batch_create_path()))
            .respond_with(responder)
            .mount(&self.server)
            .await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .len()
    }

    pub async fn requests_to(&self, request_path: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }
}
