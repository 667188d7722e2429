use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::api::models::{TokenRequest, TokenResponse};
use crate::api::BitableClient;
use crate::config::Credential;
use crate::error::{Error, Result};

const TOKEN_PATH: &[&str] = &["auth", "v3", "tenant_access_token", "internal"];

/// Short-lived tenant access token. Owned by a single sync run; never cached
/// or persisted.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchange an app id and secret for a tenant access token.
///
/// One request, no retry. Every failure (transport, HTTP status, non-zero
/// `code`, missing token) is reported as [`Error::Authentication`] carrying
/// the remote message when there is one.
pub async fn authenticate(client: &BitableClient, credential: &Credential) -> Result<AccessToken> {
    if credential.app_id.trim().is_empty() || credential.app_secret.trim().is_empty() {
        return Err(auth_error("app_id and app_secret must not be empty"));
    }

    let url = client.endpoint(TOKEN_PATH)?;
    log::debug!("Requesting tenant access token for app {}", credential.app_id);

    let issued_at = Utc::now();
    let response = client
        .http()
        .post(url)
        .json(&TokenRequest {
            app_id: &credential.app_id,
            app_secret: &credential.app_secret,
        })
        .send()
        .await
        .map_err(|e| auth_error(Error::from(e).to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| auth_error(Error::from(e).to_string()))?;

    let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();
    if !status.is_success() {
        let message = parsed
            .map(|p| p.msg)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(auth_error(message));
    }

    let parsed = parsed.ok_or_else(|| auth_error("malformed token response"))?;
    if parsed.code != 0 {
        let message = if parsed.msg.is_empty() {
            format!("code {}", parsed.code)
        } else {
            parsed.msg
        };
        return Err(auth_error(message));
    }

    let value = parsed
        .tenant_access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| auth_error("token response did not include tenant_access_token"))?;

    log::info!("Authenticated app {}", credential.app_id);
    Ok(AccessToken {
        value,
        issued_at,
        expires_at: parsed
            .expire
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime)),
    })
}

fn auth_error(message: impl Into<String>) -> Error {
    Error::Authentication {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBitable;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_authenticate_success() {
        let mock = MockBitable::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
            .and(body_json(json!({"app_id": "cli_test", "app_secret": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": "t-abc",
                "expire": 7200
            })))
            .expect(1)
            .mount(&mock.server)
            .await;

        let token = authenticate(&mock.client(), &mock.credential()).await.unwrap();
        assert_eq!(token.value(), "t-abc");
        let lifetime = token.expires_at().unwrap() - token.issued_at();
        assert_eq!(lifetime, Duration::seconds(7200));
        assert!(!format!("{token:?}").contains("t-abc"));
    }

    #[tokio::test]
    async fn test_authenticate_nonzero_code() {
        let mock = MockBitable::start().await;
        mock.mock_auth_failure(7, "invalid secret").await;

        let err = authenticate(&mock.client(), &mock.credential()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert!(err.to_string().contains("invalid secret"), "got {err}");
    }

    #[tokio::test]
    async fn test_authenticate_http_error() {
        let mock = MockBitable::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock.server)
            .await;

        let err = authenticate(&mock.client(), &mock.credential()).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 503"), "got {err}");
    }

    #[tokio::test]
    async fn test_authenticate_missing_token() {
        let mock = MockBitable::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0})))
            .mount(&mock.server)
            .await;

        let err = authenticate(&mock.client(), &mock.credential()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_empty_secret_makes_no_call() {
        let mock = MockBitable::start().await;
        let mut credential = mock.credential();
        credential.app_secret.clear();

        let err = authenticate(&mock.client(), &credential).await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert_eq!(mock.request_count().await, 0);
    }
}
