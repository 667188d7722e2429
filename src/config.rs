use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::sync::SyncOptions;

pub const DEFAULT_ENDPOINT: &str = "https://open.feishu.cn/open-apis";

pub const ENV_APP_ID: &str = "BITABLE_APP_ID";
pub const ENV_APP_SECRET: &str = "BITABLE_APP_SECRET";
pub const ENV_ENDPOINT: &str = "BITABLE_ENDPOINT";
pub const ENV_APP_TOKEN: &str = "BITABLE_APP_TOKEN";
pub const ENV_TABLE_ID: &str = "BITABLE_TABLE_ID";

/// Application identity exchanged for an access token at the start of a run.
#[derive(Clone)]
pub struct Credential {
    pub app_id: String,
    pub app_secret: String,
    pub api_endpoint: Url,
}

impl Credential {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        api_endpoint: Url,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            api_endpoint,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("api_endpoint", &self.api_endpoint.as_str())
            .finish()
    }
}

/// Identifies a remote table: the Bitable app token plus the table id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCoordinate {
    pub app_token: String,
    pub table_id: String,
}

impl TableCoordinate {
    pub fn new(app_token: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            app_token: app_token.into(),
            table_id: table_id.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_token.trim().is_empty() {
            return Err(Error::InvalidInput("app_token must not be empty".into()));
        }
        if self.table_id.trim().is_empty() {
            return Err(Error::InvalidInput("table_id must not be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Display for TableCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_token, self.table_id)
    }
}

/// User settings, layered: config file, then environment, then CLI flags.
///
/// Every field is optional so that a partial file (or none at all) is valid;
/// credentials have no defaults.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub endpoint: Option<String>,
    pub app_token: Option<String>,
    pub table_id: Option<String>,
    pub batch_size: Option<usize>,
    pub page_size: Option<usize>,
    pub max_pages: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("app_token", &self.app_token)
            .field("table_id", &self.table_id)
            .field("batch_size", &self.batch_size)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("timeout_secs", &self.timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Settings {
    /// Default config file location (`~/.bitable-sync/config.json`).
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".bitable-sync");
        Ok(dir.join("config.json"))
    }

    /// Load settings from a JSON file. A missing file yields empty settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))
    }

    /// Overlay values from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup. Empty values are
    /// ignored.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = get(ENV_APP_ID) {
            self.app_id = Some(v);
        }
        if let Some(v) = get(ENV_APP_SECRET) {
            self.app_secret = Some(v);
        }
        if let Some(v) = get(ENV_ENDPOINT) {
            self.endpoint = Some(v);
        }
        if let Some(v) = get(ENV_APP_TOKEN) {
            self.app_token = Some(v);
        }
        if let Some(v) = get(ENV_TABLE_ID) {
            self.table_id = Some(v);
        }
        self
    }

    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let url =
            Url::parse(raw).map_err(|e| Error::Config(format!("invalid endpoint {raw}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("endpoint {raw} cannot be used as a base URL")));
        }
        Ok(url)
    }

    pub fn credential(&self) -> Result<Credential> {
        let app_id = require(&self.app_id, "app_id", ENV_APP_ID)?;
        let app_secret = require(&self.app_secret, "app_secret", ENV_APP_SECRET)?;
        Ok(Credential::new(app_id, app_secret, self.endpoint_url()?))
    }

    pub fn table(&self) -> Result<TableCoordinate> {
        let app_token = require(&self.app_token, "app_token", ENV_APP_TOKEN)?;
        let table_id = require(&self.table_id, "table_id", ENV_TABLE_ID)?;
        Ok(TableCoordinate::new(app_token, table_id))
    }

    /// Sync options with any configured tuning applied over the defaults.
    pub fn sync_options(&self) -> SyncOptions {
        let mut options = SyncOptions::default();
        if let Some(v) = self.batch_size {
            options.batch_size = v;
        }
        if let Some(v) = self.page_size {
            options.page_size = v;
        }
        if let Some(v) = self.max_pages {
            options.max_pages = v;
        }
        if let Some(v) = self.timeout_secs {
            options.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.concurrency {
            options.concurrency = v;
        }
        options
    }
}

fn require(value: &Option<String>, name: &str, env: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Config(format!(
                "{name} is not configured; set {env} or add \"{name}\" to the config file"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"app_id": "cli_a", "batch_size": 100}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.app_id.as_deref(), Some("cli_a"));
        assert_eq!(settings.sync_options().batch_size, 100);
        assert_eq!(settings.sync_options().page_size, 500);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"app_sercet": "x"}"#).unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err}");
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            (ENV_APP_ID, "from-env"),
            (ENV_APP_SECRET, "s3cret"),
            (ENV_TABLE_ID, ""),
        ]
        .into_iter()
        .collect();
        let settings = Settings {
            app_id: Some("from-file".into()),
            table_id: Some("tbl".into()),
            ..Default::default()
        }
        .with_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.app_id.as_deref(), Some("from-env"));
        assert_eq!(settings.app_secret.as_deref(), Some("s3cret"));
        // Empty env values do not clobber the file.
        assert_eq!(settings.table_id.as_deref(), Some("tbl"));
    }

    #[test]
    fn test_credential_requires_secret() {
        let settings = Settings {
            app_id: Some("cli_a".into()),
            ..Default::default()
        };
        let err = settings.credential().unwrap_err();
        assert!(err.to_string().contains(ENV_APP_SECRET), "got {err}");
    }

    #[test]
    fn test_credential_default_endpoint() {
        let settings = Settings {
            app_id: Some("cli_a".into()),
            app_secret: Some("secret".into()),
            ..Default::default()
        };
        let cred = settings.credential().unwrap();
        assert_eq!(cred.api_endpoint.as_str(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::new("cli_a", "hunter2", Url::parse(DEFAULT_ENDPOINT).unwrap());
        assert!(!format!("{cred:?}").contains("hunter2"));
        let settings = Settings {
            app_secret: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn test_table_validation() {
        assert!(TableCoordinate::new("app", "tbl").validate().is_ok());
        assert!(TableCoordinate::new("", "tbl").validate().is_err());
        assert!(TableCoordinate::new("app", "  ").validate().is_err());
    }
}
