//! Configuration directory and ambient session lookup.
//!
//! Handles:
//! - Locating the per-tool configuration directory
//! - Reading the CLI config (endpoints, current account/workspace)
//! - Reading stored credentials
//! - Resolving all of the above into a [`SessionContext`]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// Overrides the configuration directory.
pub const CONFIG_DIR_ENV: &str = "VT_CONFIG_DIR";

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Credentials file name.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Region used when `VT_REGION` is unset.
pub const DEFAULT_REGION: &str = "aws-us-east-1";

/// Root of the CLI's on-disk state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `VT_CONFIG_DIR` if set, otherwise the platform config directory.
    pub fn discover() -> Result<Self, TelemetryError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(Self::new(dir));
        }

        ProjectDirs::from("com", "plfm", "vt")
            .map(|dirs| Self::new(dirs.config_dir()))
            .ok_or_else(|| {
                TelemetryError::storage(
                    "locating config directory",
                    PathBuf::new(),
                    "could not determine home directory",
                )
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one store file per store identifier.
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("telemetry")
    }

    /// Prefix for failure artifacts; the worker appends `-<suffix>.json`.
    pub fn errors_prefix(&self) -> PathBuf {
        self.root.join("errors").join("flush")
    }
}

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API endpoint URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Telemetry endpoint URL, when it differs from the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_url: Option<String>,

    /// Current context.
    #[serde(default)]
    pub context: SessionScope,
}

fn default_api_url() -> String {
    std::env::var("VT_API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            telemetry_url: None,
            context: SessionScope::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return default.
    pub fn load(dir: &ConfigDir) -> Result<Self, TelemetryError> {
        let path = dir.root().join(CONFIG_FILE);

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| TelemetryError::storage("reading config", &path, e))?;

        serde_json::from_str(&contents)
            .map_err(|e| TelemetryError::storage("parsing config", &path, e))
    }

    /// Save config to disk.
    pub fn save(&self, dir: &ConfigDir) -> Result<(), TelemetryError> {
        let path = dir.root().join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| TelemetryError::storage("serializing config", &path, e))?;
        write_private(&path, contents.as_bytes())
            .map_err(|e| TelemetryError::storage("writing config", &path, e))
    }

    /// Where error batches are sent: `VT_TELEMETRY_URL`, then the
    /// configured telemetry URL, then the API URL.
    pub fn telemetry_url(&self) -> String {
        std::env::var("VT_TELEMETRY_URL")
            .ok()
            .or_else(|| self.telemetry_url.clone())
            .unwrap_or_else(|| self.api_url.clone())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Currently selected account and workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Stored credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Access token.
    pub token: String,

    /// Token expiration time (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(token: String) -> Self {
        Self {
            token,
            expires_at: None,
        }
    }

    /// Load credentials from disk.
    pub fn load(dir: &ConfigDir) -> Result<Option<Self>, TelemetryError> {
        let path = dir.root().join(CREDENTIALS_FILE);

        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| TelemetryError::storage("reading credentials", &path, e))?;

        let creds: Self = serde_json::from_str(&contents)
            .map_err(|e| TelemetryError::storage("parsing credentials", &path, e))?;

        Ok(Some(creds))
    }

    /// Save credentials to disk.
    pub fn save(&self, dir: &ConfigDir) -> Result<(), TelemetryError> {
        let path = dir.root().join(CREDENTIALS_FILE);
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| TelemetryError::storage("serializing credentials", &path, e))?;
        write_private(&path, contents.as_bytes())
            .map_err(|e| TelemetryError::storage("writing credentials", &path, e))
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            Utc::now() >= expires_at
        } else {
            false
        }
    }
}

/// Everything needed to authenticate a telemetry submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub account: String,
    pub workspace: String,
    pub token: String,
    pub user_agent: String,
    pub region: String,
    /// Base URL of the telemetry service.
    pub endpoint: String,
}

impl SessionContext {
    /// Resolve the session from the config directory and environment.
    ///
    /// Any missing piece is an [`TelemetryError::Auth`]: the flush worker
    /// runs without a user present, so there is nobody to prompt.
    pub fn resolve(dir: &ConfigDir) -> Result<Self, TelemetryError> {
        let config = Config::load(dir).map_err(|e| TelemetryError::Auth(e.to_string()))?;
        let credentials = Credentials::load(dir)
            .map_err(|e| TelemetryError::Auth(e.to_string()))?
            .ok_or_else(|| TelemetryError::Auth("not logged in".to_string()))?;

        if credentials.is_expired() {
            return Err(TelemetryError::Auth("stored token has expired".to_string()));
        }

        let account = config
            .context
            .account
            .clone()
            .ok_or_else(|| TelemetryError::Auth("no account selected".to_string()))?;
        let workspace = config
            .context
            .workspace
            .clone()
            .unwrap_or_else(|| "master".to_string());

        Ok(Self {
            account,
            workspace,
            token: credentials.token,
            user_agent: user_agent(),
            region: std::env::var("VT_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            endpoint: config.telemetry_url(),
        })
    }
}

/// User agent sent with every telemetry request.
pub fn user_agent() -> String {
    format!("vt-telemetry/{}", env!("CARGO_PKG_VERSION"))
}

/// Write `contents` to `path`, creating parent directories, readable only
/// by the owner on unix.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)?;
    }

    Ok(())
}
