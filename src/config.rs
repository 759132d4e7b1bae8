//! Persistent client configuration.
//!
//! Settings live as JSON in `<store dir>/config.json` alongside the download
//! ledger. The store directory resolves from the `--store` flag, then the
//! `JELLYDL_STORE` environment variable, then `~/.jellydl`. Individual
//! settings can be overridden per invocation via `JELLYDL_SERVER`,
//! `JELLYDL_TOKEN`, `JELLYDL_USER_ID` and `JELLYDL_RATE`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// File name of the config inside the store directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default store directory name under the user's home.
const DEFAULT_STORE_DIR: &str = ".jellydl";

/// Environment variable overriding the store directory.
pub const ENV_STORE: &str = "JELLYDL_STORE";
/// Environment variable overriding the server URL.
pub const ENV_SERVER: &str = "JELLYDL_SERVER";
/// Environment variable overriding the access token.
pub const ENV_TOKEN: &str = "JELLYDL_TOKEN";
/// Environment variable overriding the user id.
pub const ENV_USER_ID: &str = "JELLYDL_USER_ID";
/// Environment variable overriding the default rate limit.
pub const ENV_RATE: &str = "JELLYDL_RATE";

/// Errors loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No home directory and no explicit store location.
    #[error("cannot resolve store directory: no home directory (set --store or {ENV_STORE})")]
    NoStoreDir,

    /// Filesystem error reading or writing the config file.
    #[error("config file {path}: {source}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file exists but is not valid JSON.
    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A server URL that cannot be normalized.
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidServerUrl {
        /// The rejected input.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A command requiring auth ran without stored credentials.
    #[error("not logged in: run `jellydl login` first (or set {ENV_SERVER} and {ENV_TOKEN})")]
    NotAuthenticated,
}

/// Stored client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Normalized media-server base URL.
    #[serde(default)]
    pub server: String,
    /// Authenticated user id.
    #[serde(default)]
    pub user_id: String,
    /// Access token from the last login.
    #[serde(default)]
    pub token: String,
    /// Stable per-installation device id, minted on first load.
    #[serde(default)]
    pub device_id: String,
    /// Device name reported to the server.
    #[serde(default)]
    pub device_name: String,
    /// Default rate limit spec applied when `--rate` is absent.
    #[serde(default)]
    pub default_rate: String,
    /// Username of the last successful login, for display only.
    #[serde(default)]
    pub last_username: String,
}

impl Config {
    /// Loads the config from `store_dir`, minting a device id if absent.
    ///
    /// A missing file yields a default config. Environment overrides are
    /// applied after loading. The file is written back only when a device
    /// id had to be minted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on unreadable or malformed config files.
    #[instrument]
    pub fn load(store_dir: &Path) -> Result<Self, ConfigError> {
        let path = store_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            debug!(path = %path.display(), "no config file, starting fresh");
            Self::default()
        };

        if config.device_id.is_empty() {
            config.device_id = uuid::Uuid::new_v4().to_string();
            // Persist immediately so the server sees one stable device.
            config.save(store_dir)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Writes the config as pretty-printed JSON into `store_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the directory or file cannot be
    /// written.
    #[instrument(skip(self))]
    pub fn save(&self, store_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(store_dir).map_err(|source| ConfigError::Io {
            path: store_dir.to_path_buf(),
            source,
        })?;

        let path = store_dir.join(CONFIG_FILE_NAME);
        let raw = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, raw).map_err(|source| ConfigError::Io { path, source })
    }

    /// Clears stored credentials, keeping server and device identity.
    pub fn clear_auth(&mut self) {
        self.token.clear();
        self.user_id.clear();
        self.last_username.clear();
    }

    /// Ensures server, token and user id are all present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotAuthenticated`] when any is missing.
    pub fn require_auth(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() || self.token.is_empty() || self.user_id.is_empty() {
            return Err(ConfigError::NotAuthenticated);
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server) = std::env::var(ENV_SERVER)
            && !server.is_empty()
            && let Ok(normalized) = normalize_server_url(&server)
        {
            self.server = normalized;
        }
        if let Ok(token) = std::env::var(ENV_TOKEN)
            && !token.is_empty()
        {
            self.token = token;
        }
        if let Ok(user_id) = std::env::var(ENV_USER_ID)
            && !user_id.is_empty()
        {
            self.user_id = user_id;
        }
        if let Ok(rate) = std::env::var(ENV_RATE)
            && !rate.is_empty()
        {
            self.default_rate = rate;
        }
    }
}

/// Resolves the store directory: flag, then env, then `~/.jellydl`.
///
/// # Errors
///
/// Returns [`ConfigError::NoStoreDir`] when no home directory exists and
/// neither flag nor env is set.
pub fn resolve_store_dir(flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Ok(env) = std::env::var(ENV_STORE)
        && !env.is_empty()
    {
        return Ok(PathBuf::from(env));
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_STORE_DIR))
        .ok_or(ConfigError::NoStoreDir)
}

/// Normalizes a user-supplied server URL.
///
/// Defaults the scheme to `https`, drops query, fragment and a trailing
/// `/web` path, and trims trailing slashes.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidServerUrl`] when the input cannot be
/// parsed as an http(s) URL with a host.
pub fn normalize_server_url(input: &str) -> Result<String, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidServerUrl {
            url: input.to_string(),
            reason: "empty".to_string(),
        });
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&candidate).map_err(|e| ConfigError::InvalidServerUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigError::InvalidServerUrl {
                url: input.to_string(),
                reason: format!("unsupported scheme {other:?}"),
            });
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidServerUrl {
            url: input.to_string(),
            reason: "missing host".to_string(),
        });
    }

    url.set_query(None);
    url.set_fragment(None);

    let mut normalized = url.to_string();
    normalized = normalized.trim_end_matches('/').to_string();
    if let Some(stripped) = normalized.strip_suffix("/web") {
        normalized = stripped.to_string();
    }
    Ok(normalized.trim_end_matches('/').to_string())
}
