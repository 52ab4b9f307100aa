//! TOML configuration file loading
//!
//! Supports `~/.config/docket/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::conversation::MenuOptions;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DocketConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Messaging provider credentials
    #[serde(default)]
    pub twilio: TwilioFileConfig,

    /// Blob storage configuration
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// Conversation state configuration
    #[serde(default)]
    pub sessions: SessionsFileConfig,

    /// Outbound HTTP timeouts
    #[serde(default)]
    pub http: HttpFileConfig,

    /// Menu option table; replaces the built-in table when present
    #[serde(default)]
    pub menu: Option<MenuOptions>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP port
    pub port: Option<u16>,

    /// Externally reachable base URL of this gateway
    pub public_base_url: Option<String>,

    /// Webhook requests per minute before answering 429
    pub webhook_rpm: Option<u32>,

    /// Data directory override
    pub data_dir: Option<PathBuf>,
}

/// Twilio credentials
#[derive(Debug, Default, Deserialize)]
pub struct TwilioFileConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
}

/// Blob storage configuration
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// "local" or "gcs"
    pub backend: Option<String>,

    /// Bucket name for the gcs backend
    pub bucket: Option<String>,

    /// Service account key file for the gcs backend
    pub credentials_path: Option<PathBuf>,

    /// Directory for the local backend
    pub local_dir: Option<PathBuf>,
}

/// Conversation state configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionsFileConfig {
    /// "memory" or "sqlite"
    pub backend: Option<String>,

    /// Reset users idle for this many seconds
    pub idle_timeout_secs: Option<u64>,

    /// How often to look for idle users
    pub reap_interval_secs: Option<u64>,
}

/// Outbound HTTP timeouts
#[derive(Debug, Default, Deserialize)]
pub struct HttpFileConfig {
    pub media_fetch_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub intake_deadline_secs: Option<u64>,
}

/// Load the config file from the default location
///
/// Returns `DocketConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> DocketConfigFile {
    let path = std::env::var("DOCKET_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(config_file_path);

    path.map_or_else(DocketConfigFile::default, |p| load_config_file_from(&p))
}

/// Load the config file at `path`
pub fn load_config_file_from(path: &Path) -> DocketConfigFile {
    if !path.exists() {
        return DocketConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                DocketConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            DocketConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/docket/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("docket").join("config.toml"))
}
