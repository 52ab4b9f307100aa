//! Configuration management for Docket gateway
//!
//! Values resolve as `env > TOML file > default`.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::conversation::MenuOptions;
use crate::sessions::SessionBackend;
use crate::storage::StorageBackend;
use crate::{Error, Result};

use self::file::DocketConfigFile;

/// Default HTTP port
const DEFAULT_PORT: u16 = 5000;

/// Default inactivity before a user is reset to the greeting (30 minutes)
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// Default reaper interval
const DEFAULT_REAP_INTERVAL_SECS: u64 = 60;

/// Default media download timeout
const DEFAULT_MEDIA_FETCH_TIMEOUT_SECS: u64 = 8;

/// Default blob upload timeout
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 8;

/// Default budget for a whole intake; Twilio abandons webhooks after 15s
const DEFAULT_INTAKE_DEADLINE_SECS: u64 = 12;

/// Docket gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database, local blobs)
    pub data_dir: PathBuf,

    /// `SQLite` database file
    pub database_path: PathBuf,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Messaging provider credentials
    pub twilio: TwilioConfig,

    /// Blob storage configuration
    pub storage: StorageConfig,

    /// Conversation state configuration
    pub sessions: SessionConfig,

    /// Outbound HTTP timeouts
    pub http: HttpConfig,

    /// Recognized menu options
    pub menu: MenuOptions,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Externally reachable base URL, used for locally stored document links
    pub public_base_url: String,

    /// Webhook requests per minute (from `DOCKET_WEBHOOK_RPM`)
    pub webhook_rpm: Option<u32>,
}

/// Twilio credentials
#[derive(Debug, Clone, Default)]
pub struct TwilioConfig {
    /// Account SID, also the basic-auth user for media downloads
    pub account_sid: Option<String>,

    /// Auth token, the basic-auth password for media downloads
    pub auth_token: Option<SecretString>,
}

impl TwilioConfig {
    /// Both credentials, or an error naming the missing one
    ///
    /// # Errors
    ///
    /// Returns error if either credential is unset
    pub fn credentials(&self) -> Result<(String, SecretString)> {
        let sid = self
            .account_sid
            .clone()
            .ok_or_else(|| Error::Config("TWILIO_ACCOUNT_SID is not set".to_string()))?;
        let token = self
            .auth_token
            .clone()
            .ok_or_else(|| Error::Config("TWILIO_AUTH_TOKEN is not set".to_string()))?;
        Ok((sid, token))
    }
}

/// Blob storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend storing document blobs
    pub backend: StorageBackend,

    /// Bucket name for the gcs backend
    pub bucket: Option<String>,

    /// Service account key file for the gcs backend
    pub credentials_path: Option<PathBuf>,

    /// Root directory for the local backend
    pub local_dir: PathBuf,
}

/// Conversation state configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Store backing per-user state
    pub backend: SessionBackend,

    /// Users idle this long are reset to the greeting
    pub idle_timeout: Duration,

    /// How often the reaper runs
    pub reap_interval: Duration,
}

/// Outbound HTTP timeouts
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub media_fetch_timeout: Duration,
    pub upload_timeout: Duration,

    /// Bound on fetch, upload and metadata insert together
    pub intake_deadline: Duration,
}

impl Config {
    /// Load configuration from the environment and the optional config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the menu table is invalid or the gcs backend lacks
    /// a bucket or credentials
    #[allow(clippy::too_many_lines)]
    pub fn from_sources(fc: DocketConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Determine data directory (~/.local/share/docket on Linux)
        let data_dir = env("DOCKET_DATA_DIR")
            .map(PathBuf::from)
            .or(fc.server.data_dir)
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("docket"))
            });

        let database_path = data_dir.join("docket.db");

        // Server config (env > toml > default)
        let port = env("DOCKET_PORT")
            .or_else(|| env("PORT"))
            .and_then(|s| s.parse().ok())
            .or(fc.server.port)
            .unwrap_or(DEFAULT_PORT);

        let server = ServerConfig {
            port,
            public_base_url: env("DOCKET_PUBLIC_URL")
                .or(fc.server.public_base_url)
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            webhook_rpm: env("DOCKET_WEBHOOK_RPM")
                .and_then(|s| s.parse().ok())
                .or(fc.server.webhook_rpm)
                .filter(|rpm| *rpm > 0),
        };

        let twilio = TwilioConfig {
            account_sid: env("TWILIO_ACCOUNT_SID").or(fc.twilio.account_sid),
            auth_token: env("TWILIO_AUTH_TOKEN")
                .or(fc.twilio.auth_token)
                .map(SecretString::from),
        };

        let storage = StorageConfig {
            backend: env("DOCKET_STORAGE_BACKEND")
                .or(fc.storage.backend)
                .map(|s| StorageBackend::from_str(&s))
                .unwrap_or_default(),
            bucket: env("DOCKET_STORAGE_BUCKET")
                .or_else(|| env("FIREBASE_STORAGE_BUCKET"))
                .or(fc.storage.bucket),
            credentials_path: env("DOCKET_STORAGE_CREDENTIALS")
                .or_else(|| env("FIREBASE_CREDENTIALS_PATH"))
                .or_else(|| env("GOOGLE_APPLICATION_CREDENTIALS"))
                .map(PathBuf::from)
                .or(fc.storage.credentials_path),
            local_dir: fc.storage.local_dir.unwrap_or_else(|| data_dir.clone()),
        };

        if storage.backend == StorageBackend::Gcs {
            if storage.bucket.is_none() {
                return Err(Error::Config(
                    "gcs storage requires DOCKET_STORAGE_BUCKET".to_string(),
                ));
            }
            if storage.credentials_path.is_none() {
                return Err(Error::Config(
                    "gcs storage requires FIREBASE_CREDENTIALS_PATH".to_string(),
                ));
            }
        }

        let sessions = SessionConfig {
            backend: env("DOCKET_SESSION_BACKEND")
                .or(fc.sessions.backend)
                .map(|s| SessionBackend::from_str(&s))
                .unwrap_or_default(),
            idle_timeout: Duration::from_secs(
                env("DOCKET_SESSION_IDLE_SECS")
                    .and_then(|s| s.parse().ok())
                    .or(fc.sessions.idle_timeout_secs)
                    .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
            reap_interval: Duration::from_secs(
                fc.sessions
                    .reap_interval_secs
                    .unwrap_or(DEFAULT_REAP_INTERVAL_SECS)
                    .max(1),
            ),
        };

        let http = HttpConfig {
            media_fetch_timeout: Duration::from_secs(
                fc.http
                    .media_fetch_timeout_secs
                    .unwrap_or(DEFAULT_MEDIA_FETCH_TIMEOUT_SECS),
            ),
            upload_timeout: Duration::from_secs(
                fc.http
                    .upload_timeout_secs
                    .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
            ),
            intake_deadline: Duration::from_secs(
                fc.http
                    .intake_deadline_secs
                    .unwrap_or(DEFAULT_INTAKE_DEADLINE_SECS),
            ),
        };

        let menu = fc.menu.unwrap_or_default();
        menu.validate()?;

        Ok(Self {
            data_dir,
            database_path,
            server,
            twilio,
            storage,
            sessions,
            http,
            menu,
        })
    }
}
