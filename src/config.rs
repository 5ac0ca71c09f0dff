//! Application configuration loaded from environment variables.
//!
//! Aggregator secrets are only used for full re-authentication exchanges;
//! everything else talks to the aggregator with a bearer token.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default aggregator API root (GoCardless Bank Account Data, formerly Nordigen).
pub const DEFAULT_AGGREGATOR_URL: &str = "https://bankaccountdata.gocardless.com/api/v2";

/// How far back the first sync of a never-synced account reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstSyncWindow {
    /// From the first day of the current calendar month.
    CurrentMonth,
    /// The last `n` days.
    LastDays(u32),
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Aggregator API root, without trailing slash
    pub aggregator_url: String,
    /// Directory holding the local credential file
    pub credential_dir: PathBuf,
    /// GCP project for Firestore; in-memory store when unset
    pub gcp_project_id: Option<String>,
    /// Frontend URL (CORS origin and requisition redirect target)
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Sync pass attempt ceiling
    pub sync_max_attempts: u32,
    /// Fixed delay between sync pass attempts
    pub sync_retry_delay: Duration,
    /// Window used when an account has never been synced
    pub first_sync_window: FirstSyncWindow,

    // --- Secrets ---
    /// Aggregator application secret id
    pub secret_id: String,
    /// Aggregator application secret key
    pub secret_key: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            aggregator_url: "http://127.0.0.1:9".to_string(),
            credential_dir: PathBuf::from(".bankfeed-test"),
            gcp_project_id: None,
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            sync_max_attempts: 3,
            sync_retry_delay: Duration::from_millis(10),
            first_sync_window: FirstSyncWindow::CurrentMonth,
            secret_id: "test_secret_id".to_string(),
            secret_key: "test_secret_key".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let first_sync_window = match env::var("SYNC_FIRST_WINDOW_DAYS") {
            Ok(raw) => FirstSyncWindow::LastDays(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("SYNC_FIRST_WINDOW_DAYS"))?,
            ),
            Err(_) => FirstSyncWindow::CurrentMonth,
        };

        let sync_max_attempts: u32 = env::var("SYNC_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("SYNC_MAX_ATTEMPTS"))?;
        if sync_max_attempts == 0 {
            return Err(ConfigError::Invalid("SYNC_MAX_ATTEMPTS"));
        }

        let retry_delay_ms: u64 = env::var("SYNC_RETRY_DELAY_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("SYNC_RETRY_DELAY_MS"))?;

        Ok(Self {
            aggregator_url: env::var("NORDIGEN_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_AGGREGATOR_URL.to_string()),
            credential_dir: env::var("CREDENTIAL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".bankfeed")),
            gcp_project_id: env::var("GCP_PROJECT_ID").ok().filter(|p| !p.is_empty()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            sync_max_attempts,
            sync_retry_delay: Duration::from_millis(retry_delay_ms),
            first_sync_window,

            secret_id: env::var("NORDIGEN_SECRET_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("NORDIGEN_SECRET_ID"))?,
            secret_key: env::var("NORDIGEN_SECRET_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("NORDIGEN_SECRET_KEY"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
