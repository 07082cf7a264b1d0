//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup. Data-store credentials are injected as
//! environment variables by the deployment (or a local `.env` file).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default ceiling on the whole context Initialize sequence.
pub const DEFAULT_CONTEXT_INIT_TIMEOUT_SECS: u64 = 10;

/// Default time a user's context store may sit unused before it is dropped.
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Base URL of the hosted data store (e.g. `https://xyz.supabase.co`)
    pub supabase_url: String,
    /// Public API key sent with every data-store request
    pub supabase_anon_key: String,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// File holding the persisted active-context keys
    pub context_key_file: PathBuf,
    /// Ceiling on the context Initialize sequence
    pub context_init_timeout: Duration,
    /// Namespace the persisted context key by user id
    pub context_key_per_user: bool,
    /// Drop a user's context store after this long without a request
    pub session_idle_timeout: Duration,

    // --- Secrets ---
    /// HS256 secret the identity provider signs session tokens with (raw bytes)
    pub jwt_secret: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            context_key_file: PathBuf::from("data/active_context.json"),
            context_init_timeout: Duration::from_secs(DEFAULT_CONTEXT_INIT_TIMEOUT_SECS),
            context_key_per_user: true,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECS),
            jwt_secret: b"test_jwt_secret_32_bytes_minimum!".to_vec(),
        }
    }
}

impl Config {
    /// Config used by tests.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let context_init_timeout = match env::var("CONTEXT_INIT_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid("CONTEXT_INIT_TIMEOUT_SECS", raw))?,
            Err(_) => Duration::from_secs(DEFAULT_CONTEXT_INIT_TIMEOUT_SECS),
        };

        let session_idle_timeout = match env::var("SESSION_IDLE_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid("SESSION_IDLE_TIMEOUT_SECS", raw))?,
            Err(_) => Duration::from_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECS),
        };

        let context_key_per_user = match env::var("CONTEXT_KEY_PER_USER") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid("CONTEXT_KEY_PER_USER", raw))?,
            Err(_) => true,
        };

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            context_key_file: env::var("CONTEXT_KEY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/active_context.json")),
            context_init_timeout,
            context_key_per_user,
            session_idle_timeout,

            jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?
                .trim()
                .to_string()
                .into_bytes(),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
