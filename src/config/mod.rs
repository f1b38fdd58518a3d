/// Configuration management for relsync
///
/// Handles server binding, the record store location, remote service endpoints and
/// the timing knobs of the reconciliation loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Record store configuration
    pub database: DatabaseConfig,
    /// Remote services (process engine, permissions, notifications)
    pub remote: RemoteConfig,
    /// Reconciliation timing
    pub sync: SyncConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL (e.g., "sqlite://data/relsync.db")
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Camunda REST base URL, including the `/engine-rest` suffix
    pub engine_url: String,
    pub permissions_url: String,
    /// Empty disables user notifications (they are only logged)
    pub notification_url: Option<String>,
    /// Upper bound for every remote call
    pub timeout: Duration,
}

/// Timing of the sweep / garbage collection loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Marks younger than this are left alone by the sweeper
    pub mark_age_limit: Duration,
    /// Period of the background sweep + cleanup tick
    pub cleanup_cycle: Duration,
    /// Page size used by the module / variable garbage collection passes
    pub page_size: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mark_age_limit: Duration::from_secs(60),
            cleanup_cycle: Duration::from_secs(600),
            page_size: 100,
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let sync_defaults = SyncConfig::default();
        Self {
            server: ServerConfig {
                host: env_or("RELSYNC_HOST", "0.0.0.0"),
                port: env_or("RELSYNC_PORT", "8080").parse().unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: env_or("RELSYNC_DATABASE_URL", "sqlite://data/relsync.db"),
            },
            remote: RemoteConfig {
                engine_url: env_or("RELSYNC_ENGINE_URL", "http://localhost:8080/engine-rest"),
                permissions_url: env_or("RELSYNC_PERMISSIONS_URL", "http://localhost:8081"),
                notification_url: std::env::var("RELSYNC_NOTIFICATION_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
                timeout: env_duration("RELSYNC_HTTP_TIMEOUT", Duration::from_secs(30)),
            },
            sync: SyncConfig {
                mark_age_limit: env_duration("RELSYNC_MARK_AGE_LIMIT", sync_defaults.mark_age_limit),
                cleanup_cycle: env_duration("RELSYNC_CLEANUP_CYCLE", sync_defaults.cleanup_cycle),
                page_size: env_or("RELSYNC_CLEANUP_PAGE_SIZE", "100")
                    .parse()
                    .ok()
                    .filter(|size: &i64| *size > 0)
                    .unwrap_or(sync_defaults.page_size),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_duration(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => parse_duration(&raw).unwrap_or_else(|| {
            tracing::warn!("Ignoring unparsable duration {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Parse durations like "250ms", "30s", "10m", "1h"; a bare number is seconds
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    match unit.trim() {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
