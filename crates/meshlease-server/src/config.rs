//! Server configuration.
//!
//! Loads a typed [`ServerConfig`] once at startup from an optional YAML
//! file overlay plus environment variables, with environment variables
//! always winning. Invalid values fail fast with a descriptive error
//! rather than silently clamping to a default.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

/// Server configuration, immutable for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub database_url: String,
    pub redis_url: String,
    pub nonce_ttl_secs: i64,
    pub nonce_cleaner_interval: Duration,
    pub lease_ttl_secs: i64,
    pub max_lease_retries: u32,
    pub lease_retry_delay: Duration,
    pub postgres_pool_size: u32,
    pub cache_enabled: bool,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests_per_minute: u32,
    pub rate_limit_burst: u32,
    pub rate_limit_trusted_proxies: Vec<String>,
    pub max_body_bytes: usize,
}

/// Optional overlay loaded from the YAML file named by
/// `DHCP2P_CONFIG_FILE`, applied before environment variables so that env
/// always wins. Every field is optional; absent fields fall through to the
/// built-in default or, if set, the corresponding environment variable.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
struct FileOverlay {
    bind_addr: Option<String>,
    log_level: Option<String>,
    database_url: Option<String>,
    redis_url: Option<String>,
    nonce_ttl_secs: Option<i64>,
    nonce_cleaner_interval_secs: Option<u64>,
    lease_ttl_secs: Option<i64>,
    max_lease_retries: Option<u32>,
    lease_retry_delay_ms: Option<u64>,
    postgres_pool_size: Option<u32>,
    cache_enabled: Option<bool>,
    rate_limit_enabled: Option<bool>,
    rate_limit_requests_per_minute: Option<u32>,
    rate_limit_burst: Option<u32>,
    rate_limit_trusted_proxies: Option<Vec<String>>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    FileRead { path: String, reason: String },
    #[error("failed to parse config file '{path}': {reason}")]
    FileParse { path: String, reason: String },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ServerConfig {
    /// Load configuration from `DHCP2P_CONFIG_FILE` (if set) overlaid by
    /// `DHCP2P_*` environment variables, env taking precedence.
    pub fn from_env() -> Result<Self, ConfigError> {
        let overlay = load_overlay()?;

        let bind_addr = resolve_bind_addr(overlay.bind_addr.as_deref())?;

        let log_level = env_or("DHCP2P_LOG_LEVEL", overlay.log_level, "info".to_owned());

        let database_url = env_or(
            "DHCP2P_DATABASE_URL",
            overlay.database_url,
            "postgres://localhost/meshlease".to_owned(),
        );

        let redis_url = env_or("DHCP2P_REDIS_URL", overlay.redis_url, "redis://localhost:6379".to_owned());

        let nonce_ttl_secs = parse_env_or("DHCP2P_NONCE_TTL_SECS", "nonce_ttl_secs", overlay.nonce_ttl_secs, 300)?;

        let nonce_cleaner_interval = Duration::from_secs(parse_env_or(
            "DHCP2P_NONCE_CLEANER_INTERVAL_SECS",
            "nonce_cleaner_interval_secs",
            overlay.nonce_cleaner_interval_secs,
            60,
        )?);

        let lease_ttl_secs = parse_env_or("DHCP2P_LEASE_TTL_SECS", "lease_ttl_secs", overlay.lease_ttl_secs, 3600)?;

        let max_lease_retries = parse_env_or("DHCP2P_MAX_LEASE_RETRIES", "max_lease_retries", overlay.max_lease_retries, 5)?;

        let lease_retry_delay = Duration::from_millis(parse_env_or(
            "DHCP2P_LEASE_RETRY_DELAY_MS",
            "lease_retry_delay_ms",
            overlay.lease_retry_delay_ms,
            100,
        )?);

        let postgres_pool_size = parse_env_or("DHCP2P_POSTGRES_POOL_SIZE", "postgres_pool_size", overlay.postgres_pool_size, 10)?;

        let cache_enabled = parse_bool_env_or("DHCP2P_CACHE_ENABLED", overlay.cache_enabled, true);

        let rate_limit_enabled = parse_bool_env_or("DHCP2P_RATE_LIMIT_ENABLED", overlay.rate_limit_enabled, true);

        let rate_limit_requests_per_minute = parse_env_or(
            "DHCP2P_RATE_LIMIT_REQUESTS_PER_MINUTE",
            "rate_limit_requests_per_minute",
            overlay.rate_limit_requests_per_minute,
            120,
        )?;

        let rate_limit_burst = parse_env_or("DHCP2P_RATE_LIMIT_BURST", "rate_limit_burst", overlay.rate_limit_burst, 20)?;

        let rate_limit_trusted_proxies = std::env::var("DHCP2P_RATE_LIMIT_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect())
            .or(overlay.rate_limit_trusted_proxies)
            .unwrap_or_default();

        let max_body_bytes = parse_env_or("DHCP2P_MAX_BODY_BYTES", "max_body_bytes", overlay.max_body_bytes, 1024 * 1024)?;

        Ok(Self {
            bind_addr,
            log_level,
            database_url,
            redis_url,
            nonce_ttl_secs,
            nonce_cleaner_interval,
            lease_ttl_secs,
            max_lease_retries,
            lease_retry_delay,
            postgres_pool_size,
            cache_enabled,
            rate_limit_enabled,
            rate_limit_requests_per_minute,
            rate_limit_burst,
            rate_limit_trusted_proxies,
            max_body_bytes,
        })
    }
}

fn load_overlay() -> Result<FileOverlay, ConfigError> {
    let Some(path) = std::env::var("DHCP2P_CONFIG_FILE").ok() else {
        return Ok(FileOverlay::default());
    };
    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead { path: path.clone(), reason: e.to_string() })?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::FileParse { path, reason: e.to_string() })
}

/// Priority: `DHCP2P_BIND_ADDR` > `PORT` (platform convention) > file
/// overlay > `127.0.0.1:8080`.
fn resolve_bind_addr(overlay: Option<&str>) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = std::env::var("DHCP2P_BIND_ADDR") {
        return addr.parse().map_err(|_| ConfigError::Invalid { field: "bind_addr", reason: format!("'{addr}' is not a valid socket address") });
    }
    if let Ok(port_str) = std::env::var("PORT") {
        let port: u16 = port_str.parse().map_err(|_| ConfigError::Invalid { field: "bind_addr", reason: format!("'{port_str}' is not a valid port") })?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Some(addr) = overlay {
        return addr.parse().map_err(|_| ConfigError::Invalid { field: "bind_addr", reason: format!("'{addr}' is not a valid socket address") });
    }
    Ok(SocketAddr::from(([127, 0, 0, 1], 8080)))
}

fn env_or(key: &str, overlay: Option<String>, default: String) -> String {
    std::env::var(key).ok().or(overlay).unwrap_or(default)
}

fn parse_bool_env_or(key: &str, overlay: Option<bool>, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v != "false" && v != "0")
        .or(overlay)
        .unwrap_or(default)
}

fn parse_env_or<T>(key: &'static str, field: &'static str, overlay: Option<T>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    if let Ok(raw) = std::env::var(key) {
        return raw.parse().map_err(|_| ConfigError::Invalid { field, reason: format!("'{raw}' could not be parsed") });
    }
    Ok(overlay.unwrap_or(default))
}
