//! Layered configuration for the NOTIFY dispatcher: defaults, overridden by
//! an optional TOML file, overridden by `NOTIFY_*` environment variables.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::NotifyError;

/// Tunables from the concurrency/resource model plus operational settings.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Maximum number of zones dispatched concurrently (`MAX_NOTIFY_NUM`).
    pub max_notify_num: usize,

    /// Maximum retry count per target before giving up (`MAX_TRY`).
    pub max_try: u32,

    /// Deadline for the first send to a target; doubles on every retry.
    pub initial_timeout: Duration,

    /// Local UDP source port range to bind sender sockets from. `None` means
    /// let the OS pick an ephemeral port.
    pub source_port_range: Option<(u16, u16)>,

    /// Ceiling on how long the dispatcher will wait for any single NOTIFY
    /// response before treating the target as having timed out anyway.
    pub response_read_timeout: Duration,

    /// HTTP bind address for `/metrics` and `/healthz`. `None` disables it.
    pub http_bind_addr: Option<SocketAddr>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_notify_num: 16,
            max_try: 5,
            initial_timeout: Duration::from_secs(2),
            source_port_range: None,
            response_read_timeout: Duration::from_secs(10),
            http_bind_addr: Some(
                "127.0.0.1:8080"
                    .parse()
                    .expect("default HTTP bind address is valid"),
            ),
        }
    }
}

/// Mirrors `NotifyConfig` field-for-field for TOML deserialization; every
/// field is optional so a partial file only overrides what it mentions.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    max_notify_num: Option<usize>,
    max_try: Option<u32>,
    initial_timeout_secs: Option<u64>,
    source_port_min: Option<u16>,
    source_port_max: Option<u16>,
    response_read_timeout_secs: Option<u64>,
    http_bind_addr: Option<String>,
}

impl NotifyConfig {
    /// Loads defaults, applies an optional TOML file at `path` (if it
    /// exists), then applies `NOTIFY_*` environment variable overrides.
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self, NotifyError> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let contents = std::fs::read_to_string(path).map_err(NotifyError::Io)?;
                let file: FileConfig = toml::from_str(&contents)
                    .map_err(|e| NotifyError::Config(format!("invalid TOML config: {e}")))?;
                config.apply_file(file);
            }
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, NotifyError> {
        Self::from_env_and_file(None)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.max_notify_num {
            self.max_notify_num = v;
        }
        if let Some(v) = file.max_try {
            self.max_try = v;
        }
        if let Some(v) = file.initial_timeout_secs {
            self.initial_timeout = Duration::from_secs(v);
        }
        if file.source_port_min.is_some() || file.source_port_max.is_some() {
            self.source_port_range = file.source_port_min.zip(file.source_port_max);
        }
        if let Some(v) = file.response_read_timeout_secs {
            self.response_read_timeout = Duration::from_secs(v);
        }
        if let Some(addr) = file.http_bind_addr {
            self.http_bind_addr = parse_http_bind_addr(&addr);
        }
    }

    fn apply_env(&mut self) -> Result<(), NotifyError> {
        if let Ok(v) = std::env::var("NOTIFY_MAX_NOTIFY_NUM") {
            self.max_notify_num = v
                .parse()
                .map_err(|_| NotifyError::Config(format!("invalid NOTIFY_MAX_NOTIFY_NUM: {v}")))?;
        }

        if let Ok(v) = std::env::var("NOTIFY_MAX_TRY") {
            self.max_try = v
                .parse()
                .map_err(|_| NotifyError::Config(format!("invalid NOTIFY_MAX_TRY: {v}")))?;
        }

        if let Ok(v) = std::env::var("NOTIFY_INITIAL_TIMEOUT_SECS") {
            let secs: u64 = v.parse().map_err(|_| {
                NotifyError::Config(format!("invalid NOTIFY_INITIAL_TIMEOUT_SECS: {v}"))
            })?;
            self.initial_timeout = Duration::from_secs(secs);
        }

        if let Ok(v) = std::env::var("NOTIFY_SOURCE_PORT_RANGE") {
            let (min, max) = v
                .split_once('-')
                .ok_or_else(|| NotifyError::Config(format!("invalid NOTIFY_SOURCE_PORT_RANGE: {v}")))?;
            let min: u16 = min
                .trim()
                .parse()
                .map_err(|_| NotifyError::Config(format!("invalid NOTIFY_SOURCE_PORT_RANGE: {v}")))?;
            let max: u16 = max
                .trim()
                .parse()
                .map_err(|_| NotifyError::Config(format!("invalid NOTIFY_SOURCE_PORT_RANGE: {v}")))?;
            self.source_port_range = Some((min, max));
        }

        if let Ok(v) = std::env::var("NOTIFY_RESPONSE_READ_TIMEOUT_SECS") {
            let secs: u64 = v.parse().map_err(|_| {
                NotifyError::Config(format!("invalid NOTIFY_RESPONSE_READ_TIMEOUT_SECS: {v}"))
            })?;
            self.response_read_timeout = Duration::from_secs(secs);
        }

        if let Ok(v) = std::env::var("NOTIFY_HTTP_BIND_ADDR") {
            self.http_bind_addr = parse_http_bind_addr(&v);
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), NotifyError> {
        if self.max_notify_num == 0 {
            return Err(NotifyError::Config(
                "max_notify_num must be greater than 0".to_string(),
            ));
        }
        if self.initial_timeout.is_zero() {
            return Err(NotifyError::Config(
                "initial_timeout must be greater than 0".to_string(),
            ));
        }
        if let Some((min, max)) = self.source_port_range {
            if min > max {
                return Err(NotifyError::Config(
                    "source port range minimum exceeds maximum".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_http_bind_addr(raw: &str) -> Option<SocketAddr> {
    if raw.eq_ignore_ascii_case("disabled") || raw.is_empty() {
        return None;
    }
    raw.parse().ok()
}
