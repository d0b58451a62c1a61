//! Configuration types and loading.
//!
//! Two layers:
//! - [`BrokerConfig`]: the runtime tuning the broker consumes, with the
//!   production constants as defaults and a builder for tests.
//! - [`LibreConfig`]: the TOML file a deployment ships (service base URLs,
//!   the DeArrow license key, optional broker overrides, the upstream
//!   version source and the state file path).
//!
//! Service URLs and the license key are intentionally not validated: a bad
//! URL fails at the transport and degrades to an absent result like any
//! other transport failure.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Outbound requests allowed per rate window.
pub const RATE_LIMIT: u32 = 25;
/// Length of one rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
/// How long a cached response stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Maximum number of cached responses.
pub const MAX_CACHE: usize = 80;
/// Minimum interval between dispatches for the same key.
pub const PER_VIDEO_COOLDOWN: Duration = Duration::from_secs(4);
/// How often expired cache entries are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Well-known name of the cross-instance token channel.
pub const CHANNEL_NAME: &str = "libre_ultra";
/// Buffered notices per subscriber before older ones are dropped.
pub const CHANNEL_CAPACITY: usize = 256;
/// State store key holding the last-seen upstream version.
pub const VERSION_KEY: &str = "libre_ultra_version";
/// DeArrow thumbnail renderer endpoint.
pub const DEFAULT_THUMBNAIL_API: &str = "https://dearrow-thumb.ajay.app/api/v1/getThumbnail";

// ============================================================================
// BROKER CONFIG
// ============================================================================

/// Runtime tuning for the request broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Outbound requests allowed per window.
    pub rate_limit: u32,
    /// Length of one rate window.
    pub rate_window: Duration,
    /// Freshness lifetime of cached values.
    pub ttl: Duration,
    /// Maximum number of cached values.
    pub max_cache: usize,
    /// Per-key cooldown between dispatches.
    pub cooldown: Duration,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
    /// Transport timeout. `None` leaves it to the HTTP client defaults.
    pub request_timeout: Option<Duration>,
    /// Name of the cross-instance token channel.
    pub channel_name: String,
    /// Subscriber buffer of the token channel.
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            rate_limit: RATE_LIMIT,
            rate_window: RATE_WINDOW,
            ttl: CACHE_TTL,
            max_cache: MAX_CACHE,
            cooldown: PER_VIDEO_COOLDOWN,
            sweep_interval: SWEEP_INTERVAL,
            request_timeout: None,
            channel_name: CHANNEL_NAME.to_string(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl BrokerConfig {
    /// Create a broker config with the production defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of requests per window.
    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the rate window length.
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    /// Set the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the cache capacity.
    pub fn with_max_cache(mut self, max: usize) -> Self {
        self.max_cache = max;
        self
    }

    /// Set the per-key cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set a transport timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the token channel name.
    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    /// Validate tuning values.
    ///
    /// Zero capacities or windows would turn the broker into a permanent
    /// cache miss or a permanent denial, so they are rejected here. A zero
    /// cooldown is allowed and disables the guard.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit == 0 {
            return Err(invalid("broker.rate_limit", "must be > 0"));
        }
        if self.rate_window.is_zero() {
            return Err(invalid("broker.rate_window_ms", "must be > 0"));
        }
        if self.ttl.is_zero() {
            return Err(invalid("broker.ttl_ms", "must be > 0"));
        }
        if self.max_cache == 0 {
            return Err(invalid("broker.max_cache", "must be > 0"));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid("broker.sweep_interval_ms", "must be > 0"));
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(invalid("broker.request_timeout_ms", "must be > 0 when set"));
        }
        if self.channel_name.trim().is_empty() {
            return Err(invalid("broker.channel_name", "must not be empty"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("broker.channel_capacity", "must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// FILE CONFIG
// ============================================================================

/// Top-level config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibreConfig {
    pub sponsor_block: SponsorBlockConfig,
    pub dearrow: DeArrowConfig,
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

/// SponsorBlock endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SponsorBlockConfig {
    /// Base URL, trailing slash included (e.g. `https://sponsor.ajay.app/`).
    pub api: String,
}

/// DeArrow endpoint and license.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeArrowConfig {
    /// Base URL, trailing slash included.
    pub api: String,
    /// License key sent in the query string.
    pub key: String,
    #[serde(default = "default_thumbnail_api")]
    pub thumbnail_api: String,
}

/// Broker overrides as they appear in the file. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSettings {
    pub rate_limit: u32,
    pub rate_window_ms: u64,
    pub ttl_ms: u64,
    pub max_cache: usize,
    pub cooldown_ms: u64,
    pub sweep_interval_ms: u64,
    pub request_timeout_ms: Option<u64>,
    pub channel_name: String,
    pub channel_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            rate_limit: RATE_LIMIT,
            rate_window_ms: millis(RATE_WINDOW),
            ttl_ms: millis(CACHE_TTL),
            max_cache: MAX_CACHE,
            cooldown_ms: millis(PER_VIDEO_COOLDOWN),
            sweep_interval_ms: millis(SWEEP_INTERVAL),
            request_timeout_ms: None,
            channel_name: CHANNEL_NAME.to_string(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl BrokerSettings {
    /// Convert file settings into the runtime config.
    pub fn to_broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            rate_limit: self.rate_limit,
            rate_window: Duration::from_millis(self.rate_window_ms),
            ttl: Duration::from_millis(self.ttl_ms),
            max_cache: self.max_cache,
            cooldown: Duration::from_millis(self.cooldown_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            channel_name: self.channel_name.clone(),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Upstream repository whose latest commit acts as the content version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_version_key")]
    pub version_key: String,
}

impl LibreConfig {
    /// Load config from `--config <path>` or `LIBRE_CONFIG`, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file without validating it.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse config from TOML text without validating it.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Validate broker tuning and the upstream section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker_config().validate()?;
        if let Some(upstream) = &self.upstream {
            if upstream.owner.trim().is_empty() {
                return Err(invalid("upstream.owner", "must not be empty"));
            }
            if upstream.repo.trim().is_empty() {
                return Err(invalid("upstream.repo", "must not be empty"));
            }
            if upstream.version_key.trim().is_empty() {
                return Err(invalid("upstream.version_key", "must not be empty"));
            }
        }
        if self.state_path.as_os_str().is_empty() {
            return Err(invalid("state_path", "must not be empty"));
        }
        Ok(())
    }

    /// Runtime broker config derived from the `[broker]` section.
    pub fn broker_config(&self) -> BrokerConfig {
        self.broker.to_broker_config()
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_state_path() -> PathBuf {
    PathBuf::from("libre-ultra-state.json")
}

fn default_thumbnail_api() -> String {
    DEFAULT_THUMBNAIL_API.to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_version_key() -> String {
    VERSION_KEY.to_string()
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("LIBRE_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
