//! Configuration for the conversion bot
//!
//! The configuration is read once at startup, from an optional JSON file
//! and environment overrides, and handed to every component by value or
//! behind an `Arc`. Nothing reads it from global state.
//!
//! ```json
//! {
//!   "jid": "fxchat@example.org",
//!   "password": "secret",
//!   "queue_capacity": 1000,
//!   "staleness_window": 1800,
//!   "heartbeat_interval": 45,
//!   "relay_bridges": ["twitter@twitter.com"]
//! }
//! ```

use crate::error::{BotError, Result};
use fxchat_core::Credentials;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default public endpoint for exchange rates
pub const DEFAULT_RATES_API_URL: &str = "https://open.er-api.com/v6";

/// Notice a relay bridge sends back after delivering a reply
pub const DEFAULT_RELAY_CONFIRMATION: &str = "Your direct message has been sent.";

/// Configuration for the conversion bot
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Identity on the chat network
    pub jid: String,

    /// Password for `jid`
    pub password: String,

    /// Largest amount accepted for a conversion
    pub amount_limit: u64,

    /// Capacity of the conversion queue
    pub queue_capacity: usize,

    /// Maximum age of a rate snapshot before it is refetched
    #[serde(with = "duration_secs")]
    pub staleness_window: Duration,

    /// Interval between presence re-announcements
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Delay before a failed session lifecycle is retried
    #[serde(with = "duration_secs")]
    pub reconnect_delay: Duration,

    /// Identities that relay messages on behalf of other users
    pub relay_bridges: Vec<String>,

    /// Bridge delivery notice that must not be answered; empty disables
    /// the filter
    pub relay_confirmation: String,

    /// Base URL of the exchange-rate API
    pub rates_api_url: String,

    /// HTTP timeout for rate fetches
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Maximum rate fetches per minute
    pub rate_limit_per_minute: u32,

    /// Supported currency codes; the rate source's list when unset
    pub currencies: Option<Vec<String>>,

    /// Link included in the `who` reply
    pub about_url: Option<String>,

    /// Verbose logging
    pub debug: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            jid: String::new(),
            password: String::new(),
            amount_limit: 1_000_000_000_000,
            queue_capacity: 1000,
            staleness_window: Duration::from_secs(30 * 60),
            heartbeat_interval: Duration::from_secs(45),
            reconnect_delay: Duration::from_secs(10),
            relay_bridges: Vec::new(),
            relay_confirmation: DEFAULT_RELAY_CONFIRMATION.to_string(),
            rates_api_url: DEFAULT_RATES_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            rate_limit_per_minute: 30,
            currencies: None,
            about_url: None,
            debug: false,
        }
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("jid", &self.jid)
            .field("password", &"<redacted>")
            .field("amount_limit", &self.amount_limit)
            .field("queue_capacity", &self.queue_capacity)
            .field("staleness_window", &self.staleness_window)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("relay_bridges", &self.relay_bridges)
            .field("rates_api_url", &self.rates_api_url)
            .field("request_timeout", &self.request_timeout)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl BotConfig {
    /// Create a new configuration builder
    pub fn builder() -> BotConfigBuilder {
        BotConfigBuilder::default()
    }

    /// Load configuration from a JSON file
    ///
    /// Keys missing from the file keep their defaults. The result is not
    /// validated; call [`BotConfig::validate`] after applying overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| BotError::ConfigError(format!("Failed to read config file: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| BotError::ConfigError(format!("Failed to parse config file: {e}")))
    }

    /// Apply `FXCHAT_JID`, `FXCHAT_PASSWORD` and `FXCHAT_RATES_API_URL`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(jid) = std::env::var("FXCHAT_JID") {
            self.jid = jid;
        }
        if let Ok(password) = std::env::var("FXCHAT_PASSWORD") {
            self.password = password;
        }
        if let Ok(url) = std::env::var("FXCHAT_RATES_API_URL") {
            self.rates_api_url = url;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.jid.trim().is_empty() {
            return Err(BotError::ConfigError("jid must be set".to_string()));
        }

        if self.amount_limit == 0 {
            return Err(BotError::ConfigError(
                "amount_limit must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(BotError::ConfigError(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(BotError::ConfigError(
                "heartbeat_interval must be greater than 0".to_string(),
            ));
        }

        if self.staleness_window.is_zero() {
            return Err(BotError::ConfigError(
                "staleness_window must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(BotError::ConfigError(
                "rate_limit_per_minute must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Login credentials for the configured identity
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.jid, &self.password)
    }

    /// Whether `from` is one of the configured relay bridges
    ///
    /// Resource parts (`bridge@host/resource`) are ignored.
    pub fn is_relay_bridge(&self, from: &str) -> bool {
        let bare = from.split('/').next().unwrap_or(from);
        self.relay_bridges.iter().any(|bridge| bridge == bare)
    }
}

/// Builder for BotConfig
#[derive(Debug, Default)]
pub struct BotConfigBuilder {
    jid: Option<String>,
    password: Option<String>,
    amount_limit: Option<u64>,
    queue_capacity: Option<usize>,
    staleness_window: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    reconnect_delay: Option<Duration>,
    relay_bridges: Vec<String>,
    rates_api_url: Option<String>,
    request_timeout: Option<Duration>,
    rate_limit_per_minute: Option<u32>,
    currencies: Option<Vec<String>>,
    about_url: Option<String>,
    debug: bool,
}

impl BotConfigBuilder {
    /// Set the identity and password
    pub fn credentials(mut self, jid: impl Into<String>, password: impl Into<String>) -> Self {
        self.jid = Some(jid.into());
        self.password = Some(password.into());
        self
    }

    /// Set the amount ceiling
    pub fn amount_limit(mut self, limit: u64) -> Self {
        self.amount_limit = Some(limit);
        self
    }

    /// Set the conversion queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set the rate staleness window
    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = Some(window);
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Set the delay before a failed lifecycle is retried
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Add a relay bridge identity
    pub fn relay_bridge(mut self, jid: impl Into<String>) -> Self {
        self.relay_bridges.push(jid.into());
        self
    }

    /// Set the exchange-rate API base URL
    pub fn rates_api_url(mut self, url: impl Into<String>) -> Self {
        self.rates_api_url = Some(url.into());
        self
    }

    /// Set the HTTP timeout for rate fetches
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the outbound fetch throttle
    pub fn rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit_per_minute = Some(limit);
        self
    }

    /// Restrict the supported currency codes
    pub fn currencies<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.currencies = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Set the link shown by `who`
    pub fn about_url(mut self, url: impl Into<String>) -> Self {
        self.about_url = Some(url.into());
        self
    }

    /// Enable verbose logging
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<BotConfig> {
        let defaults = BotConfig::default();

        let config = BotConfig {
            jid: self.jid.unwrap_or(defaults.jid),
            password: self.password.unwrap_or(defaults.password),
            amount_limit: self.amount_limit.unwrap_or(defaults.amount_limit),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            staleness_window: self.staleness_window.unwrap_or(defaults.staleness_window),
            heartbeat_interval: self.heartbeat_interval.unwrap_or(defaults.heartbeat_interval),
            reconnect_delay: self.reconnect_delay.unwrap_or(defaults.reconnect_delay),
            relay_bridges: self.relay_bridges,
            relay_confirmation: defaults.relay_confirmation,
            rates_api_url: self.rates_api_url.unwrap_or(defaults.rates_api_url),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            rate_limit_per_minute: self
                .rate_limit_per_minute
                .unwrap_or(defaults.rate_limit_per_minute),
            currencies: self.currencies,
            about_url: self.about_url,
            debug: self.debug,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Durations stored as whole seconds in config files
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
