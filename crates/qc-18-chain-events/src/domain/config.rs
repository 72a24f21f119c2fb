//! Chain events configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use qc_18_chain_events::EventsConfig;
//!
//! let config = EventsConfig::default()
//!     .with_max_filters(500)
//!     .with_filter_ttl(Duration::from_secs(3600));
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

/// Configuration of the filter and subscription engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Master switch for the Ethereum-compatible API surface
    pub enable_eth_rpc: bool,
    /// Disables filters and subscriptions entirely
    pub disable_real_time_filter_api: bool,
    /// Disables historical queries served from the event index
    pub disable_historic_filter_api: bool,
    /// Location of an on-disk event index. Read by whoever builds a
    /// persistent `EventIndex`; the in-memory index ignores it.
    pub database_path: Option<PathBuf>,
    /// Largest height span a single filter may cover
    pub max_filter_height_range: i64,
    /// Maximum number of filters in the store
    pub max_filters: usize,
    /// Maximum buffered results per filter
    pub max_filter_results: usize,
    /// Filters not polled within this window are garbage collected
    pub filter_ttl_secs: u64,
    /// Interval between garbage collection sweeps
    pub gc_interval_secs: u64,
    /// How long a historical query waits for the index to catch up
    pub event_read_timeout_secs: u64,
    /// Capacity of each subscription's ingest channel
    pub subscription_buffer: usize,
    /// Outbound payloads a subscription may queue before it is killed
    pub max_send_queue: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enable_eth_rpc: true,
            disable_real_time_filter_api: false,
            disable_historic_filter_api: false,
            database_path: None,
            max_filter_height_range: 2880,
            max_filters: 100,
            max_filter_results: 10_000,
            filter_ttl_secs: 24 * 60 * 60,
            gc_interval_secs: 30 * 60,
            event_read_timeout_secs: 90,
            subscription_buffer: 200,
            max_send_queue: 20_000,
        }
    }
}

impl EventsConfig {
    /// Validate limits and intervals
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_filter_height_range < 0 {
            return Err(ConfigError::InvalidLimit(
                "max_filter_height_range cannot be negative".into(),
            ));
        }

        if self.max_filters == 0 {
            return Err(ConfigError::InvalidLimit("max_filters cannot be 0".into()));
        }

        if self.subscription_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "subscription_buffer cannot be 0".into(),
            ));
        }

        if self.max_send_queue == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_send_queue cannot be 0".into(),
            ));
        }

        if self.gc_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval(
                "gc_interval_secs cannot be 0".into(),
            ));
        }

        if self.event_read_timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval(
                "event_read_timeout_secs cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// True when filters and subscriptions are served at all
    pub fn is_enabled(&self) -> bool {
        self.enable_eth_rpc && !self.disable_real_time_filter_api
    }

    pub fn filter_ttl(&self) -> Duration {
        Duration::from_secs(self.filter_ttl_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn event_read_timeout(&self) -> Duration {
        Duration::from_secs(self.event_read_timeout_secs)
    }

    pub fn with_max_filters(mut self, max: usize) -> Self {
        self.max_filters = max;
        self
    }

    pub fn with_max_filter_results(mut self, max: usize) -> Self {
        self.max_filter_results = max;
        self
    }

    pub fn with_max_filter_height_range(mut self, range: i64) -> Self {
        self.max_filter_height_range = range;
        self
    }

    pub fn with_filter_ttl(mut self, ttl: Duration) -> Self {
        self.filter_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval_secs = interval.as_secs();
        self
    }

    pub fn with_event_read_timeout(mut self, timeout: Duration) -> Self {
        self.event_read_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_max_send_queue(mut self, max: usize) -> Self {
        self.max_send_queue = max;
        self
    }

    pub fn with_historic_filter_api(mut self, enabled: bool) -> Self {
        self.disable_historic_filter_api = !enabled;
        self
    }
}
