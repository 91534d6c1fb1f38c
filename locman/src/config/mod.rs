//! Runtime configuration for the location manager.
//!
//! [`ManagerConfig`] holds every tunable the registry consults. It can be
//! built in code (`ManagerConfig::default()` plus `with_*` adjustments) or
//! read from `~/.locman/config.ini` through [`ConfigFile`].

mod file;

pub use file::{
    config_directory, config_file_path, ConfigFile, ConfigFileError, DEFAULT_LOG_FILE,
};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ==================== Defaults ====================

/// Default distance under which two fixes share one cache entry, in metres.
pub const DEFAULT_CACHE_PRECISION_METERS: f64 = 200.0;

/// Default minimum time between two geocoding calls.
pub const DEFAULT_MIN_RESOLUTION_INTERVAL: Duration = Duration::from_secs(10);

/// Default time-to-live for listeners created by one-shot convenience calls.
pub const DEFAULT_LISTENER_TTL: Duration = Duration::from_secs(10);

/// Default distance a fix must move before address following resolves again.
pub const DEFAULT_FOLLOW_DISTANCE_METERS: f64 = 200.0;

/// What to do with a request that arrives while idle but inside the throttle
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottlePolicy {
    /// Queue the request and dispatch it once the window has elapsed.
    #[default]
    Queue,
    /// Answer immediately with no address and no error.
    FastFail,
}

impl ThrottlePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottlePolicy::Queue => "queue",
            ThrottlePolicy::FastFail => "fast_fail",
        }
    }
}

impl fmt::Display for ThrottlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ThrottlePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "queue" => Ok(ThrottlePolicy::Queue),
            "fast_fail" | "fastfail" => Ok(ThrottlePolicy::FastFail),
            other => Err(format!("must be one of: queue, fast_fail (got '{}')", other)),
        }
    }
}

/// Configuration consulted by the registry and the facade.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Distance under which two fixes hit the same cache entry, in metres.
    pub cache_precision_meters: f64,

    /// Minimum elapsed time between the starts of two geocoding calls.
    pub min_resolution_interval: Duration,

    /// Handling of requests that arrive inside the throttle window.
    pub throttle_policy: ThrottlePolicy,

    /// Time-to-live applied to listeners created by `locate_once`.
    pub listener_ttl: Duration,

    /// Reverse-geocode new fixes automatically and broadcast the result.
    pub follow_address: bool,

    /// Minimum movement between two followed fixes, in metres.
    pub follow_distance_meters: f64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_precision_meters: DEFAULT_CACHE_PRECISION_METERS,
            min_resolution_interval: DEFAULT_MIN_RESOLUTION_INTERVAL,
            throttle_policy: ThrottlePolicy::default(),
            listener_ttl: DEFAULT_LISTENER_TTL,
            follow_address: false,
            follow_distance_meters: DEFAULT_FOLLOW_DISTANCE_METERS,
        }
    }
}

impl ManagerConfig {
    /// Set the cache distance threshold.
    pub fn with_cache_precision(mut self, meters: f64) -> Self {
        self.cache_precision_meters = meters;
        self
    }

    /// Set the minimum interval between geocoding calls.
    pub fn with_min_resolution_interval(mut self, interval: Duration) -> Self {
        self.min_resolution_interval = interval;
        self
    }

    /// Set the throttle policy.
    pub fn with_throttle_policy(mut self, policy: ThrottlePolicy) -> Self {
        self.throttle_policy = policy;
        self
    }

    /// Set the TTL used by one-shot convenience calls.
    pub fn with_listener_ttl(mut self, ttl: Duration) -> Self {
        self.listener_ttl = ttl;
        self
    }

    /// Enable address following with the given movement threshold.
    pub fn following_address(mut self, distance_meters: f64) -> Self {
        self.follow_address = true;
        self.follow_distance_meters = distance_meters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();

        assert_eq!(config.cache_precision_meters, 200.0);
        assert_eq!(config.min_resolution_interval, Duration::from_secs(10));
        assert_eq!(config.throttle_policy, ThrottlePolicy::Queue);
        assert!(!config.follow_address);
    }

    #[test]
    fn test_builder_methods() {
        let config = ManagerConfig::default()
            .with_cache_precision(10.0)
            .with_min_resolution_interval(Duration::ZERO)
            .with_throttle_policy(ThrottlePolicy::FastFail)
            .following_address(50.0);

        assert_eq!(config.cache_precision_meters, 10.0);
        assert_eq!(config.min_resolution_interval, Duration::ZERO);
        assert_eq!(config.throttle_policy, ThrottlePolicy::FastFail);
        assert!(config.follow_address);
        assert_eq!(config.follow_distance_meters, 50.0);
    }

    #[test]
    fn test_throttle_policy_parse() {
        assert_eq!("queue".parse::<ThrottlePolicy>(), Ok(ThrottlePolicy::Queue));
        assert_eq!(
            "Fast-Fail".parse::<ThrottlePolicy>(),
            Ok(ThrottlePolicy::FastFail)
        );
        assert!("drop".parse::<ThrottlePolicy>().is_err());
    }
}
