//! Engine options and configuration
//!
//! This module contains the configuration for the dispatch engine, including
//! a builder pattern and an environment loader for the driver binary.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{DispatchError, Result};

/// Default delay before reconnecting after an unexpected close
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Default cadence of the external location provider
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(10);
/// Default minimum displacement before a new position is reported
pub const DEFAULT_MIN_DISPLACEMENT_M: f64 = 5.0;
/// Default spacing of "is this report still active" asks
pub const DEFAULT_ACTIVITY_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default number of "is this report still active" asks per assignment
pub const DEFAULT_ACTIVITY_POLL_ATTEMPTS: u32 = 6;
/// Default REST request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_WS_URL: &str = "GUARD_DISPATCH_WS_URL";
const ENV_API_URL: &str = "GUARD_DISPATCH_API_URL";
const ENV_RECONNECT_SECS: &str = "GUARD_DISPATCH_RECONNECT_SECS";
const ENV_STORE: &str = "GUARD_DISPATCH_STORE";
const ENV_TOKEN_CADENCE: &str = "GUARD_DISPATCH_TOKEN_CADENCE";

// ============================================================================
// Token thresholds
// ============================================================================

/// Expiry windows used by the credential manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenThresholds {
    /// Refresh the access token when it expires within this many seconds
    pub access_secs: i64,
    /// Refresh both tokens when the refresh token expires within this many seconds
    pub refresh_secs: i64,
    /// The refresh token counts as expired within this many seconds
    pub refresh_expired_secs: i64,
}

impl Default for TokenThresholds {
    fn default() -> Self {
        Self {
            access_secs: 300,
            refresh_secs: 86_400 * 7,
            refresh_expired_secs: 0,
        }
    }
}

/// What drives the periodic credential check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCadence {
    /// Independent periodic task owned by the engine
    Timer(Duration),
    /// Counter on the location tick; fires every `token_check_interval` ticks
    PiggyBack,
}

// ============================================================================
// Engine options
// ============================================================================

/// Main options for the dispatch engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// WebSocket endpoint of the dispatch server
    pub ws_url: Url,
    /// Base URL of the REST contract (used by the `http` feature)
    pub api_url: Option<Url>,
    /// Delay before reconnecting after an unexpected close
    pub reconnect_delay: Duration,
    /// Cadence of the external location provider
    pub update_interval: Duration,
    /// Minimum displacement in metres before a position is reported
    pub min_displacement_m: f64,
    /// Token expiry windows
    pub thresholds: TokenThresholds,
    /// What drives the credential check
    pub token_cadence: TokenCadence,
    /// Spacing of activity asks
    pub activity_poll_interval: Duration,
    /// Maximum activity asks per assignment
    pub activity_poll_attempts: u32,
    /// REST request timeout
    pub request_timeout: Duration,
    /// Path of the JSON credential store, if file-backed
    pub store_path: Option<PathBuf>,
}

impl EngineOptions {
    /// Create a new builder for `EngineOptions`
    #[must_use]
    pub fn builder(ws_url: Url) -> EngineOptionsBuilder {
        EngineOptionsBuilder {
            options: Self::new(ws_url),
        }
    }

    /// Defaults for the given endpoint
    #[must_use]
    pub fn new(ws_url: Url) -> Self {
        let mut options = Self {
            ws_url,
            api_url: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            min_displacement_m: DEFAULT_MIN_DISPLACEMENT_M,
            thresholds: TokenThresholds::default(),
            token_cadence: TokenCadence::PiggyBack,
            activity_poll_interval: DEFAULT_ACTIVITY_POLL_INTERVAL,
            activity_poll_attempts: DEFAULT_ACTIVITY_POLL_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            store_path: None,
        };
        options.token_cadence = TokenCadence::Timer(options.token_check_period());
        options
    }

    /// Load options from `GUARD_DISPATCH_*` environment variables
    ///
    /// # Errors
    /// Returns error if the WebSocket URL is missing or any value is malformed
    pub fn from_env() -> Result<Self> {
        let ws_url = std::env::var(ENV_WS_URL)
            .map_err(|_| DispatchError::invalid_config(format!("{ENV_WS_URL} is not set")))?;
        let mut options = Self::new(Url::parse(&ws_url)?);

        if let Ok(api_url) = std::env::var(ENV_API_URL) {
            options.api_url = Some(Url::parse(&api_url)?);
        }

        if let Ok(secs) = std::env::var(ENV_RECONNECT_SECS) {
            let secs: u64 = secs.parse().map_err(|e| {
                DispatchError::invalid_config(format!("{ENV_RECONNECT_SECS}: {e}"))
            })?;
            options.reconnect_delay = Duration::from_secs(secs);
        }

        if let Ok(path) = std::env::var(ENV_STORE) {
            options.store_path = Some(PathBuf::from(path));
        }

        if let Ok(cadence) = std::env::var(ENV_TOKEN_CADENCE) {
            options.token_cadence = match cadence.as_str() {
                "tick" | "piggyback" => TokenCadence::PiggyBack,
                "timer" => TokenCadence::Timer(options.token_check_period()),
                other => {
                    return Err(DispatchError::invalid_config(format!(
                        "{ENV_TOKEN_CADENCE}: expected `timer` or `tick`, got `{other}`"
                    )));
                }
            };
        }

        options.validate()?;
        Ok(options)
    }

    /// Number of location ticks between credential checks
    ///
    /// `access_secs × 500 / update_interval_ms`, so 15 ticks with the defaults.
    #[must_use]
    pub fn token_check_interval(&self) -> u32 {
        let millis = self.update_interval.as_millis().max(1);
        let ticks = (self.thresholds.access_secs.max(0) as u128 * 500) / millis;
        u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
    }

    /// Wall-clock period matching `token_check_interval` ticks
    #[must_use]
    pub fn token_check_period(&self) -> Duration {
        self.update_interval * self.token_check_interval()
    }

    /// Check option invariants
    ///
    /// # Errors
    /// Returns `InvalidConfig` when a value cannot work
    pub fn validate(&self) -> Result<()> {
        match self.ws_url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(DispatchError::invalid_config(format!(
                    "WebSocket URL must use ws or wss, got `{other}`"
                )));
            }
        }
        if self.update_interval.is_zero() {
            return Err(DispatchError::invalid_config(
                "update interval must be non-zero",
            ));
        }
        if self.min_displacement_m < 0.0 {
            return Err(DispatchError::invalid_config(
                "minimum displacement cannot be negative",
            ));
        }
        if let TokenCadence::Timer(period) = self.token_cadence
            && period.is_zero()
        {
            return Err(DispatchError::invalid_config(
                "token timer period must be non-zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Builder for EngineOptions
// ============================================================================

/// Builder for `EngineOptions`
#[derive(Debug)]
pub struct EngineOptionsBuilder {
    options: EngineOptions,
}

impl EngineOptionsBuilder {
    /// Set the REST base URL
    #[must_use]
    pub fn api_url(mut self, url: Url) -> Self {
        self.options.api_url = Some(url);
        self
    }

    /// Set the reconnect delay
    #[must_use]
    pub const fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_delay = delay;
        self
    }

    /// Set the location provider cadence
    #[must_use]
    pub const fn update_interval(mut self, interval: Duration) -> Self {
        self.options.update_interval = interval;
        self
    }

    /// Set the minimum reported displacement
    #[must_use]
    pub const fn min_displacement_m(mut self, metres: f64) -> Self {
        self.options.min_displacement_m = metres;
        self
    }

    /// Set token expiry windows
    #[must_use]
    pub const fn thresholds(mut self, thresholds: TokenThresholds) -> Self {
        self.options.thresholds = thresholds;
        self
    }

    /// Set what drives the credential check
    #[must_use]
    pub const fn token_cadence(mut self, cadence: TokenCadence) -> Self {
        self.options.token_cadence = cadence;
        self
    }

    /// Set activity poll spacing and attempts
    #[must_use]
    pub const fn activity_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.options.activity_poll_interval = interval;
        self.options.activity_poll_attempts = attempts;
        self
    }

    /// Set the REST request timeout
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Use a JSON file credential store at `path`
    #[must_use]
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.store_path = Some(path.into());
        self
    }

    /// Build the options
    ///
    /// # Errors
    /// Returns `InvalidConfig` when a value cannot work
    pub fn build(self) -> Result<EngineOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
