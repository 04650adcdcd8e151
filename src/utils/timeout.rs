//! Timing validation for tab sessions and agent calls

use std::time::Duration;

use super::SearchError;
use super::constants::{
    DEFAULT_AGENT_TIMEOUT_MS, DEFAULT_INSTALL_SETTLE_MS, DEFAULT_LOAD_CEILING_MS,
    DEFAULT_QUIET_PERIOD_MS,
};
use crate::TimingConfig;

/// Maximum load ceiling (5 minutes)
/// Covers slow-loading sites, heavy SPAs, and network delays
pub const MAX_LOAD_CEILING_MS: u64 = 300_000;

/// Maximum for quiet period, install settle and agent timeout (30 seconds)
pub const MAX_SETTLE_MS: u64 = 30_000;

/// Validate the load ceiling of a tab session
///
/// # Returns
/// * `Ok(Duration)` - Validated Duration object
/// * `Err(SearchError::Config)` - If the value exceeds [`MAX_LOAD_CEILING_MS`]
pub fn validate_load_ceiling(timeout_ms: Option<u64>, default_ms: u64) -> Result<Duration, SearchError> {
    let ms = timeout_ms.unwrap_or(default_ms);

    if ms > MAX_LOAD_CEILING_MS {
        return Err(SearchError::Config(format!(
            "Load ceiling cannot exceed {}ms ({} minutes). Received: {}ms ({:.1} minutes)",
            MAX_LOAD_CEILING_MS,
            MAX_LOAD_CEILING_MS / 60_000,
            ms,
            ms as f64 / 60_000.0
        )));
    }

    Ok(Duration::from_millis(ms))
}

/// Validate a settle-style wait (`name` appears in the error message)
pub fn validate_settle_timeout(
    name: &str,
    timeout_ms: Option<u64>,
    default_ms: u64,
) -> Result<Duration, SearchError> {
    let ms = timeout_ms.unwrap_or(default_ms);

    if ms > MAX_SETTLE_MS {
        return Err(SearchError::Config(format!(
            "{} cannot exceed {}ms ({} seconds). Received: {}ms ({} seconds)",
            name,
            MAX_SETTLE_MS,
            MAX_SETTLE_MS / 1000,
            ms,
            ms / 1000
        )));
    }

    Ok(Duration::from_millis(ms))
}

/// Validated waits used by sessions, probe and orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Longest wait for a load-complete signal
    pub load_ceiling: Duration,
    /// Pause after load before the page counts as settled
    pub quiet_period: Duration,
    /// Pause after injecting the agent
    pub install_settle: Duration,
    /// Bound on one agent request
    pub agent_timeout: Duration,
}

impl Timings {
    pub fn from_config(config: &TimingConfig) -> Result<Self, SearchError> {
        Ok(Self {
            load_ceiling: validate_load_ceiling(Some(config.load_ceiling_ms), DEFAULT_LOAD_CEILING_MS)?,
            quiet_period: validate_settle_timeout(
                "Quiet period",
                Some(config.quiet_period_ms),
                DEFAULT_QUIET_PERIOD_MS,
            )?,
            install_settle: validate_settle_timeout(
                "Install settle",
                Some(config.install_settle_ms),
                DEFAULT_INSTALL_SETTLE_MS,
            )?,
            agent_timeout: validate_settle_timeout(
                "Agent timeout",
                Some(config.agent_timeout_ms),
                DEFAULT_AGENT_TIMEOUT_MS,
            )?,
        })
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            load_ceiling: Duration::from_millis(DEFAULT_LOAD_CEILING_MS),
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            install_settle: Duration::from_millis(DEFAULT_INSTALL_SETTLE_MS),
            agent_timeout: Duration::from_millis(DEFAULT_AGENT_TIMEOUT_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let timings = Timings::from_config(&TimingConfig::default()).unwrap();
        assert_eq!(timings, Timings::default());
        assert_eq!(timings.load_ceiling, Duration::from_secs(15));
    }

    #[test]
    fn oversized_load_ceiling_is_rejected() {
        let err = validate_load_ceiling(Some(MAX_LOAD_CEILING_MS + 1), 0).unwrap_err();
        assert!(matches!(err, SearchError::Config(msg) if msg.contains("Load ceiling")));
    }

    #[test]
    fn oversized_agent_timeout_is_rejected() {
        let config = TimingConfig {
            agent_timeout_ms: 60_000,
            ..TimingConfig::default()
        };
        let err = Timings::from_config(&config).unwrap_err();
        assert!(matches!(err, SearchError::Config(msg) if msg.starts_with("Agent timeout")));
    }

    #[test]
    fn missing_value_uses_default() {
        assert_eq!(
            validate_settle_timeout("Quiet period", None, 2_000).unwrap(),
            Duration::from_secs(2)
        );
    }
}
