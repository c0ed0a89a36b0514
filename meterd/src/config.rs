use std::time::Duration;

use domain::MeterError;

/// Engine-level configuration.
///
/// Both durations must be strictly positive; `from_env` falls back to
/// documented defaults but still validates whatever it ends up with, so
/// a misconfigured override (`CHAIN_READ_TIMEOUT_MS=0`) fails fast at
/// startup rather than silently degrading the refresh loop.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Deadline for a single chain-state refresh attempt.
    pub chain_read_timeout: Duration,
    /// Interval between background chain-state refreshes.
    pub update_interval: Duration,
}

impl EngineConfig {
    pub fn new(chain_read_timeout: Duration, update_interval: Duration) -> Result<Self, MeterError> {
        if chain_read_timeout.is_zero() {
            return Err(MeterError::InvalidConfig("chain_read_timeout must be strictly positive".into()));
        }
        if update_interval.is_zero() {
            return Err(MeterError::InvalidConfig("update_interval must be strictly positive".into()));
        }
        Ok(Self { chain_read_timeout, update_interval })
    }

    pub fn from_env() -> Result<Self, MeterError> {
        let chain_read_timeout_ms = std::env::var("CHAIN_READ_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(2_000);

        let update_interval_ms = std::env::var("UPDATE_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10_000);

        Self::new(
            Duration::from_millis(chain_read_timeout_ms),
            Duration::from_millis(update_interval_ms),
        )
    }
}
