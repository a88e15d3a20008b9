use crate::config::ReconnectConfig;
use crate::error::ConnectionError;
use std::time::Duration;
use tracing::{error, info, warn};

/// Recovery action to take after a connection error
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Retry after a delay
    RetryAfterDelay(Duration),
    /// Stop the supervisor and surface the error to the process owner
    Shutdown,
}

/// Reconnect backoff configuration
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl From<&ReconnectConfig> for RecoveryConfig {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Tracks failed reconnect attempts and decides what to do next.
///
/// There is no retry limit: a bot that stops polling cannot receive
/// submissions, so the attempt count is exposed for monitoring instead.
#[derive(Debug)]
pub struct RecoveryManager {
    config: RecoveryConfig,
    failed_attempts: u32,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self::with_config(RecoveryConfig::default())
    }

    pub fn with_config(config: RecoveryConfig) -> Self {
        Self {
            config,
            failed_attempts: 0,
        }
    }

    /// Decide how to proceed after the session dropped or a reconnect failed
    pub fn handle_error(&mut self, error: &ConnectionError) -> RecoveryAction {
        if !error.is_recoverable() {
            error!("Non-recoverable bot connection error: {}", error);
            return RecoveryAction::Shutdown;
        }

        let delay = self.calculate_delay(self.failed_attempts);

        info!(
            "Scheduling bot reconnect (attempt {}) in {:?}: {}",
            self.failed_attempts + 1,
            delay,
            error
        );

        RecoveryAction::RetryAfterDelay(delay)
    }

    /// Record a reconnect attempt that did not establish a session
    pub fn record_failure(&mut self) -> u32 {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        if self.failed_attempts % 10 == 0 {
            warn!(
                "Bot has failed to reconnect {} times in a row",
                self.failed_attempts
            );
        }
        self.failed_attempts
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        if self.failed_attempts > 0 {
            info!(
                "Bot connection recovered after {} failed attempts",
                self.failed_attempts
            );
        }
        self.failed_attempts = 0;
    }

    /// Delay before the next attempt: base * 2^n, capped at max_delay
    pub fn calculate_delay(&self, failed_attempts: u32) -> Duration {
        let factor = 2_u32.checked_pow(failed_attempts).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .checked_mul(factor)
            .map(|delay| delay.min(self.config.max_delay))
            .unwrap_or(self.config.max_delay)
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}
