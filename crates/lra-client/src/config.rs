//! Participant client configuration.

use std::time::Duration;

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Configuration for calls made to participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantClientConfig {
    /// Per-call timeout in milliseconds. A call that times out is a
    /// retryable failure and consumes one retry slot.
    pub timeout_ms: u64,
}

impl ParticipantClientConfig {
    /// Configuration with the given per-call timeout.
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    /// The per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ParticipantClientConfig {
    fn default() -> Self {
        Self::with_timeout_ms(DEFAULT_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_half_a_second() {
        let cfg = ParticipantClientConfig::default();
        assert_eq!(cfg.timeout(), Duration::from_millis(500));
    }
}
