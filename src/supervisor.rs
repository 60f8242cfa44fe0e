//! Reconnect pacing for the device actor.
//!
//! Attempts are counted in poll cycles rather than wall-clock time: after
//! every failed attempt the device skips one more cycle before trying again,
//! up to a ceiling.

use crate::protocol::{
    error::Result,
    session::{Connection, SessionConfig},
};
use std::sync::Arc;

/// Upper bound of cycles skipped between two attempts.
pub const MAX_RECONNECT_CEILING: u32 = 15;

/// Linear, cycle-counted reconnect backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    /// Cycles seen since the last attempt
    attempt: u32,
    /// Cycles to wait before the next attempt
    ceiling: u32,
    max_ceiling: u32,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(max_ceiling: u32) -> Self {
        Self {
            attempt: 0,
            ceiling: 0,
            max_ceiling: max_ceiling.min(MAX_RECONNECT_CEILING),
            failures: 0,
        }
    }

    /// Count one cycle; true when this cycle may try to reconnect.
    pub fn should_attempt(&mut self) -> bool {
        if self.attempt >= self.ceiling {
            self.attempt = 0;
            return true;
        }
        self.attempt += 1;
        false
    }

    /// Record a failed attempt and widen the gap to the next one.
    pub fn on_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.ceiling = (self.ceiling + 1).min(self.max_ceiling);
        self.attempt = 0;
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.ceiling = 0;
        self.failures = 0;
    }

    #[inline]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Consecutive failed attempts since the last success.
    #[inline]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(MAX_RECONNECT_CEILING)
    }
}

/// One connect attempt. Callers ask [`ReconnectBackoff::should_attempt`]
/// first; a failure widens the gap to the next attempt.
pub async fn reconnect(
    backoff: &mut ReconnectBackoff,
    config: &Arc<SessionConfig>,
) -> Result<Connection> {
    match Connection::open(Arc::clone(config)).await {
        Ok(conn) => {
            if backoff.failures() > 0 {
                tracing::info!(failures = backoff.failures(), "S7 reconnect succeeded");
            }
            backoff.reset();
            Ok(conn)
        }
        Err(e) => {
            backoff.on_failure();
            tracing::warn!(
                attempt = backoff.failures(),
                ceiling = backoff.ceiling(),
                error = %e,
                "S7 reconnect failed"
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cycle_attempts() {
        let mut b = ReconnectBackoff::default();
        assert!(b.should_attempt());
        assert!(b.should_attempt());
    }

    #[test]
    fn test_gap_grows_linearly() {
        let mut b = ReconnectBackoff::default();
        assert!(b.should_attempt());
        b.on_failure();
        // ceiling 1: skip one cycle
        assert!(!b.should_attempt());
        assert!(b.should_attempt());
        b.on_failure();
        assert!(!b.should_attempt());
        assert!(!b.should_attempt());
        assert!(b.should_attempt());
        assert_eq!(b.failures(), 2);
    }

    #[test]
    fn test_ceiling_capped() {
        let mut b = ReconnectBackoff::new(100);
        for _ in 0..40 {
            b.on_failure();
        }
        assert_eq!(b.ceiling(), MAX_RECONNECT_CEILING);

        let mut small = ReconnectBackoff::new(3);
        for _ in 0..10 {
            small.on_failure();
        }
        assert_eq!(small.ceiling(), 3);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut b = ReconnectBackoff::default();
        b.on_failure();
        b.on_failure();
        b.reset();
        assert_eq!(b, ReconnectBackoff::default());
        assert!(b.should_attempt());
    }
}
