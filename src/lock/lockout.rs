//! Escalating delay after failed unlock attempts
//!
//! Delays grow by one second per failure starting at one second. Once the
//! next delay would exceed ten seconds a fixed five second penalty is served
//! and escalation restarts at three seconds, not one.
//!
//! ```text
//! 1 2 3 4 5 6 7 8 9 10 5 3 4 5 6 7 8 9 10 5 3 ...
//! ```

use tracing::info;

use super::audit::AuditSink;

pub const INITIAL_DELAY_SECS: u64 = 1;
pub const MAX_DELAY_SECS: u64 = 10;
pub const PENALTY_DELAY_SECS: u64 = 5;
pub const RESET_DELAY_SECS: u64 = 3;

/// Failure bookkeeping for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_count: u64,
    pub next_delay_seconds: u64,
}

impl Default for LockoutState {
    fn default() -> Self {
        Self {
            failed_count: 0,
            next_delay_seconds: INITIAL_DELAY_SECS,
        }
    }
}

pub struct LockoutPolicy<A: AuditSink> {
    state: LockoutState,
    audit: A,
}

impl<A: AuditSink> LockoutPolicy<A> {
    pub fn new(audit: A) -> Self {
        Self {
            state: LockoutState::default(),
            audit,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LockoutState {
        self.state
    }

    pub fn failed_count(&self) -> u64 {
        self.state.failed_count
    }

    /// Record a failed attempt for `username` and return the delay to serve.
    pub fn on_failure(&mut self, username: &str) -> u64 {
        self.audit.failed_login(username);
        self.state.failed_count += 1;

        let delay = if self.state.next_delay_seconds > MAX_DELAY_SECS {
            self.state.next_delay_seconds = RESET_DELAY_SECS;
            PENALTY_DELAY_SECS
        } else {
            let delay = self.state.next_delay_seconds;
            self.state.next_delay_seconds += 1;
            delay
        };

        info!(
            "Failed unlock attempt #{}, delaying {}s",
            self.state.failed_count, delay
        );
        delay
    }
}
