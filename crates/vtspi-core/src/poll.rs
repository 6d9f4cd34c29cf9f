//! Bounded busy-wait polling

use std::thread;
use std::time::Duration;

use crate::config::Timing;
use crate::error::SpiError;

/// Attempt ceiling and per-attempt delay for a register poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of checks
    pub attempts: u32,
    /// Sleep between failed checks
    pub delay: Duration,
}

impl PollPolicy {
    /// Create a policy
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl From<&Timing> for PollPolicy {
    fn from(timing: &Timing) -> Self {
        Self::new(timing.poll_attempts, timing.poll_delay())
    }
}

/// Check `ready` until it returns true or the policy runs out
///
/// `what` names the awaited condition in the timeout error. The check runs
/// at least once even with a zero attempt ceiling.
pub fn poll_until<F>(policy: PollPolicy, what: &'static str, mut ready: F) -> Result<(), SpiError>
where
    F: FnMut() -> bool,
{
    let attempts = policy.attempts.max(1);
    for attempt in 0..attempts {
        if ready() {
            return Ok(());
        }
        if attempt + 1 < attempts && !policy.delay.is_zero() {
            thread::sleep(policy.delay);
        }
    }
    log::trace!("poll for {} gave up after {} attempts", what, attempts);
    Err(SpiError::Timeout(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_on_third_attempt() {
        let mut calls = 0;
        let policy = PollPolicy::new(5, Duration::ZERO);
        poll_until(policy, "flag", || {
            calls += 1;
            calls == 3
        })
        .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_timeout_is_distinct_and_bounded() {
        let mut calls = 0;
        let policy = PollPolicy::new(4, Duration::from_micros(1));
        let err = poll_until(policy, "tx empty", || {
            calls += 1;
            false
        })
        .unwrap_err();
        assert_eq!(err, SpiError::Timeout("tx empty"));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_zero_attempts_still_checks_once() {
        let policy = PollPolicy::new(0, Duration::ZERO);
        assert!(poll_until(policy, "x", || true).is_ok());
    }
}
