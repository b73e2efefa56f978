//! Receive deadline and cooperative cancellation.
//!
//! The receive loop never blocks for longer than one poll interval.  Between
//! polls it asks a [`Deadline`] whether the overall timeout has elapsed and a
//! [`CancelToken`] whether someone (typically the Ctrl-C handler in
//! `main.rs`) wants it to stop.  Neither affects which packets match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cloneable flag shared between the handshake and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.  Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Optional point in time after which the receive loop gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now, or none at all.
    ///
    /// A timeout too large to represent as an `Instant` means no deadline.
    pub fn after(timeout: Option<Duration>) -> Self {
        match timeout.and_then(|t| Instant::now().checked_add(t)) {
            Some(at) => Self { at: Some(at) },
            None => Self::never(),
        }
    }

    pub fn never() -> Self {
        Self { at: None }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// How long the next receive may block: `poll` capped by the time left.
    pub fn next_wait(&self, poll: Duration) -> Duration {
        match self.at {
            Some(at) => poll.min(at.saturating_duration_since(Instant::now())),
            None => poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn never_does_not_expire() {
        let d = Deadline::never();
        assert!(!d.expired());
        assert_eq!(d.next_wait(Duration::from_millis(50)), Duration::from_millis(50));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let d = Deadline::after(Some(Duration::ZERO));
        assert!(d.expired());
        assert_eq!(d.next_wait(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn unrepresentable_timeout_waits_forever() {
        let d = Deadline::after(Some(Duration::from_secs(u64::MAX)));
        let poll = Duration::from_millis(25);
        assert!(!d.expired());
        assert_eq!(d.next_wait(poll), poll);
    }

    #[test]
    fn next_wait_is_capped_by_poll_interval() {
        let d = Deadline::after(Some(Duration::from_secs(3600)));
        assert_eq!(d.next_wait(Duration::from_millis(10)), Duration::from_millis(10));
    }
}
