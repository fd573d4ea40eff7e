//! L1 — Clock & Timer Queue (§4.1).
//!
//! Exposes `now_ms`/`arm`/`disarm` per the collaborator interface
//! (§6). The default `SystemClock` wraps `std::time::Instant`
//! the way `original_source/windows/pbtimespec_elapsed_ms.c` computes
//! elapsed time from a monotonic source: saturating subtraction, never
//! a signed/negative duration.

use std::time::{Duration, Instant};

/// Monotonic millisecond clock collaborator (§6).
pub trait Clock: std::fmt::Debug {
    /// Milliseconds since some fixed, monotonic epoch (implementation
    /// defined — only differences across calls on the same `Clock` are
    /// meaningful).
    fn now_ms(&self) -> u64;
}

/// Default `Clock` built on `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock {
            epoch: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// The two timers that matter per transaction (§4.1): the overall
/// transaction timer and, during the connect stage only, the
/// wait-connect timer. Each context has exactly one of these armed at
/// a time per timer kind — arming disarms any existing deadline for
/// that kind (§3 invariant: "every outstanding timer is associated
/// with exactly one Context and one stage").
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerQueue {
    transaction_deadline_ms: Option<u64>,
    wait_connect_deadline_ms: Option<u64>,
}

/// Which timer fired, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerExpiry {
    TransactionTimer,
    WaitConnectTimer,
}

impl TimerQueue {
    pub fn arm_transaction(&mut self, now_ms: u64, duration_ms: u64) {
        self.transaction_deadline_ms = Some(now_ms.saturating_add(duration_ms));
    }

    pub fn arm_wait_connect(&mut self, now_ms: u64, duration_ms: u64) {
        self.wait_connect_deadline_ms = Some(now_ms.saturating_add(duration_ms));
    }

    pub fn disarm_wait_connect(&mut self) {
        self.wait_connect_deadline_ms = None;
    }

    /// Disarm every timer for this context (used on cancellation and
    /// on reaching a terminal stage).
    pub fn disarm_all(&mut self) {
        self.transaction_deadline_ms = None;
        self.wait_connect_deadline_ms = None;
    }

    /// Check whether either timer has expired as of `now_ms`. The
    /// transaction timer takes priority if both expired simultaneously,
    /// since it bounds the whole transaction.
    pub fn check(&self, now_ms: u64) -> Option<TimerExpiry> {
        if self.transaction_deadline_ms.is_some_and(|d| now_ms >= d) {
            return Some(TimerExpiry::TransactionTimer);
        }
        if self.wait_connect_deadline_ms.is_some_and(|d| now_ms >= d) {
            return Some(TimerExpiry::WaitConnectTimer);
        }
        None
    }

    /// How long until the next armed timer fires, for a blocking
    /// driver to sleep/select on. `None` means no timer is armed.
    pub fn next_deadline_in(&self, now_ms: u64) -> Option<Duration> {
        [self.transaction_deadline_ms, self.wait_connect_deadline_ms]
            .iter()
            .copied()
            .flatten()
            .min()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_timer_expires_after_duration() {
        let mut q = TimerQueue::default();
        q.arm_transaction(1_000, 500);
        assert_eq!(q.check(1_499), None);
        assert_eq!(q.check(1_500), Some(TimerExpiry::TransactionTimer));
    }

    #[test]
    fn wait_connect_timer_is_independent() {
        let mut q = TimerQueue::default();
        q.arm_transaction(0, 10_000);
        q.arm_wait_connect(0, 100);
        assert_eq!(q.check(100), Some(TimerExpiry::WaitConnectTimer));
        q.disarm_wait_connect();
        assert_eq!(q.check(100), None);
    }

    #[test]
    fn disarm_all_clears_both_timers() {
        let mut q = TimerQueue::default();
        q.arm_transaction(0, 10);
        q.arm_wait_connect(0, 10);
        q.disarm_all();
        assert_eq!(q.check(1_000_000), None);
        assert_eq!(q.next_deadline_in(0), None);
    }
}
