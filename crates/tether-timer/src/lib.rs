//! Cancellable timers and retry pacing for Tether.
//!
//! Connection states need two kinds of delayed work: a deadline ("give up
//! on connecting after 30 s") and a pause between reconnect attempts. Both
//! are a single message delivered into the state machine's event channel
//! after a delay, and both must die when the state that armed them exits.
//!
//! # Integration
//!
//! A [`RetryTimer`] posts its message into the same channel the connection
//! manager already selects over, so timers are just another event source:
//!
//! ```ignore
//! timer.schedule(policy.delay_for(attempt), internal_tx.clone(), Event::Tick);
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* user commands */ }
//!         Some(ev) = internal_rx.recv() => { /* timer fired */ }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// How a reconnect loop paces and bounds its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Wait before the first attempt, giving the transport a moment to
    /// settle after the drop.
    pub initial_delay: Duration,
    /// Wait between a failed attempt and the next one.
    pub retry_delay: Duration,
    /// Attempts allowed before giving up. 0 disables retrying.
    pub max_attempts: u32,
    /// Random jitter (0–max ms) added to every delay so clients dropped by
    /// the same outage don't all come back on the same instant.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
            max_attempts: 2,
            jitter_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Upper bound on `max_attempts`.
    pub const MAX_ATTEMPTS: u32 = 32;

    /// Upper bound on `jitter_ms`.
    pub const MAX_JITTER_MS: u64 = 10_000;

    /// Clamp out-of-range values so the policy is safe to use.
    pub fn validated(mut self) -> Self {
        if self.max_attempts > Self::MAX_ATTEMPTS {
            warn!(
                max_attempts = self.max_attempts,
                limit = Self::MAX_ATTEMPTS,
                "max_attempts exceeds limit, clamping"
            );
            self.max_attempts = Self::MAX_ATTEMPTS;
        }
        if self.jitter_ms > Self::MAX_JITTER_MS {
            warn!(
                jitter_ms = self.jitter_ms,
                limit = Self::MAX_JITTER_MS,
                "jitter_ms exceeds limit, clamping"
            );
            self.jitter_ms = Self::MAX_JITTER_MS;
        }
        self
    }

    /// Delay before attempt number `attempt` (1-based): `initial_delay` for
    /// the first, `retry_delay` after that, plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = if attempt <= 1 {
            self.initial_delay
        } else {
            self.retry_delay
        };
        base + self.jitter()
    }

    /// Whether attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.jitter_ms))
    }
}

// ---------------------------------------------------------------------------
// RetryTimer
// ---------------------------------------------------------------------------

/// A one-shot timer that delivers a message into a channel.
///
/// At most one message is pending at a time: scheduling again replaces the
/// previous one. Dropping the timer cancels it, so a timer stored in a
/// state struct dies with the state.
#[derive(Debug, Default)]
pub struct RetryTimer {
    pending: Option<JoinHandle<()>>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `msg` on `tx` after `after`. Cancels anything already pending.
    ///
    /// A closed channel is not an error: the receiver going away means
    /// nobody cares about the timer any more.
    pub fn schedule<T>(&mut self, after: Duration, tx: mpsc::UnboundedSender<T>, msg: T)
    where
        T: Send + 'static,
    {
        self.cancel();
        trace!(after_ms = after.as_millis() as u64, "timer scheduled");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if tx.send(msg).is_err() {
                trace!("timer fired after receiver closed");
            }
        }));
    }

    /// Cancels the pending message, if any. Returns `true` if one was
    /// cancelled before it fired.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a message is scheduled and hasn't been sent yet.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.initial_delay, Duration::from_secs(1));
        assert_eq!(p.retry_delay, Duration::from_secs(5));
        assert_eq!(p.max_attempts, 2);
        assert_eq!(p.jitter_ms, 0);
    }

    #[test]
    fn test_allows_respects_bound() {
        let p = RetryPolicy::default();
        assert!(!p.allows(0));
        assert!(p.allows(1));
        assert!(p.allows(2));
        assert!(!p.allows(3));
    }

    #[test]
    fn test_zero_attempts_allows_nothing() {
        let p = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!p.allows(1));
    }
}
