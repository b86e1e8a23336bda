//! Rate Gate
//!
//! A single shared cool-down deadline for everything one client sends.
//!
//! The deadline lives in an atomic, so waiting on it never holds a lock and an
//! attempt that is waiting can still install a new deadline itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Marker for "no deadline installed"
const UNSET: u64 = 0;

/// Cap for cool-downs too large to represent as an `Instant`
const MAX_COOLDOWN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Shared "unavailable until" deadline
#[derive(Debug)]
pub struct RateGate {
    /// Reference point for the stored offsets
    origin: Instant,

    /// Deadline as microseconds since `origin`, or `UNSET`
    deadline_us: AtomicU64,
}

impl RateGate {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            deadline_us: AtomicU64::new(UNSET),
        }
    }

    /// Currently installed deadline, even if already elapsed
    pub fn deadline(&self) -> Option<Instant> {
        match self.deadline_us.load(Ordering::Acquire) {
            UNSET => None,
            us => Some(self.origin + Duration::from_micros(us)),
        }
    }

    /// Time left until the gate opens, `None` if it is open
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = self.deadline()?;
        let now = Instant::now();
        (deadline > now).then(|| deadline - now)
    }

    /// Whether callers would currently have to wait
    pub fn is_engaged(&self) -> bool {
        self.remaining().is_some()
    }

    /// Wait until no deadline is pending
    ///
    /// Re-checks after every sleep, since another attempt may have pushed the
    /// deadline further out meanwhile. Dropping the future abandons the wait.
    pub async fn await_availability(&self) {
        while let Some(wait) = self.remaining() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "waiting for rate gate");
            tokio::time::sleep(wait).await;
        }
    }

    /// Close the gate for `duration` from now and return the effective deadline
    ///
    /// A deadline already further out is kept, so a short cool-down never cuts
    /// a longer one short.
    pub fn mark_unavailable(&self, duration: Duration) -> Instant {
        let now = Instant::now();
        let until = now.checked_add(duration).unwrap_or_else(|| now + MAX_COOLDOWN);
        let offset = u64::try_from((until - self.origin).as_nanos().div_ceil(1_000))
            .unwrap_or(u64::MAX)
            .max(1);

        let previous = self.deadline_us.fetch_max(offset, Ordering::AcqRel);
        let effective = previous.max(offset);

        if previous == UNSET || self.origin + Duration::from_micros(previous) <= Instant::now() {
            tracing::warn!(
                cooldown_ms = duration.as_millis() as u64,
                "rate gate engaged"
            );
        } else {
            tracing::debug!(
                cooldown_ms = duration.as_millis() as u64,
                extended = offset > previous,
                "rate gate already engaged"
            );
        }

        self.origin + Duration::from_micros(effective)
    }

    /// Drop any pending deadline
    pub fn reset(&self) {
        self.deadline_us.store(UNSET, Ordering::Release);
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}
