//! Request deadlines.
//!
//! A deadline is anchored once at admission; every later phase derives its
//! remaining budget from that single anchor instead of recomputing.

use std::time::{Duration, Instant};

/// A wall-clock anchored deadline carried through the request lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    anchor: Instant,
    budget: Duration,
}

impl Deadline {
    /// Anchor a deadline now with the given total budget.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            anchor: Instant::now(),
            budget,
        }
    }

    /// The instant this deadline was anchored.
    #[must_use]
    pub fn anchor(&self) -> Instant {
        self.anchor
    }

    /// Total budget granted at admission.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time elapsed since admission.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.anchor.elapsed()
    }

    /// Remaining budget, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.anchor.elapsed())
    }

    /// True once the budget is spent.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The smaller of the remaining budget and `cap`.
    ///
    /// Used to bound retry backoff and single-flight waits.
    #[must_use]
    pub fn remaining_capped(&self, cap: Duration) -> Duration {
        self.remaining().min(cap)
    }
}
