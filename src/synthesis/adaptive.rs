/*!
 * Adaptive in-flight limit for the synthesis scheduler.
 */

/// Successes in a row needed before the limit grows again
pub const GROWTH_STREAK: usize = 5;

/// An in-flight limit that backs off on failures and recovers on success.
///
/// The limit always stays between 1 and the configured maximum. A fixed limit
/// never moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptiveLimit {
    max: usize,
    current: usize,
    consecutive_successes: usize,
    adaptive: bool,
}

impl AdaptiveLimit {
    pub fn new(max: usize, adaptive: bool) -> Self {
        let max = max.max(1);
        Self {
            max,
            current: max,
            consecutive_successes: 0,
            adaptive,
        }
    }

    /// A limit that always stays at `max`
    pub fn fixed(max: usize) -> Self {
        Self::new(max, false)
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn on_success(&mut self) {
        if !self.adaptive {
            return;
        }
        self.consecutive_successes += 1;
        if self.consecutive_successes >= GROWTH_STREAK && self.current < self.max {
            self.current += 1;
            self.consecutive_successes = 0;
        }
    }

    pub fn on_failure(&mut self) {
        if !self.adaptive {
            return;
        }
        self.consecutive_successes = 0;
        self.current = (self.current / 2).max(1);
    }
}
