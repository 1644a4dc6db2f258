//! Edge debouncing.
use std::time::{Duration, Instant};

/// Accepts an edge only if the previous accepted edge is at least `window` old.
///
/// Rejected edges are dropped, not merged, and do not move the window.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    #[inline]
    pub fn accept(&mut self, now: Instant) -> bool {
        let ok = match self.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };
        if ok {
            self.last_accepted = Some(now);
        }
        ok
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn clear(&mut self) {
        self.last_accepted = None;
    }
}
