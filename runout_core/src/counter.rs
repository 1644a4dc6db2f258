//! Per-input pulse accumulation behind a debouncer.
use std::time::{Duration, Instant};

use crate::debounce::Debouncer;

/// What happened to one raw edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    Accepted,
    /// Inside the bounce window of the previous accepted edge.
    Bounced,
    /// Passed debounce but the direction gate did not match.
    Gated,
}

#[derive(Debug, Clone, Copy)]
pub struct PulseCounter {
    debounce: Debouncer,
    count: u64,
    last_pulse: Option<Instant>,
}

impl PulseCounter {
    pub const fn new(bounce: Duration) -> Self {
        Self {
            debounce: Debouncer::new(bounce),
            count: 0,
            last_pulse: None,
        }
    }

    /// Feed one rising edge. A gated edge still consumes the debounce window.
    #[inline]
    pub fn on_edge(&mut self, now: Instant, direction_ok: bool) -> EdgeOutcome {
        if !self.debounce.accept(now) {
            return EdgeOutcome::Bounced;
        }
        if !direction_ok {
            return EdgeOutcome::Gated;
        }
        self.count = self.count.saturating_add(1);
        self.last_pulse = Some(now);
        EdgeOutcome::Accepted
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.last_pulse = None;
        self.debounce.clear();
    }

    #[inline]
    pub fn steps_since(&self) -> u64 {
        self.count
    }

    pub fn last_pulse(&self) -> Option<Instant> {
        self.last_pulse
    }

    /// `None` until the first accepted pulse.
    #[inline]
    pub fn elapsed_since_last_pulse(&self, now: Instant) -> Option<Duration> {
        self.last_pulse.map(|t| now.saturating_duration_since(t))
    }
}
