//! ExtrusionJudge: is the extruder currently trying to push filament?
//!
//! The judge owns the singular extruder state. Its edge callback stamps
//! `last_extrude_pulse`; `run_started` marks the beginning of the current
//! uninterrupted extrusion run and is what `min_extrude` is measured against.
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{ExtruderCfg, ExtrusionPolicy};
use crate::debounce::Debouncer;
use crate::util::lock;

#[derive(Debug, Clone, Copy)]
struct ExtrusionState {
    debounce: Debouncer,
    last_extrude_pulse: Option<Instant>,
    run_started: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtrusionSnapshot {
    pub is_extruding: bool,
    pub last_extrude_age: Option<Duration>,
}

#[derive(Debug)]
pub struct ExtrusionJudge {
    cfg: ExtruderCfg,
    state: Mutex<ExtrusionState>,
}

impl ExtrusionJudge {
    pub fn new(cfg: ExtruderCfg, bounce: Duration) -> Self {
        Self {
            cfg,
            state: Mutex::new(ExtrusionState {
                debounce: Debouncer::new(bounce),
                last_extrude_pulse: None,
                run_started: None,
            }),
        }
    }

    pub fn cfg(&self) -> &ExtruderCfg {
        &self.cfg
    }

    /// Start of an armed period. `level_high` is the pin level at arming.
    pub fn arm(&self, now: Instant, level_high: bool) {
        let mut st = lock(&self.state);
        st.debounce.clear();
        st.last_extrude_pulse = None;
        st.run_started = match self.cfg.policy {
            ExtrusionPolicy::Level if level_high => Some(now),
            _ => None,
        };
    }

    /// Rising edge on the extruder pin.
    pub fn on_edge(&self, now: Instant) {
        let mut st = lock(&self.state);
        if !st.debounce.accept(now) {
            return;
        }
        let new_run = match self.cfg.policy {
            ExtrusionPolicy::Level => st.run_started.is_none(),
            ExtrusionPolicy::Pulse { gap } => st
                .last_extrude_pulse
                .is_none_or(|t| now.saturating_duration_since(t) > gap),
        };
        if new_run {
            st.run_started = Some(now);
        }
        st.last_extrude_pulse = Some(now);
    }

    /// Evaluate and fold the observed `level` into the run bookkeeping.
    /// The level is ignored under the pulse policy.
    pub fn is_extruding(&self, now: Instant, level: bool) -> bool {
        let mut st = lock(&self.state);
        if let ExtrusionPolicy::Level = self.cfg.policy {
            if !level {
                st.run_started = None;
                return false;
            }
            if st.run_started.is_none() {
                st.run_started = Some(now);
            }
        }
        self.sustained(&st, now, level)
    }

    /// Read-only view for status reporting.
    pub fn snapshot(&self, now: Instant, level: bool) -> ExtrusionSnapshot {
        let st = lock(&self.state);
        ExtrusionSnapshot {
            is_extruding: self.sustained(&st, now, level),
            last_extrude_age: st
                .last_extrude_pulse
                .map(|t| now.saturating_duration_since(t)),
        }
    }

    fn sustained(&self, st: &ExtrusionState, now: Instant, level: bool) -> bool {
        let active = match self.cfg.policy {
            ExtrusionPolicy::Level => level,
            ExtrusionPolicy::Pulse { gap } => st
                .last_extrude_pulse
                .is_some_and(|t| now.saturating_duration_since(t) <= gap),
        };
        active
            && st
                .run_started
                .is_some_and(|t| now.saturating_duration_since(t) >= self.cfg.min_extrude)
    }
}
