//! SensorChannel: one physical filament sensor.
//!
//! A channel pairs the extruder stepper's STEP input (optionally gated by its
//! DIR line) with the filament encoder's output. Counters and timestamps live
//! behind a single mutex so a reader always sees a consistent pair.
use std::sync::Mutex;
use std::time::{Duration, Instant};

use runout_traits::EdgeSource;
use tracing::trace;

use crate::config::ChannelCfg;
use crate::counter::{EdgeOutcome, PulseCounter};
use crate::judge::{Judgement, RunoutJudge};
use crate::util::lock;

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    armed: bool,
    armed_at: Option<Instant>,
    /// Armed period the counters belong to.
    generation: u64,
    motor: PulseCounter,
    encoder: PulseCounter,
}

/// A judgement tagged with the armed period whose counters produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodJudgement {
    pub generation: u64,
    pub judgement: Judgement,
}

/// Point-in-time copy of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub sensor: usize,
    pub armed: bool,
    pub motor_steps: u64,
    /// Encoder pulses; this is the channel's `pulseCount`.
    pub encoder_steps: u64,
    /// `None` until the encoder has pulsed in this armed period.
    pub last_pulse_age: Option<Duration>,
    pub rotating: bool,
    pub stalled: bool,
}

#[derive(Debug)]
pub struct SensorChannel {
    index: usize,
    cfg: ChannelCfg,
    judge: RunoutJudge,
    state: Mutex<ChannelState>,
}

impl SensorChannel {
    pub fn new(index: usize, cfg: ChannelCfg, judge: RunoutJudge, bounce: Duration) -> Self {
        Self {
            index,
            cfg,
            judge,
            state: Mutex::new(ChannelState {
                armed: false,
                armed_at: None,
                generation: 0,
                motor: PulseCounter::new(bounce),
                encoder: PulseCounter::new(bounce),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cfg(&self) -> &ChannelCfg {
        &self.cfg
    }

    /// Fresh armed period `generation`: counters zeroed, grace window starts at `now`.
    pub fn arm(&self, now: Instant, generation: u64) {
        let mut st = lock(&self.state);
        st.motor.reset();
        st.encoder.reset();
        st.armed_at = Some(now);
        st.generation = generation;
        st.armed = true;
    }

    /// Stop counting. Counters are kept for status until the next arm or reset.
    pub fn disarm(&self) {
        lock(&self.state).armed = false;
    }

    /// Zero counters without touching `armed`; an armed channel restarts its grace window.
    pub fn reset(&self, now: Instant) {
        let mut st = lock(&self.state);
        st.motor.reset();
        st.encoder.reset();
        if st.armed {
            st.armed_at = Some(now);
        }
    }

    /// Whether a step with the current DIR level should count.
    /// A failed read counts as a mismatch.
    pub fn direction_ok(&self, edges: &dyn EdgeSource) -> bool {
        let (Some(pin), Some(gate)) = (self.cfg.dir_pin, self.cfg.direction_gate) else {
            return true;
        };
        match edges.read_level(pin) {
            Ok(level) => level == gate,
            Err(e) => {
                trace!(sensor = self.index, pin, error = %e, "dir pin read failed; step ignored");
                false
            }
        }
    }

    /// Motor STEP edge. Returns a judgement only when the step was counted.
    pub fn on_motor_edge(&self, now: Instant, direction_ok: bool) -> Option<PeriodJudgement> {
        let mut st = lock(&self.state);
        if !st.armed {
            return None;
        }
        match st.motor.on_edge(now, direction_ok) {
            EdgeOutcome::Accepted => Some(PeriodJudgement {
                generation: st.generation,
                judgement: self.judge.judge(&st.motor, &st.encoder, st.armed_at, now),
            }),
            EdgeOutcome::Gated => {
                trace!(sensor = self.index, "motor step against direction gate");
                None
            }
            EdgeOutcome::Bounced => None,
        }
    }

    pub fn on_encoder_edge(&self, now: Instant) -> EdgeOutcome {
        let mut st = lock(&self.state);
        if !st.armed {
            return EdgeOutcome::Bounced;
        }
        st.encoder.on_edge(now, true)
    }

    pub fn judge(&self, now: Instant) -> PeriodJudgement {
        let st = lock(&self.state);
        PeriodJudgement {
            generation: st.generation,
            judgement: self.judge.judge(&st.motor, &st.encoder, st.armed_at, now),
        }
    }

    pub fn status(&self, now: Instant) -> ChannelStatus {
        let st = *lock(&self.state);
        let j = self.judge.judge(&st.motor, &st.encoder, st.armed_at, now);
        ChannelStatus {
            sensor: self.index,
            armed: st.armed,
            motor_steps: j.motor_steps,
            encoder_steps: j.encoder_steps,
            last_pulse_age: st.encoder.elapsed_since_last_pulse(now),
            rotating: self
                .judge
                .is_rotating(&st.motor, &st.encoder, st.armed_at, now),
            stalled: j.stalled,
        }
    }
}
