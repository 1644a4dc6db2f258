//! Runtime configuration for the runout engine.
//!
//! These are the structs the controller is built from. They are separate from
//! the TOML-deserialized schema in `runout_config`; see `conversions`.
use std::time::Duration;

pub use runout_traits::Reposition;

/// Wiring of one sensor channel. Immutable once the controller is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCfg {
    pub motor_step_pin: u8,
    pub dir_pin: Option<u8>,
    /// Expected DIR level for a step to count. `None` counts every step.
    pub direction_gate: Option<bool>,
    pub encoder_pin: u8,
}

impl ChannelCfg {
    /// Every input this channel claims, in setup order.
    pub fn pins(&self) -> impl Iterator<Item = u8> {
        [Some(self.motor_step_pin), self.dir_pin, Some(self.encoder_pin)]
            .into_iter()
            .flatten()
    }
}

/// How a channel decides that filament stopped moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunoutPolicy {
    /// Stalled once the motor reached `motor_steps` while the encoder is still below `encoder_steps`.
    Count { motor_steps: u64, encoder_steps: u64 },
    /// Stalled once no encoder pulse arrived for longer than `stale_timeout`.
    Time { stale_timeout: Duration },
}

/// Where the judges are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// On every accepted motor-step edge, in the edge callback.
    Edge,
    /// On the watchdog thread every `interval`, gated by the extrusion judge.
    Polling { interval: Duration },
}

impl Evaluation {
    pub fn poll_interval(self) -> Option<Duration> {
        match self {
            Self::Edge => None,
            Self::Polling { interval } => Some(interval),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionCfg {
    /// Minimum spacing between accepted edges on one input.
    pub bounce: Duration,
    pub policy: RunoutPolicy,
    pub evaluation: Evaluation,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            bounce: Duration::from_millis(300),
            policy: RunoutPolicy::Count {
                motor_steps: 1000,
                encoder_steps: 500,
            },
            evaluation: Evaluation::Edge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrusionPolicy {
    /// Pin level means "motor driving"; sampled at evaluation time.
    Level,
    /// Pin carries step pulses; a silence longer than `gap` ends the run.
    Pulse { gap: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtruderCfg {
    pub pin: u8,
    pub policy: ExtrusionPolicy,
    /// Extrusion must be sustained this long before a stall counts.
    pub min_extrude: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineCfg {
    /// Zero, one or two channels.
    pub channels: Vec<ChannelCfg>,
    pub detection: DetectionCfg,
    /// Without an extruder input the extruder counts as active while armed.
    pub extruder: Option<ExtruderCfg>,
    /// Head move after pausing; `None` skips it.
    pub reposition: Option<Reposition>,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            channels: vec![
                ChannelCfg {
                    motor_step_pin: 13,
                    dir_pin: Some(16),
                    direction_gate: Some(true),
                    encoder_pin: 5,
                },
                ChannelCfg {
                    motor_step_pin: 19,
                    dir_pin: Some(26),
                    direction_gate: Some(false),
                    encoder_pin: 6,
                },
            ],
            detection: DetectionCfg::default(),
            extruder: None,
            reposition: Some(Reposition::default()),
        }
    }
}
