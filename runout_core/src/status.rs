//! Owned status snapshots for reporting layers.
use std::time::Duration;

use runout_traits::RunoutEvent;

pub use crate::channel::ChannelStatus;
use crate::error::EngineError;

/// Engine lifecycle. `Triggered` lasts only while the pause actuator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Disabled,
    Armed,
    Triggered,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Armed => "armed",
            Self::Triggered => "triggered",
        }
    }
}

/// Why the engine is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmMode {
    /// Stalls fire the pause actuator.
    #[default]
    Monitor,
    /// Counters run for threshold calibration; stalls never fire.
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtrusionStatus {
    /// An extruder input is wired and initialised.
    pub configured: bool,
    pub is_extruding: bool,
    pub last_extrude_age: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub run_state: RunState,
    /// Set while armed.
    pub mode: Option<ArmMode>,
    /// No usable channel: monitoring can never arm.
    pub no_sensors: bool,
    pub channels: Vec<ChannelStatus>,
    pub extrusion: ExtrusionStatus,
    /// One `EngineError::ChannelInit` per channel excluded at construction.
    pub failed_channels: Vec<EngineError>,
    /// The runout that ended the last armed period, cleared on the next arm.
    pub last_runout: Option<RunoutEvent>,
}

/// Wiring report for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWiring {
    pub sensor: usize,
    pub motor_step_pin: u8,
    pub dir_pin: Option<u8>,
    pub encoder_pin: u8,
    pub direction_gate: Option<bool>,
}
