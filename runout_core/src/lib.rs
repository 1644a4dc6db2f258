#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Filament runout engine (hardware-agnostic).
//!
//! Correlates extruder step pulses with filament encoder pulses and pauses the
//! print once when feed stalls while the extruder is driving. All hardware
//! access goes through `runout_traits::EdgeSource` and `runout_traits::PauseActuator`.
//!
//! ## Architecture
//!
//! - **Debounce / counting**: `Debouncer` and `PulseCounter` per input (`debounce`, `counter`)
//! - **Judges**: `RunoutJudge` (count or time policy) and `ExtrusionJudge` (level or pulse)
//! - **Channels**: `SensorChannel` pairs one motor input with one encoder input
//! - **Lifecycle**: `SensorController` arms, disarms and resets; the watchdog
//!   thread delivers triggers and runs polling evaluation
//! - **Status**: owned snapshots for reporting (`status`)

pub mod builder;
pub mod channel;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod counter;
pub mod debounce;
pub mod error;
pub mod extrusion;
pub mod hw_error;
pub mod judge;
pub mod mocks;
pub mod status;
pub mod util;
mod watchdog;

pub use builder::{Missing, SensorControllerBuilder, Set};
pub use channel::{PeriodJudgement, SensorChannel};
pub use config::{
    ChannelCfg, DetectionCfg, EngineCfg, Evaluation, ExtruderCfg, ExtrusionPolicy, RunoutPolicy,
};
pub use controller::SensorController;
pub use counter::{EdgeOutcome, PulseCounter};
pub use debounce::Debouncer;
pub use error::{BuildError, EngineError, Report, Result};
pub use extrusion::ExtrusionJudge;
pub use judge::{Judgement, RunoutJudge};
pub use status::{ArmMode, ChannelStatus, ChannelWiring, EngineStatus, ExtrusionStatus, RunState};

pub use runout_traits::{Detection, PrintEvent, Reposition, RunoutEvent};
