#![allow(dead_code)]

use std::time::Duration;

use runout_core::mocks::RecordingActuator;
use runout_core::{
    ChannelCfg, DetectionCfg, EngineCfg, Evaluation, RunoutPolicy, SensorController,
};
use runout_hardware::SimulatedEdgeSource;
use runout_traits::ManualClock;

pub const MOTOR: u8 = 13;
pub const DIR: u8 = 16;
pub const ENCODER: u8 = 5;
pub const EXTRUDER: u8 = 21;
pub const BOUNCE: Duration = Duration::from_millis(300);

pub struct Rig {
    pub ctl: SensorController,
    pub edges: SimulatedEdgeSource,
    pub clock: ManualClock,
    pub actuator: RecordingActuator,
}

impl Rig {
    /// Controller without a watchdog thread; drive it with `tick()`.
    pub fn new(cfg: EngineCfg) -> Self {
        Self::with_edges(cfg, SimulatedEdgeSource::new())
    }

    pub fn with_edges(cfg: EngineCfg, edges: SimulatedEdgeSource) -> Self {
        let clock = ManualClock::new();
        let actuator = RecordingActuator::new();
        let ctl = SensorController::builder()
            .with_edge_source(edges.clone())
            .with_actuator(actuator.clone())
            .with_config(cfg)
            .with_clock(Box::new(clock.clone()))
            .with_watchdog_thread(false)
            .build()
            .expect("build controller");
        Self {
            ctl,
            edges,
            clock,
            actuator,
        }
    }

    /// Advance by one bounce window and deliver an edge on `pin`.
    pub fn step(&self, pin: u8) {
        self.clock.advance(BOUNCE);
        self.edges.pulse(pin);
    }

    pub fn steps(&self, pin: u8, n: usize) {
        for _ in 0..n {
            self.step(pin);
        }
    }
}

pub fn channel() -> ChannelCfg {
    ChannelCfg {
        motor_step_pin: MOTOR,
        dir_pin: None,
        direction_gate: None,
        encoder_pin: ENCODER,
    }
}

pub fn count(motor_steps: u64, encoder_steps: u64) -> RunoutPolicy {
    RunoutPolicy::Count {
        motor_steps,
        encoder_steps,
    }
}

pub fn single(policy: RunoutPolicy, evaluation: Evaluation) -> EngineCfg {
    EngineCfg {
        channels: vec![channel()],
        detection: DetectionCfg {
            bounce: BOUNCE,
            policy,
            evaluation,
        },
        extruder: None,
        reposition: None,
    }
}
