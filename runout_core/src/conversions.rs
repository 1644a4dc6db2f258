//! `From` implementations bridging `runout_config` types to `runout_core` types.
use std::time::Duration;

use crate::config::{
    ChannelCfg, DetectionCfg, EngineCfg, Evaluation, ExtruderCfg, ExtrusionPolicy, Reposition,
    RunoutPolicy,
};

impl From<&runout_config::ChannelPins> for ChannelCfg {
    fn from(c: &runout_config::ChannelPins) -> Self {
        Self {
            motor_step_pin: c.motor_step_pin,
            dir_pin: c.dir_pin,
            direction_gate: c.dir_pin.and(c.motor_dir),
            encoder_pin: c.encoder_pin,
        }
    }
}

impl From<&runout_config::Detection> for RunoutPolicy {
    fn from(d: &runout_config::Detection) -> Self {
        match d.policy {
            runout_config::RunoutPolicy::Count => Self::Count {
                motor_steps: d.motor_steps_required,
                encoder_steps: d.encoder_steps_required,
            },
            runout_config::RunoutPolicy::Time => Self::Time {
                stale_timeout: Duration::from_millis(d.stale_timeout_ms),
            },
        }
    }
}

impl From<&runout_config::Detection> for Evaluation {
    fn from(d: &runout_config::Detection) -> Self {
        match d.evaluation {
            runout_config::Evaluation::Edge => Self::Edge,
            runout_config::Evaluation::Polling => Self::Polling {
                interval: Duration::from_millis(d.poll_interval_ms),
            },
        }
    }
}

impl From<&runout_config::Config> for DetectionCfg {
    fn from(c: &runout_config::Config) -> Self {
        Self {
            bounce: Duration::from_millis(c.sensors.bounce_ms),
            policy: RunoutPolicy::from(&c.detection),
            evaluation: Evaluation::from(&c.detection),
        }
    }
}

impl From<&runout_config::Extruder> for ExtruderCfg {
    fn from(x: &runout_config::Extruder) -> Self {
        Self {
            pin: x.pin,
            policy: match x.policy {
                runout_config::ExtruderPolicy::Level => ExtrusionPolicy::Level,
                runout_config::ExtruderPolicy::Pulse => ExtrusionPolicy::Pulse {
                    gap: Duration::from_millis(x.pulse_gap_ms),
                },
            },
            min_extrude: Duration::from_millis(x.min_extrude_ms),
        }
    }
}

/// `None` when repositioning is switched off.
pub fn reposition_plan(r: &runout_config::Reposition) -> Option<Reposition> {
    r.enabled.then_some(Reposition {
        lift_z_mm: r.lift_z_mm,
        lift_speed: r.lift_speed,
        park_x: r.park_x,
        park_y: r.park_y,
        park_speed: r.park_speed,
    })
}

impl From<&runout_config::Config> for EngineCfg {
    fn from(c: &runout_config::Config) -> Self {
        Self {
            channels: c.active_channels().iter().map(ChannelCfg::from).collect(),
            detection: DetectionCfg::from(c),
            extruder: c.extruder.as_ref().map(ExtruderCfg::from),
            reposition: reposition_plan(&c.reposition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_matches_default_engine() {
        let cfg = runout_config::load_toml("").expect("parse");
        assert_eq!(EngineCfg::from(&cfg), EngineCfg::default());
    }

    #[test]
    fn time_polling_with_pulse_extruder() {
        let cfg = runout_config::load_toml(
            "[sensors]\ncount = 1\n[detection]\npolicy = \"time\"\nevaluation = \"polling\"\n\
             stale_timeout_ms = 15000\npoll_interval_ms = 2000\n\
             [extruder]\npin = 21\npolicy = \"pulse\"\npulse_gap_ms = 700\n\
             [reposition]\nenabled = false\n",
        )
        .expect("parse");
        let engine = EngineCfg::from(&cfg);
        assert_eq!(engine.channels.len(), 1);
        assert_eq!(
            engine.detection.policy,
            RunoutPolicy::Time {
                stale_timeout: Duration::from_secs(15)
            }
        );
        assert_eq!(engine.detection.evaluation.poll_interval(), Some(Duration::from_secs(2)));
        assert_eq!(
            engine.extruder.map(|x| x.policy),
            Some(ExtrusionPolicy::Pulse {
                gap: Duration::from_millis(700)
            })
        );
        assert_eq!(engine.reposition, None);
    }

    #[test]
    fn no_sensors_yields_no_channels() {
        let cfg = runout_config::load_toml("[sensors]\ncount = -1\n").expect("parse");
        assert!(EngineCfg::from(&cfg).channels.is_empty());
    }
}
