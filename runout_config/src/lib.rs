#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the filament runout monitor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section has defaults matching the reference two-sensor board, so an
//!   empty file is a valid configuration.
//! - The runtime engine never re-reads this; `runout_core::conversions` maps it
//!   once into core structs before the controller is built.
use serde::Deserialize;
use std::path::Path;

/// Highest BCM GPIO number exposed on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// Wiring of one filament sensor channel.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPins {
    /// Extruder stepper STEP line (rising edge per motor step).
    pub motor_step_pin: u8,
    /// Extruder stepper DIR line, read when a step arrives.
    #[serde(default)]
    pub dir_pin: Option<u8>,
    /// DIR level that means "feeding forward". When absent, every step counts.
    #[serde(default)]
    pub motor_dir: Option<bool>,
    /// Filament encoder output (rising edge per encoder tick).
    pub encoder_pin: u8,
}

fn default_channels() -> Vec<ChannelPins> {
    vec![
        ChannelPins {
            motor_step_pin: 13,
            dir_pin: Some(16),
            motor_dir: Some(true),
            encoder_pin: 5,
        },
        ChannelPins {
            motor_step_pin: 19,
            dir_pin: Some(26),
            motor_dir: Some(false),
            encoder_pin: 6,
        },
    ]
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sensors {
    /// Number of active channels: -1 (or 0) disables monitoring, otherwise 1 or 2.
    pub count: i32,
    /// Minimum spacing between two accepted edges on the same input (ms).
    pub bounce_ms: u64,
    /// Channel wiring; only the first `count` entries are used.
    pub channel: Vec<ChannelPins>,
}

impl Default for Sensors {
    fn default() -> Self {
        Self {
            count: 2,
            bounce_ms: 300,
            channel: default_channels(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunoutPolicy {
    /// Motor advanced `motor_steps_required` while the encoder stayed below `encoder_steps_required`.
    #[default]
    Count,
    /// No encoder pulse for longer than `stale_timeout_ms`.
    Time,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Evaluation {
    /// Judge on every accepted motor-step edge.
    #[default]
    Edge,
    /// Judge from a background task every `poll_interval_ms`.
    Polling,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Detection {
    pub policy: RunoutPolicy,
    pub evaluation: Evaluation,
    pub motor_steps_required: u64,
    pub encoder_steps_required: u64,
    pub stale_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            policy: RunoutPolicy::Count,
            evaluation: Evaluation::Edge,
            motor_steps_required: 1000,
            encoder_steps_required: 500,
            stale_timeout_ms: 15_000,
            poll_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtruderPolicy {
    /// The pin is a "motor active" level; high means driving.
    #[default]
    Level,
    /// The pin carries step pulses; recent pulses mean driving.
    Pulse,
}

#[derive(Debug, Deserialize)]
pub struct Extruder {
    pub pin: u8,
    #[serde(default)]
    pub policy: ExtruderPolicy,
    /// Extrusion must be sustained this long before a stall counts (ms).
    #[serde(default = "default_min_extrude_ms")]
    pub min_extrude_ms: u64,
    /// Pulse policy only: a gap longer than this ends the extrusion run (ms).
    #[serde(default = "default_pulse_gap_ms")]
    pub pulse_gap_ms: u64,
}

fn default_min_extrude_ms() -> u64 {
    5_000
}

fn default_pulse_gap_ms() -> u64 {
    1_000
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Reposition {
    /// Move the head out of the print after pausing.
    pub enabled: bool,
    pub lift_z_mm: f32,
    pub lift_speed: u32,
    pub park_x: f32,
    pub park_y: f32,
    pub park_speed: u32,
}

impl Default for Reposition {
    fn default() -> Self {
        Self {
            enabled: true,
            lift_z_mm: 2.0,
            lift_speed: 1000,
            park_x: 0.0,
            park_y: 0.0,
            park_speed: 600,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sensors: Sensors,
    pub detection: Detection,
    /// Optional extrude-detect input; without it the extruder is assumed active while armed.
    pub extruder: Option<Extruder>,
    pub reposition: Reposition,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file. Validation is left to the caller.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))
}

impl Config {
    /// Channels that take part in monitoring, honoring `sensors.count`.
    pub fn active_channels(&self) -> &[ChannelPins] {
        match usize::try_from(self.sensors.count) {
            Ok(n) => &self.sensors.channel[..n.min(self.sensors.channel.len())],
            Err(_) => &[],
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Sensors
        if !matches!(self.sensors.count, -1..=2) {
            eyre::bail!("sensors.count must be -1, 0, 1 or 2");
        }
        let wanted = usize::try_from(self.sensors.count).unwrap_or(0);
        if self.sensors.channel.len() < wanted {
            eyre::bail!(
                "sensors.count is {} but only {} [[sensors.channel]] entries are defined",
                wanted,
                self.sensors.channel.len()
            );
        }
        if self.sensors.bounce_ms > 10_000 {
            eyre::bail!("sensors.bounce_ms is unreasonably large (>10s)");
        }
        for (i, ch) in self.active_channels().iter().enumerate() {
            if ch.motor_dir.is_some() && ch.dir_pin.is_none() {
                eyre::bail!("sensors.channel[{i}].motor_dir requires dir_pin");
            }
            if ch.dir_pin == Some(ch.motor_step_pin) {
                eyre::bail!("sensors.channel[{i}].dir_pin must differ from motor_step_pin");
            }
        }

        // Pins: in range and never shared between inputs
        let mut used: Vec<(u8, String)> = Vec::new();
        for (i, ch) in self.active_channels().iter().enumerate() {
            used.push((ch.motor_step_pin, format!("sensors.channel[{i}].motor_step_pin")));
            if let Some(p) = ch.dir_pin {
                used.push((p, format!("sensors.channel[{i}].dir_pin")));
            }
            used.push((ch.encoder_pin, format!("sensors.channel[{i}].encoder_pin")));
        }
        if let Some(ex) = &self.extruder {
            used.push((ex.pin, "extruder.pin".to_string()));
        }
        for (idx, (pin, name)) in used.iter().enumerate() {
            if *pin > MAX_BCM_PIN {
                eyre::bail!("{name} = {pin} is not a valid BCM pin (0..={MAX_BCM_PIN})");
            }
            if let Some((_, other)) = used[..idx].iter().find(|(p, _)| p == pin) {
                eyre::bail!("pin {pin} is used by both {other} and {name}");
            }
        }

        // Detection
        if self.detection.motor_steps_required == 0 {
            eyre::bail!("detection.motor_steps_required must be >= 1");
        }
        if self.detection.encoder_steps_required == 0 {
            eyre::bail!("detection.encoder_steps_required must be >= 1");
        }
        if self.detection.stale_timeout_ms == 0 {
            eyre::bail!("detection.stale_timeout_ms must be >= 1");
        }
        if self.detection.poll_interval_ms == 0 {
            eyre::bail!("detection.poll_interval_ms must be >= 1");
        }
        if self.detection.poll_interval_ms > 60 * 60 * 1000 {
            eyre::bail!("detection.poll_interval_ms is unreasonably large (>1h)");
        }

        // Extruder
        if let Some(ex) = &self.extruder
            && ex.pulse_gap_ms == 0
        {
            eyre::bail!("extruder.pulse_gap_ms must be >= 1");
        }

        // Reposition
        let r = &self.reposition;
        if !(r.lift_z_mm.is_finite() && r.park_x.is_finite() && r.park_y.is_finite()) {
            eyre::bail!("reposition coordinates must be finite");
        }
        if r.enabled && (r.lift_speed == 0 || r.park_speed == 0) {
            eyre::bail!("reposition speeds must be > 0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        Ok(())
    }
}
