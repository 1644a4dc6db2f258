//! JSON and text renderings of engine state.
use runout_core::util::millis;
use runout_core::{ArmMode, ChannelWiring, EngineStatus, RunState};
use serde_json::{Value, json};

use crate::actuator::runout_json;

fn mode_name(mode: Option<ArmMode>) -> Option<&'static str> {
    mode.map(|m| match m {
        ArmMode::Monitor => "monitor",
        ArmMode::Test => "test",
    })
}

pub fn state_json(state: RunState, mode: Option<ArmMode>) -> Value {
    json!({ "event": "state", "state": state.as_str(), "mode": mode_name(mode) })
}

pub fn wiring_json(wiring: &[ChannelWiring]) -> Value {
    let sensors: Vec<Value> = wiring
        .iter()
        .map(|w| {
            json!({
                "sensor": w.sensor,
                "motor_step_pin": w.motor_step_pin,
                "dir_pin": w.dir_pin,
                "encoder_pin": w.encoder_pin,
                "direction_gate": w.direction_gate,
            })
        })
        .collect();
    json!({ "no_sensors": sensors.is_empty(), "sensors": sensors })
}

pub fn wiring_text(wiring: &[ChannelWiring]) -> String {
    if wiring.is_empty() {
        return "no sensors".to_string();
    }
    wiring
        .iter()
        .map(|w| {
            let dir = match (w.dir_pin, w.direction_gate) {
                (Some(p), Some(gate)) => format!("{p} (forward={})", if gate { "high" } else { "low" }),
                (Some(p), None) => format!("{p} (not gated)"),
                (None, _) => "-".to_string(),
            };
            format!(
                "sensor {}: step={} dir={} encoder={}",
                w.sensor, w.motor_step_pin, dir, w.encoder_pin
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn status_json(s: &EngineStatus, wiring: &[ChannelWiring]) -> Value {
    let channels: Vec<Value> = s
        .channels
        .iter()
        .map(|c| {
            json!({
                "sensor": c.sensor,
                "armed": c.armed,
                "motor_steps": c.motor_steps,
                "encoder_steps": c.encoder_steps,
                "last_pulse_age_ms": c.last_pulse_age.map(millis),
                "rotating": c.rotating,
                "stalled": c.stalled,
            })
        })
        .collect();
    json!({
        "event": "status",
        "state": s.run_state.as_str(),
        "mode": mode_name(s.mode),
        "no_sensors": s.no_sensors,
        "wiring": wiring_json(wiring)["sensors"].take(),
        "channels": channels,
        "extrusion": {
            "configured": s.extrusion.configured,
            "is_extruding": s.extrusion.is_extruding,
            "last_extrude_age_ms": s.extrusion.last_extrude_age.map(millis),
        },
        "failed_channels": s.failed_channels.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "last_runout": s.last_runout.as_ref().map(runout_json),
    })
}
