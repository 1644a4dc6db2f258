//! Pause actuator that publishes runout notifications as JSON lines.
//!
//! The hosting print server reads these from our stdout and performs the
//! pause and head moves itself.
use std::io::Write;
use std::sync::{Arc, Mutex};

use runout_core::util::millis;
use runout_traits::{BoxError, Detection, PauseActuator, Reposition, RunoutEvent};
use serde_json::json;

pub fn runout_json(event: &RunoutEvent) -> serde_json::Value {
    json!({
        "event": "filament_runout",
        "action": "pause",
        "sensor": event.sensor,
        "motor_steps": event.motor_steps,
        "encoder_steps": event.encoder_steps,
        "stale_for_ms": event.stale_for.map(millis),
        "detected_by": match event.detected_by {
            Detection::Edge => "edge",
            Detection::Poll => "poll",
        },
    })
}

/// Relative Z lift, then absolute XY park.
pub fn jog_json(plan: &Reposition) -> [serde_json::Value; 2] {
    [
        json!({ "event": "jog", "relative": true, "z": plan.lift_z_mm, "speed": plan.lift_speed }),
        json!({
            "event": "jog",
            "relative": false,
            "x": plan.park_x,
            "y": plan.park_y,
            "speed": plan.park_speed,
        }),
    ]
}

/// Writes one JSON object per line to a shared writer.
pub struct JsonLinesActuator<W> {
    out: Arc<Mutex<W>>,
}

impl<W> JsonLinesActuator<W> {
    pub fn new(out: Arc<Mutex<W>>) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> JsonLinesActuator<W> {
    fn emit(&self, value: &serde_json::Value) -> Result<(), BoxError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| "runout output writer poisoned".to_string())?;
        writeln!(out, "{value}")?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> PauseActuator for JsonLinesActuator<W> {
    fn pause(&mut self, event: &RunoutEvent) -> Result<(), BoxError> {
        self.emit(&runout_json(event))
    }

    fn reposition(&mut self, plan: &Reposition) -> Result<(), BoxError> {
        jog_json(plan).iter().try_for_each(|v| self.emit(v))
    }
}
