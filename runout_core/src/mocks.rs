//! Test and helper mocks for runout_core

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use runout_traits::{BoxError, PauseActuator, Reposition, RunoutEvent};

/// One call made on a [`RecordingActuator`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    Pause(RunoutEvent),
    Reposition(Reposition),
}

/// Pause actuator that records every call. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn pauses(&self) -> Vec<RunoutEvent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCall::Pause(e) => Some(e),
                ActuatorCall::Reposition(_) => None,
            })
            .collect()
    }

    /// Make every subsequent call record and then return an error.
    pub fn fail_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    fn record(&self, call: ActuatorCall) -> Result<(), BoxError> {
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
        if self.fail.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("printer unreachable")));
        }
        Ok(())
    }
}

impl PauseActuator for RecordingActuator {
    fn pause(&mut self, event: &RunoutEvent) -> Result<(), BoxError> {
        self.record(ActuatorCall::Pause(event.clone()))
    }

    fn reposition(&mut self, plan: &Reposition) -> Result<(), BoxError> {
        self.record(ActuatorCall::Reposition(*plan))
    }
}

/// Actuator that accepts and drops every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActuator;

impl PauseActuator for NoopActuator {
    fn pause(&mut self, _event: &RunoutEvent) -> Result<(), BoxError> {
        Ok(())
    }

    fn reposition(&mut self, _plan: &Reposition) -> Result<(), BoxError> {
        Ok(())
    }
}
