pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

/// Error type carried across every trait boundary in this workspace.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked once per delivered rising edge.
///
/// Runs in the edge source's notification context (an interrupt thread on
/// real hardware), so implementations must return promptly.
pub type EdgeCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Handle returned by [`EdgeSource::register_rising_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub pin: u8,
    pub id: u64,
}

/// Digital inputs that can report rising edges and their current level.
///
/// An implementation delivers at most one notification per physical edge and
/// must tolerate registration and unregistration at arbitrary times.
pub trait EdgeSource: Send + Sync {
    /// Configure `pin` as a pulled-down input. Called once per pin at construction.
    fn setup_input(&self, pin: u8) -> Result<(), BoxError>;

    fn register_rising_edge(
        &self,
        pin: u8,
        debounce_hint: Duration,
        callback: EdgeCallback,
    ) -> Result<Subscription, BoxError>;

    fn unregister(&self, subscription: Subscription) -> Result<(), BoxError>;

    fn read_level(&self, pin: u8) -> Result<bool, BoxError>;
}

/// Which evaluation path observed the stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Edge,
    Poll,
}

/// Payload handed to the pause actuator when runout is detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunoutEvent {
    /// Index of the sensor channel that stalled.
    pub sensor: usize,
    pub motor_steps: u64,
    pub encoder_steps: u64,
    /// Time since the last encoder pulse (or since arming, if none was seen).
    pub stale_for: Option<Duration>,
    pub detected_by: Detection,
}

/// Head move requested after a runout pause: a relative Z lift followed by an
/// absolute XY park.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reposition {
    pub lift_z_mm: f32,
    pub lift_speed: u32,
    pub park_x: f32,
    pub park_y: f32,
    pub park_speed: u32,
}

impl Default for Reposition {
    fn default() -> Self {
        Self {
            lift_z_mm: 2.0,
            lift_speed: 1000,
            park_x: 0.0,
            park_y: 0.0,
            park_speed: 600,
        }
    }
}

/// The print controller side of a runout trigger. Calls are fire-and-forget.
pub trait PauseActuator: Send {
    fn pause(&mut self, event: &RunoutEvent) -> Result<(), BoxError>;
    fn reposition(&mut self, plan: &Reposition) -> Result<(), BoxError>;
}

/// Discrete print-state transitions delivered by the hosting print server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintEvent {
    Started,
    Resumed,
    Paused,
    Done,
    Failed,
    Cancelled,
    Error,
}

impl PrintEvent {
    /// Whether this transition should arm the runout engine.
    #[inline]
    pub fn arms(self) -> bool {
        matches!(self, PrintEvent::Started | PrintEvent::Resumed)
    }
}
