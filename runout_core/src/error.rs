use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("runout monitoring is already active")]
    AlreadyArmed,
    #[error("sensor {channel} failed to initialise: {reason}")]
    ChannelInit { channel: usize, reason: String },
    #[error("could not register edge detection on pin {pin}: {reason}")]
    Register { pin: u8, reason: String },
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing edge source")]
    MissingEdgeSource,
    #[error("missing pause actuator")]
    MissingActuator,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("failed to start watchdog thread: {0}")]
    WatchdogSpawn(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
