use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("pin {0} is not configured as an input")]
    NotConfigured(u8),
    #[error("pin {0} already has edge detection registered")]
    AlreadyRegistered(u8),
    #[error("no edge subscription {id} on pin {pin}")]
    NotRegistered { pin: u8, id: u64 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
