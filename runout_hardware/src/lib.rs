//! Edge sources for the runout engine: an in-memory simulator and, behind the
//! `hardware` feature, Raspberry Pi GPIO via rppal.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use error::HwError;
pub use sim::SimulatedEdgeSource;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::GpioEdgeSource;
