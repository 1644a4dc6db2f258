//! Maps `Box<dyn Error>` from trait boundaries to typed `EngineError`.
//!
//! Edge sources report failures as `Box<dyn Error + Send + Sync>`; with the
//! `hardware-errors` feature the known `runout_hardware::HwError` variants are
//! matched precisely, otherwise the message is carried as-is.

use crate::error::EngineError;

pub fn map_edge_error(e: &(dyn std::error::Error + 'static)) -> EngineError {
    #[cfg(feature = "hardware-errors")]
    {
        use runout_hardware::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::NotConfigured(pin) => {
                    EngineError::State(format!("pin {pin} was never configured"))
                }
                other => EngineError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("not configured") {
        EngineError::State(s)
    } else {
        EngineError::Hardware(s)
    }
}
