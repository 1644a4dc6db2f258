//! Raspberry Pi GPIO backend (rppal).
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, Trigger};
use runout_traits::{BoxError, EdgeCallback, EdgeSource, Subscription};
use tracing::{debug, trace};

use crate::error::{HwError, Result};

/// GPIO inputs claimed through rppal.
///
/// Each pin sits behind its own lock; the map lock is only held to look a pin
/// up. Clearing an interrupt joins its thread while holding that pin's lock, so
/// `read_level` on the same pin waits for the clear instead of failing. An
/// edge callback must therefore not read the level of its own pin.
pub struct GpioEdgeSource {
    gpio: Gpio,
    pins: Mutex<HashMap<u8, SharedPin>>,
    subs: Mutex<HashMap<u8, u64>>,
    next_id: AtomicU64,
}

type SharedPin = Arc<Mutex<InputPin>>;

fn lock_pin(pin: &SharedPin) -> MutexGuard<'_, InputPin> {
    pin.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl GpioEdgeSource {
    pub fn new() -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        Ok(Self {
            gpio,
            pins: Mutex::new(HashMap::new()),
            subs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    fn pins(&self) -> MutexGuard<'_, HashMap<u8, SharedPin>> {
        self.pins
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn pin(&self, pin: u8) -> Result<SharedPin> {
        self.pins()
            .get(&pin)
            .cloned()
            .ok_or(HwError::NotConfigured(pin))
    }

    fn subs(&self) -> MutexGuard<'_, HashMap<u8, u64>> {
        self.subs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl EdgeSource for GpioEdgeSource {
    fn setup_input(&self, pin: u8) -> std::result::Result<(), BoxError> {
        let input = self
            .gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
            .into_input_pulldown();
        self.pins().insert(pin, Arc::new(Mutex::new(input)));
        debug!(pin, "gpio input configured (pull-down)");
        Ok(())
    }

    // rppal 0.17 has no kernel debounce; the engine filters edges itself.
    fn register_rising_edge(
        &self,
        pin: u8,
        _debounce_hint: Duration,
        callback: EdgeCallback,
    ) -> std::result::Result<Subscription, BoxError> {
        let mut subs = self.subs();
        if subs.contains_key(&pin) {
            return Err(Box::new(HwError::AlreadyRegistered(pin)));
        }
        let input = self.pin(pin)?;
        lock_pin(&input)
            .set_async_interrupt(Trigger::RisingEdge, move |_level| callback())
            .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        subs.insert(pin, id);
        trace!(pin, id, "edge detection registered");
        Ok(Subscription { pin, id })
    }

    fn unregister(&self, subscription: Subscription) -> std::result::Result<(), BoxError> {
        let Subscription { pin, id } = subscription;
        {
            let mut subs = self.subs();
            if subs.get(&pin) != Some(&id) {
                return Err(Box::new(HwError::NotRegistered { pin, id }));
            }
            subs.remove(&pin);
        }
        // Clearing joins the interrupt thread, whose callback may be blocked in
        // read_level on another pin; only this pin's lock is held across it.
        let input = self.pin(pin)?;
        lock_pin(&input)
            .clear_async_interrupt()
            .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?;
        trace!(pin, id, "edge detection cleared");
        Ok(())
    }

    fn read_level(&self, pin: u8) -> std::result::Result<bool, BoxError> {
        let input = self.pin(pin)?;
        let high = lock_pin(&input).is_high();
        Ok(high)
    }
}
