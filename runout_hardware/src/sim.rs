//! In-memory edge source for tests, demos and the `simulate` command.
//!
//! Edges are delivered synchronously on the caller's thread via [`SimulatedEdgeSource::pulse`].
//! The internal lock is released before a callback runs, so callbacks may call
//! back into `read_level` freely.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use runout_traits::{BoxError, EdgeCallback, EdgeSource, Subscription};

use crate::error::{HwError, Result};

type SharedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SimState {
    inputs: HashSet<u8>,
    failing_setup: HashSet<u8>,
    failing_reads: HashSet<u8>,
    levels: HashMap<u8, bool>,
    subs: HashMap<u8, (u64, SharedCallback)>,
    next_id: u64,
    delivered: u64,
}

/// Simulated GPIO bank. Clones share state, so a test can keep a handle while
/// the engine owns another.
#[derive(Clone, Default)]
pub struct SimulatedEdgeSource {
    inner: Arc<Mutex<SimState>>,
}

impl std::fmt::Debug for SimulatedEdgeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("SimulatedEdgeSource");
        if let Ok(st) = self.inner.lock() {
            d.field("inputs", &st.inputs.len())
                .field("subscriptions", &st.subs.len())
                .field("delivered", &st.delivered);
        }
        d.finish()
    }
}

impl SimulatedEdgeSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>> {
        self.inner
            .lock()
            .map_err(|_| HwError::Gpio("simulated gpio state poisoned".into()))
    }

    /// Deliver one rising edge on `pin`. Returns false when nothing is registered.
    pub fn pulse(&self, pin: u8) -> bool {
        let cb = match self.state() {
            Ok(mut st) => {
                let cb = st.subs.get(&pin).map(|(_, cb)| cb.clone());
                if cb.is_some() {
                    st.delivered = st.delivered.saturating_add(1);
                }
                cb
            }
            Err(_) => None,
        };
        match cb {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }

    /// Deliver `n` rising edges on `pin`, returning how many reached a callback.
    pub fn pulse_n(&self, pin: u8, n: usize) -> usize {
        (0..n).filter(|_| self.pulse(pin)).count()
    }

    pub fn set_level(&self, pin: u8, high: bool) {
        if let Ok(mut st) = self.state() {
            st.levels.insert(pin, high);
        }
    }

    /// Make `setup_input(pin)` fail, as a missing or busy GPIO line would.
    pub fn fail_setup(&self, pin: u8) {
        if let Ok(mut st) = self.state() {
            st.failing_setup.insert(pin);
        }
    }

    /// Make `read_level(pin)` fail until cleared.
    pub fn fail_reads(&self, pin: u8, failing: bool) {
        if let Ok(mut st) = self.state() {
            if failing {
                st.failing_reads.insert(pin);
            } else {
                st.failing_reads.remove(&pin);
            }
        }
    }

    pub fn is_registered(&self, pin: u8) -> bool {
        self.state().map(|st| st.subs.contains_key(&pin)).unwrap_or(false)
    }

    /// Number of live edge subscriptions.
    pub fn registrations(&self) -> usize {
        self.state().map(|st| st.subs.len()).unwrap_or(0)
    }

    /// Total edges delivered to callbacks since construction.
    pub fn delivered(&self) -> u64 {
        self.state().map(|st| st.delivered).unwrap_or(0)
    }
}

impl EdgeSource for SimulatedEdgeSource {
    fn setup_input(&self, pin: u8) -> std::result::Result<(), BoxError> {
        let mut st = self.state()?;
        if st.failing_setup.contains(&pin) {
            return Err(Box::new(HwError::Gpio(format!("cannot claim pin {pin}"))));
        }
        st.inputs.insert(pin);
        st.levels.entry(pin).or_insert(false);
        Ok(())
    }

    fn register_rising_edge(
        &self,
        pin: u8,
        _debounce_hint: Duration,
        callback: EdgeCallback,
    ) -> std::result::Result<Subscription, BoxError> {
        let mut st = self.state()?;
        if !st.inputs.contains(&pin) {
            return Err(Box::new(HwError::NotConfigured(pin)));
        }
        if st.subs.contains_key(&pin) {
            return Err(Box::new(HwError::AlreadyRegistered(pin)));
        }
        st.next_id = st.next_id.wrapping_add(1);
        let id = st.next_id;
        st.subs.insert(pin, (id, Arc::from(callback)));
        tracing::trace!(pin, id, "simulated edge detection registered");
        Ok(Subscription { pin, id })
    }

    fn unregister(&self, subscription: Subscription) -> std::result::Result<(), BoxError> {
        let mut st = self.state()?;
        match st.subs.get(&subscription.pin) {
            Some((id, _)) if *id == subscription.id => {
                st.subs.remove(&subscription.pin);
                Ok(())
            }
            _ => Err(Box::new(HwError::NotRegistered {
                pin: subscription.pin,
                id: subscription.id,
            })),
        }
    }

    fn read_level(&self, pin: u8) -> std::result::Result<bool, BoxError> {
        let st = self.state()?;
        if !st.inputs.contains(&pin) {
            return Err(Box::new(HwError::NotConfigured(pin)));
        }
        if st.failing_reads.contains(&pin) {
            return Err(Box::new(HwError::Gpio(format!("read failed on pin {pin}"))));
        }
        Ok(st.levels.get(&pin).copied().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pulse_reaches_registered_callback_only() {
        let src = SimulatedEdgeSource::new();
        src.setup_input(5).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = src
            .register_rising_edge(
                5,
                Duration::ZERO,
                Box::new(move || {
                    h.fetch_add(1, Ordering::Relaxed);
                }),
            )
            .unwrap();
        assert!(src.pulse(5));
        assert!(!src.pulse(6));
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        src.unregister(sub).unwrap();
        assert!(!src.pulse(5));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn callback_may_read_levels_reentrantly() {
        let src = SimulatedEdgeSource::new();
        src.setup_input(13).unwrap();
        src.setup_input(16).unwrap();
        src.set_level(16, true);
        let seen = Arc::new(AtomicUsize::new(0));
        let (s, inner) = (seen.clone(), src.clone());
        src.register_rising_edge(
            13,
            Duration::ZERO,
            Box::new(move || {
                if inner.read_level(16).unwrap_or(false) {
                    s.fetch_add(1, Ordering::Relaxed);
                }
            }),
        )
        .unwrap();
        assert_eq!(src.pulse_n(13, 3), 3);
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }
}
