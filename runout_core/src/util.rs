//! Small shared helpers.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lock `m`, recovering the data if a previous holder panicked.
///
/// Every critical section in the engine leaves its state consistent before
/// any call that could panic, so the inner value is always safe to reuse.
#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_truncates_sub_millisecond_parts() {
        assert_eq!(millis(Duration::from_micros(1_999)), 1);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
