//! Background watchdog thread.
//!
//! The thread owns trigger delivery for the whole engine: edge callbacks only
//! win the single-fire latch and post a request here, so the pause actuator and
//! edge-source unregistration never run inside an interrupt callback. In polling
//! mode it also runs one evaluation cycle per period.
//!
//! Each `Watchdog` spawns exactly one thread, which is shut down and joined
//! when the `Watchdog` is dropped.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{self as xch, RecvTimeoutError};
use runout_traits::RunoutEvent;

use crate::controller::Engine;

#[derive(Debug)]
pub(crate) enum Request {
    Trigger { generation: u64, event: RunoutEvent },
    Shutdown,
}

/// Run `f`, logging instead of unwinding if it panics.
pub(crate) fn guarded(what: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(what, "watchdog task panicked; continuing");
    }
}

pub(crate) struct Watchdog {
    tx: xch::Sender<Request>,
    join_handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn spawn(engine: Arc<Engine>, rx: xch::Receiver<Request>) -> std::io::Result<Self> {
        let tx = engine.sender();
        let join_handle = std::thread::Builder::new()
            .name("runout-watchdog".into())
            .spawn(move || run(&engine, &rx))?;
        Ok(Self {
            tx,
            join_handle: Some(join_handle),
        })
    }
}

fn run(engine: &Engine, rx: &xch::Receiver<Request>) {
    let period = engine.poll_interval();
    let mut next = period.map(|p| Instant::now() + p);
    loop {
        let msg = match next {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(Request::Trigger { generation, event }) => {
                guarded("trigger", || {
                    engine.deliver(generation, &event);
                });
            }
            Ok(Request::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                engine.watchdog_cycle();
                if let (Some(p), Some(deadline)) = (period, next.as_mut()) {
                    *deadline += p;
                    let now = Instant::now();
                    // a slow cycle skips missed periods instead of bursting
                    if *deadline <= now {
                        *deadline = now + p;
                    }
                }
            }
        }
    }
    tracing::trace!("watchdog thread exiting cleanly");
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("watchdog thread joined"),
                Err(e) => tracing::warn!(?e, "watchdog thread panicked during shutdown"),
            }
        }
    }
}
