//! Hardware assembly: config -> edge source + actuator -> controller.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runout_core::{EngineCfg, SensorController};
use runout_hardware::SimulatedEdgeSource;
use runout_traits::ManualClock;
use tracing::{debug, info};

use crate::actuator::JsonLinesActuator;

/// Scripted time and edges for the simulated backend.
///
/// The clock only moves through [`SimBench::advance`], which also runs every
/// poll cycle whose deadline it crosses.
pub struct SimBench {
    edges: SimulatedEdgeSource,
    clock: ManualClock,
    spacing: Duration,
    poll: Option<Duration>,
    since_poll: Duration,
}

impl SimBench {
    pub fn edges(&self) -> &SimulatedEdgeSource {
        &self.edges
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn advance(&mut self, ctl: &SensorController, d: Duration) {
        let mut remaining = d;
        if let Some(period) = self.poll {
            while self.since_poll + remaining >= period {
                let step = period - self.since_poll;
                self.clock.advance(step);
                remaining -= step;
                self.since_poll = Duration::ZERO;
                ctl.tick();
            }
        }
        self.clock.advance(remaining);
        self.since_poll += remaining;
        ctl.deliver_pending();
    }

    /// Deliver `n` edges on `pin`, each one bounce window after the previous.
    /// Returns how many reached a registered callback.
    pub fn pulse(&mut self, ctl: &SensorController, pin: u8, n: u64) -> u64 {
        let mut delivered = 0;
        for _ in 0..n {
            self.advance(ctl, self.spacing);
            if self.edges.pulse(pin) {
                delivered += 1;
            }
        }
        ctl.deliver_pending();
        delivered
    }
}

pub struct Session {
    pub ctl: SensorController,
    /// Present with the simulated backend.
    pub sim: Option<SimBench>,
}

/// Build a controller for `cfg`, publishing runout lines to `out`.
pub fn build<W: Write + Send + 'static>(
    cfg: &runout_config::Config,
    force_sim: bool,
    out: Arc<Mutex<W>>,
) -> eyre::Result<Session> {
    let engine_cfg = EngineCfg::from(cfg);

    if !force_sim && let Some(session) = gpio_session(&engine_cfg, &out)? {
        return Ok(session);
    }

    let edges = SimulatedEdgeSource::new();
    let clock = ManualClock::new();
    // a zero bounce window still needs edges at distinct instants
    let spacing = engine_cfg.detection.bounce.max(Duration::from_millis(1));
    let poll = engine_cfg.detection.evaluation.poll_interval();
    let ctl = SensorController::builder()
        .with_edge_source(edges.clone())
        .with_actuator(JsonLinesActuator::new(out))
        .with_config(engine_cfg)
        .with_clock(Box::new(clock.clone()))
        .with_watchdog_thread(false)
        .build()?;

    // steps count by default: hold each DIR line at its forward level
    for w in ctl.channel_configs() {
        if let (Some(pin), Some(level)) = (w.dir_pin, w.direction_gate) {
            edges.set_level(pin, level);
        }
    }
    info!(channels = ctl.channel_configs().len(), "simulated edge source ready");
    Ok(Session {
        ctl,
        sim: Some(SimBench {
            edges,
            clock,
            spacing,
            poll,
            since_poll: Duration::ZERO,
        }),
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn gpio_session<W: Write + Send + 'static>(
    cfg: &EngineCfg,
    out: &Arc<Mutex<W>>,
) -> eyre::Result<Option<Session>> {
    use eyre::WrapErr;

    let edges = runout_hardware::GpioEdgeSource::new().wrap_err("open GPIO")?;
    let ctl = SensorController::builder()
        .with_edge_source(edges)
        .with_actuator(JsonLinesActuator::new(out.clone()))
        .with_config(cfg.clone())
        .build()?;
    for failed in ctl.failed_channels() {
        tracing::warn!(error = %failed, "sensor channel unavailable");
    }
    debug!("GPIO edge source ready");
    Ok(Some(Session { ctl, sim: None }))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn gpio_session<W: Write + Send + 'static>(
    _cfg: &EngineCfg,
    _out: &Arc<Mutex<W>>,
) -> eyre::Result<Option<Session>> {
    debug!("built without GPIO support; using the simulated edge source");
    Ok(None)
}
