//! SensorController: owns the channels, the extrusion judge and the watchdog,
//! and holds the armed/disarmed lifecycle.
//!
//! Three contexts touch the engine concurrently:
//! - edge callbacks (interrupt threads on hardware) lock one channel at a time
//!   and never take the control lock;
//! - the watchdog thread evaluates poll cycles and delivers triggers;
//! - control calls (`enable`, `disable`, `reset`) serialize on the control lock.
//!
//! Lock order is control, then actuator, then channel or extrusion state.
//! Every judgement carries the armed period its counters were read in. A
//! trigger from an older period is dropped, and a per-period latch lets only
//! the first stall of the current period through, so an edge-driven and a
//! polling stall in the same armed period pause once.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use runout_traits::{
    Clock, Detection, EdgeCallback, EdgeSource, PauseActuator, PrintEvent, Reposition,
    RunoutEvent, Subscription,
};
use tracing::{debug, error, info, trace, warn};

use crate::channel::{PeriodJudgement, SensorChannel};
use crate::config::{DetectionCfg, Evaluation, ExtrusionPolicy};
use crate::error::{EngineError, Result};
use crate::extrusion::ExtrusionJudge;
use crate::hw_error::map_edge_error;
use crate::status::{ArmMode, ChannelWiring, EngineStatus, ExtrusionStatus, RunState};
use crate::util::{lock, millis};
use crate::watchdog::{Request, Watchdog, guarded};

struct Control {
    state: RunState,
    mode: ArmMode,
    subscriptions: Vec<Subscription>,
    last_runout: Option<RunoutEvent>,
}

pub(crate) struct Engine {
    clock: Arc<dyn Clock + Send + Sync>,
    edges: Arc<dyn EdgeSource>,
    channels: Vec<SensorChannel>,
    extrusion: Option<ExtrusionJudge>,
    detection: DetectionCfg,
    reposition: Option<Reposition>,
    failed: Vec<EngineError>,
    control: Mutex<Control>,
    actuator: Mutex<Box<dyn PauseActuator>>,
    /// Latest armed period that already raised a trigger.
    fired_gen: AtomicU64,
    /// Test mode: stalls are observed but never raised.
    suppress: AtomicBool,
    /// Current armed period; channels are stamped with it when armed.
    generation: AtomicU64,
    tx: xch::Sender<Request>,
}

/// Construction-time parts handed over by the builder.
pub(crate) struct EngineParts {
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub edges: Arc<dyn EdgeSource>,
    pub channels: Vec<SensorChannel>,
    pub extrusion: Option<ExtrusionJudge>,
    pub detection: DetectionCfg,
    pub reposition: Option<Reposition>,
    pub failed: Vec<EngineError>,
    pub actuator: Box<dyn PauseActuator>,
}

impl Engine {
    pub(crate) fn new(parts: EngineParts, tx: xch::Sender<Request>) -> Self {
        Self {
            clock: parts.clock,
            edges: parts.edges,
            channels: parts.channels,
            extrusion: parts.extrusion,
            detection: parts.detection,
            reposition: parts.reposition,
            failed: parts.failed,
            control: Mutex::new(Control {
                state: RunState::Disabled,
                mode: ArmMode::Monitor,
                subscriptions: Vec::new(),
                last_runout: None,
            }),
            actuator: Mutex::new(parts.actuator),
            fired_gen: AtomicU64::new(0),
            suppress: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            tx,
        }
    }

    pub(crate) fn sender(&self) -> xch::Sender<Request> {
        self.tx.clone()
    }

    pub(crate) fn poll_interval(&self) -> Option<Duration> {
        self.detection.evaluation.poll_interval()
    }

    // ── Edge handlers (interrupt context) ───────────────────────────────────

    fn on_motor_edge(&self, pos: usize) {
        let Some(ch) = self.channels.get(pos) else {
            return;
        };
        let direction_ok = ch.direction_ok(self.edges.as_ref());
        let now = self.clock.now();
        let Some(j) = ch.on_motor_edge(now, direction_ok) else {
            return;
        };
        if j.judgement.stalled && self.detection.evaluation == Evaluation::Edge {
            self.raise(ch.index(), &j, Detection::Edge);
        }
    }

    fn on_encoder_edge(&self, pos: usize) {
        if let Some(ch) = self.channels.get(pos) {
            ch.on_encoder_edge(self.clock.now());
        }
    }

    fn on_extruder_edge(&self) {
        if let Some(x) = &self.extrusion {
            x.on_edge(self.clock.now());
        }
    }

    /// Win the latch for `pj`'s armed period and hand the trigger to the
    /// watchdog. Never blocks.
    fn raise(&self, sensor: usize, pj: &PeriodJudgement, detected_by: Detection) {
        if self.suppress.load(Ordering::Acquire) {
            trace!(sensor, "stall observed in test mode");
            return;
        }
        let generation = pj.generation;
        if generation != self.generation.load(Ordering::Acquire) {
            debug!(sensor, generation, "stall from a previous armed period ignored");
            return;
        }
        let mut fired = self.fired_gen.load(Ordering::Acquire);
        loop {
            if fired >= generation {
                return;
            }
            match self.fired_gen.compare_exchange_weak(
                fired,
                generation,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(cur) => fired = cur,
            }
        }
        let j = &pj.judgement;
        warn!(
            sensor,
            motor_steps = j.motor_steps,
            encoder_steps = j.encoder_steps,
            stale_ms = j.stale_for.map(millis),
            ?detected_by,
            "filament runout detected"
        );
        let event = RunoutEvent {
            sensor,
            motor_steps: j.motor_steps,
            encoder_steps: j.encoder_steps,
            stale_for: j.stale_for,
            detected_by,
        };
        if self.tx.send(Request::Trigger { generation, event }).is_err() {
            error!(sensor, "watchdog is gone; runout could not be delivered");
        }
    }

    // ── Watchdog side ───────────────────────────────────────────────────────

    /// Pause the print for `event` if it belongs to the current armed period.
    pub(crate) fn deliver(&self, generation: u64, event: &RunoutEvent) -> bool {
        let mut ctl = lock(&self.control);
        if ctl.state != RunState::Armed
            || ctl.mode != ArmMode::Monitor
            || self.generation.load(Ordering::Acquire) != generation
        {
            debug!(generation, "stale runout trigger discarded");
            return false;
        }
        ctl.state = RunState::Triggered;
        ctl.last_runout = Some(event.clone());
        {
            let mut actuator = lock(&self.actuator);
            if let Err(e) = actuator.pause(event) {
                error!(sensor = event.sensor, error = %e, "pause request failed");
            }
            if let Some(plan) = &self.reposition
                && let Err(e) = actuator.reposition(plan)
            {
                warn!(error = %e, "reposition request failed");
            }
        }
        self.teardown(&mut ctl);
        info!(sensor = event.sensor, "runout monitoring disarmed after trigger");
        true
    }

    /// One polling evaluation, with failures and panics contained.
    pub(crate) fn watchdog_cycle(&self) {
        if self.poll_interval().is_none() {
            return;
        }
        guarded("poll cycle", || {
            if let Err(e) = self.poll_cycle() {
                warn!(error = %e, "watchdog cycle failed; continuing");
            }
        });
    }

    fn poll_cycle(&self) -> std::result::Result<(), EngineError> {
        if lock(&self.control).state != RunState::Armed {
            trace!("watchdog idle: not armed");
            return Ok(());
        }
        let now = self.clock.now();
        if !self.extruding(now)? {
            trace!("watchdog: extruder idle");
            return Ok(());
        }
        for ch in &self.channels {
            let pj = ch.judge(now);
            trace!(
                sensor = ch.index(),
                generation = pj.generation,
                motor_steps = pj.judgement.motor_steps,
                encoder_steps = pj.judgement.encoder_steps,
                stalled = pj.judgement.stalled,
                "watchdog evaluation"
            );
            if pj.judgement.stalled {
                self.raise(ch.index(), &pj, Detection::Poll);
                break;
            }
        }
        Ok(())
    }

    fn extruding(&self, now: Instant) -> std::result::Result<bool, EngineError> {
        let Some(x) = &self.extrusion else {
            return Ok(true);
        };
        let level = match x.cfg().policy {
            ExtrusionPolicy::Level => self
                .edges
                .read_level(x.cfg().pin)
                .map_err(|e| map_edge_error(&*e))?,
            ExtrusionPolicy::Pulse { .. } => false,
        };
        Ok(x.is_extruding(now, level))
    }

    // ── Control side ────────────────────────────────────────────────────────

    fn enable(self: &Arc<Self>, mode: ArmMode) -> std::result::Result<(), EngineError> {
        let mut ctl = lock(&self.control);
        match ctl.state {
            RunState::Armed => {
                info!(state = ctl.state.as_str(), "enable ignored: already armed");
                return Err(EngineError::AlreadyArmed);
            }
            RunState::Triggered => self.teardown(&mut ctl),
            RunState::Disabled => {}
        }
        if self.channels.is_empty() {
            info!("no filament sensor configured; monitoring stays off");
            return Ok(());
        }

        let now = self.clock.now();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.suppress.store(mode == ArmMode::Test, Ordering::Release);
        for ch in &self.channels {
            ch.arm(now, generation);
        }
        if let Some(x) = &self.extrusion {
            let level = self.edges.read_level(x.cfg().pin).unwrap_or_else(|e| {
                warn!(pin = x.cfg().pin, error = %e, "extruder level unreadable at arming");
                false
            });
            x.arm(now, level);
        }

        let mut subs = Vec::with_capacity(self.channels.len() * 2 + 1);
        if let Err(e) = self.register_all(&Arc::downgrade(self), &mut subs) {
            for sub in subs {
                self.unregister_quiet(sub);
            }
            for ch in &self.channels {
                ch.disarm();
            }
            self.suppress.store(false, Ordering::Release);
            error!(error = %e, "arming failed; registrations rolled back");
            return Err(e);
        }

        ctl.subscriptions = subs;
        ctl.state = RunState::Armed;
        ctl.mode = mode;
        ctl.last_runout = None;
        info!(
            channels = self.channels.len(),
            ?mode,
            policy = ?self.detection.policy,
            evaluation = ?self.detection.evaluation,
            "runout monitoring armed"
        );
        Ok(())
    }

    fn register_all(
        &self,
        weak: &Weak<Self>,
        subs: &mut Vec<Subscription>,
    ) -> std::result::Result<(), EngineError> {
        for (pos, ch) in self.channels.iter().enumerate() {
            let cfg = ch.cfg();
            subs.push(self.register(
                cfg.motor_step_pin,
                callback(weak, move |e| e.on_motor_edge(pos)),
            )?);
            subs.push(self.register(
                cfg.encoder_pin,
                callback(weak, move |e| e.on_encoder_edge(pos)),
            )?);
        }
        if let Some(x) = &self.extrusion {
            subs.push(self.register(x.cfg().pin, callback(weak, Self::on_extruder_edge))?);
        }
        Ok(())
    }

    fn register(
        &self,
        pin: u8,
        cb: EdgeCallback,
    ) -> std::result::Result<Subscription, EngineError> {
        let sub = self
            .edges
            .register_rising_edge(pin, self.detection.bounce, cb)
            .map_err(|e| EngineError::Register {
                pin,
                reason: map_edge_error(&*e).to_string(),
            })?;
        trace!(pin, id = sub.id, "edge detection registered");
        Ok(sub)
    }

    fn unregister_quiet(&self, sub: Subscription) {
        if let Err(e) = self.edges.unregister(sub) {
            debug!(pin = sub.pin, error = %e, "ignoring failed unregister");
        }
    }

    fn teardown(&self, ctl: &mut Control) {
        for sub in std::mem::take(&mut ctl.subscriptions) {
            self.unregister_quiet(sub);
        }
        for ch in &self.channels {
            ch.disarm();
        }
        self.suppress.store(false, Ordering::Release);
        ctl.state = RunState::Disabled;
    }

    fn disable(&self) {
        let mut ctl = lock(&self.control);
        if ctl.state == RunState::Disabled {
            debug!("disable ignored: not armed");
            return;
        }
        self.teardown(&mut ctl);
        info!("runout monitoring disarmed");
    }

    fn reset(&self) {
        let _ctl = lock(&self.control);
        let now = self.clock.now();
        for ch in &self.channels {
            ch.reset(now);
        }
        debug!("channel counters reset");
    }

    fn status(&self) -> EngineStatus {
        let (run_state, mode, last_runout) = {
            let ctl = lock(&self.control);
            let mode = (ctl.state == RunState::Armed).then_some(ctl.mode);
            (ctl.state, mode, ctl.last_runout.clone())
        };
        let now = self.clock.now();
        let extrusion = match &self.extrusion {
            Some(x) => {
                let level = match x.cfg().policy {
                    ExtrusionPolicy::Level => self.edges.read_level(x.cfg().pin).unwrap_or(false),
                    ExtrusionPolicy::Pulse { .. } => false,
                };
                let snap = x.snapshot(now, level);
                ExtrusionStatus {
                    configured: true,
                    is_extruding: snap.is_extruding,
                    last_extrude_age: snap.last_extrude_age,
                }
            }
            None => ExtrusionStatus {
                configured: false,
                is_extruding: run_state == RunState::Armed,
                last_extrude_age: None,
            },
        };
        EngineStatus {
            run_state,
            mode,
            no_sensors: self.channels.is_empty(),
            channels: self.channels.iter().map(|c| c.status(now)).collect(),
            extrusion,
            failed_channels: self.failed.clone(),
            last_runout,
        }
    }
}

fn callback(weak: &Weak<Engine>, f: impl Fn(&Engine) + Send + Sync + 'static) -> EdgeCallback {
    let weak = weak.clone();
    Box::new(move || {
        if let Some(engine) = weak.upgrade() {
            f(&engine);
        }
    })
}

/// The runout engine. Build with [`SensorController::builder`].
pub struct SensorController {
    engine: Arc<Engine>,
    /// Present when no watchdog thread runs; `tick` drains it.
    rx: Option<xch::Receiver<Request>>,
    watchdog: Option<Watchdog>,
}

impl core::fmt::Debug for SensorController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SensorController")
            .field("channels", &self.engine.channels.len())
            .field("detection", &self.engine.detection)
            .field("watchdog_thread", &self.watchdog.is_some())
            .finish_non_exhaustive()
    }
}

impl SensorController {
    pub(crate) fn from_parts(parts: EngineParts, watchdog_thread: bool) -> Result<Self> {
        let (tx, rx) = xch::unbounded();
        let engine = Arc::new(Engine::new(parts, tx));
        if !watchdog_thread {
            return Ok(Self {
                engine,
                rx: Some(rx),
                watchdog: None,
            });
        }
        let watchdog = Watchdog::spawn(engine.clone(), rx).map_err(|e| {
            eyre::Report::new(crate::error::BuildError::WatchdogSpawn(e.to_string()))
        })?;
        Ok(Self {
            engine,
            rx: None,
            watchdog: Some(watchdog),
        })
    }

    /// Arm monitoring. Fails with `EngineError::AlreadyArmed` while armed, or
    /// `EngineError::Register` if an edge source refused a pin (nothing stays registered).
    /// With no usable channel this is a no-op.
    pub fn enable(&self) -> Result<()> {
        self.engine
            .enable(ArmMode::Monitor)
            .map_err(eyre::Report::new)
    }

    /// Arm counting with the trigger suppressed, for threshold calibration.
    pub fn enable_test(&self) -> Result<()> {
        self.engine.enable(ArmMode::Test).map_err(eyre::Report::new)?;
        info!("runout test mode: counting without triggering");
        Ok(())
    }

    /// Disarm. Safe to call in any state.
    pub fn disable(&self) {
        self.engine.disable();
    }

    /// Zero every channel's counters without changing the run state.
    pub fn reset(&self) {
        self.engine.reset();
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.engine.control).state
    }

    pub fn status(&self) -> EngineStatus {
        self.engine.status()
    }

    /// Channels excluded at construction, as `EngineError::ChannelInit`.
    pub fn failed_channels(&self) -> &[EngineError] {
        &self.engine.failed
    }

    pub fn channel_configs(&self) -> Vec<ChannelWiring> {
        self.engine
            .channels
            .iter()
            .map(|ch| {
                let cfg = ch.cfg();
                ChannelWiring {
                    sensor: ch.index(),
                    motor_step_pin: cfg.motor_step_pin,
                    dir_pin: cfg.dir_pin,
                    encoder_pin: cfg.encoder_pin,
                    direction_gate: cfg.direction_gate,
                }
            })
            .collect()
    }

    /// Follow the print state: Started/Resumed re-arm, anything else disarms.
    pub fn on_print_event(&self, event: PrintEvent) -> Result<()> {
        debug!(?event, "print event");
        self.disable();
        if !event.arms() {
            return Ok(());
        }
        match self.engine.enable(ArmMode::Monitor) {
            Ok(()) => Ok(()),
            Err(EngineError::AlreadyArmed) => {
                info!(?event, "monitoring already active");
                Ok(())
            }
            Err(e) => Err(eyre::Report::new(e)),
        }
    }

    /// Run one watchdog cycle on the caller's thread.
    ///
    /// Without a watchdog thread this also delivers pending triggers, before
    /// and after the poll evaluation. With one, only the evaluation runs here.
    pub fn tick(&self) {
        self.deliver_pending();
        self.engine.watchdog_cycle();
        self.deliver_pending();
    }

    /// Deliver triggers raised since the last call, without an evaluation cycle.
    /// A no-op when a watchdog thread owns delivery.
    pub fn deliver_pending(&self) {
        let Some(rx) = &self.rx else {
            return;
        };
        for req in rx.try_iter() {
            if let Request::Trigger { generation, event } = req {
                guarded("trigger", || {
                    self.engine.deliver(generation, &event);
                });
            }
        }
    }

    pub fn has_watchdog_thread(&self) -> bool {
        self.watchdog.is_some()
    }
}

impl Drop for SensorController {
    fn drop(&mut self) {
        // unregister callbacks before the watchdog field is joined
        self.engine.disable();
    }
}
