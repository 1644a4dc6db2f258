//! Type-state builder for `SensorController`.
//!
//! The builder enforces at compile time that an edge source and a pause
//! actuator are provided before `build()` is available. `try_build()` is always
//! available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use runout_traits::{Clock, EdgeSource, MonotonicClock, PauseActuator};
use tracing::{error, info};

use crate::channel::SensorChannel;
use crate::config::{EngineCfg, Evaluation, ExtrusionPolicy, RunoutPolicy};
use crate::controller::{EngineParts, SensorController};
use crate::error::{BuildError, EngineError, Result};
use crate::extrusion::ExtrusionJudge;
use crate::hw_error::map_edge_error;
use crate::judge::RunoutJudge;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct SensorControllerBuilder<E, A> {
    edges: Option<Arc<dyn EdgeSource>>,
    actuator: Option<Box<dyn PauseActuator>>,
    cfg: Option<EngineCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    watchdog_thread: bool,
    _e: PhantomData<E>,
    _a: PhantomData<A>,
}

impl Default for SensorControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            edges: None,
            actuator: None,
            cfg: None,
            clock: None,
            watchdog_thread: true,
            _e: PhantomData,
            _a: PhantomData,
        }
    }
}

impl SensorController {
    /// Start building a controller.
    pub fn builder() -> SensorControllerBuilder<Missing, Missing> {
        SensorControllerBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &EngineCfg) -> Result<()> {
    if cfg.channels.len() > 2 {
        return Err(invalid("at most two sensor channels are supported"));
    }
    match cfg.detection.policy {
        RunoutPolicy::Count {
            motor_steps,
            encoder_steps,
        } if motor_steps == 0 || encoder_steps == 0 => {
            return Err(invalid("step thresholds must be >= 1"));
        }
        RunoutPolicy::Time { stale_timeout } if stale_timeout.is_zero() => {
            return Err(invalid("stale timeout must be > 0"));
        }
        _ => {}
    }
    if let Evaluation::Polling { interval } = cfg.detection.evaluation
        && interval.is_zero()
    {
        return Err(invalid("poll interval must be > 0"));
    }
    if let Some(x) = &cfg.extruder
        && let ExtrusionPolicy::Pulse { gap } = x.policy
        && gap.is_zero()
    {
        return Err(invalid("extruder pulse gap must be > 0"));
    }
    if let Some(r) = &cfg.reposition {
        if !(r.lift_z_mm.is_finite() && r.park_x.is_finite() && r.park_y.is_finite()) {
            return Err(invalid("reposition coordinates must be finite"));
        }
        if r.lift_speed == 0 || r.park_speed == 0 {
            return Err(invalid("reposition speeds must be > 0"));
        }
    }
    Ok(())
}

/// Validate, claim every input, and assemble the engine parts.
///
/// A channel whose pins cannot be set up is excluded and reported; the rest
/// keep working.
fn validate_and_assemble(
    edges: Arc<dyn EdgeSource>,
    actuator: Box<dyn PauseActuator>,
    cfg: EngineCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<EngineParts> {
    validate(&cfg)?;

    let bounce = cfg.detection.bounce;
    let judge = RunoutJudge::new(cfg.detection.policy);
    let mut channels = Vec::with_capacity(cfg.channels.len());
    let mut failed = Vec::new();
    for (i, ch) in cfg.channels.iter().enumerate() {
        match ch
            .pins()
            .try_for_each(|pin| edges.setup_input(pin).map_err(|e| (pin, e)))
        {
            Ok(()) => channels.push(SensorChannel::new(i, *ch, judge, bounce)),
            Err((pin, e)) => {
                let reason = format!("pin {pin}: {}", map_edge_error(&*e));
                error!(sensor = i, pin, error = %e, "sensor channel disabled");
                failed.push(EngineError::ChannelInit { channel: i, reason });
            }
        }
    }
    if channels.is_empty() {
        info!("no filament sensor configured");
    }

    let extrusion = cfg.extruder.and_then(|x| match edges.setup_input(x.pin) {
        Ok(()) => Some(ExtrusionJudge::new(x, bounce)),
        Err(e) => {
            error!(pin = x.pin, error = %e, "extruder input unavailable; treating extruder as active while armed");
            None
        }
    });

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };

    Ok(EngineParts {
        clock,
        edges,
        channels,
        extrusion,
        detection: cfg.detection,
        reposition: cfg.reposition,
        failed,
        actuator,
    })
}

impl<E, A> SensorControllerBuilder<E, A> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<SensorController> {
        let edges = self
            .edges
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEdgeSource))?;
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let parts =
            validate_and_assemble(edges, actuator, self.cfg.unwrap_or_default(), self.clock)?;
        SensorController::from_parts(parts, self.watchdog_thread)
    }

    pub fn with_config(mut self, cfg: EngineCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Without the thread, triggers and poll cycles run only from `SensorController::tick`.
    pub fn with_watchdog_thread(mut self, enabled: bool) -> Self {
        self.watchdog_thread = enabled;
        self
    }
}

impl<A> SensorControllerBuilder<Missing, A> {
    pub fn with_edge_source(
        self,
        edges: impl EdgeSource + 'static,
    ) -> SensorControllerBuilder<Set, A> {
        self.with_shared_edge_source(Arc::new(edges))
    }

    pub fn with_shared_edge_source(
        self,
        edges: Arc<dyn EdgeSource>,
    ) -> SensorControllerBuilder<Set, A> {
        SensorControllerBuilder {
            edges: Some(edges),
            actuator: self.actuator,
            cfg: self.cfg,
            clock: self.clock,
            watchdog_thread: self.watchdog_thread,
            _e: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<E> SensorControllerBuilder<E, Missing> {
    pub fn with_actuator(
        self,
        actuator: impl PauseActuator + 'static,
    ) -> SensorControllerBuilder<E, Set> {
        SensorControllerBuilder {
            edges: self.edges,
            actuator: Some(Box::new(actuator)),
            cfg: self.cfg,
            clock: self.clock,
            watchdog_thread: self.watchdog_thread,
            _e: PhantomData,
            _a: PhantomData,
        }
    }
}

impl SensorControllerBuilder<Set, Set> {
    /// Validate and build. Only available once the edge source and actuator are set.
    pub fn build(self) -> Result<SensorController> {
        self.try_build()
    }
}
