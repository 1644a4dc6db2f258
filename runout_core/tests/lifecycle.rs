mod support;

use std::time::Duration;

use rstest::rstest;
use runout_core::mocks::ActuatorCall;
use runout_core::{
    ArmMode, EngineCfg, EngineError, Evaluation, PrintEvent, Reposition, RunState,
};
use runout_hardware::SimulatedEdgeSource;
use runout_traits::EdgeSource;
use support::{ENCODER, MOTOR, Rig, count, single};

fn engine_err(r: &eyre::Report) -> Option<&EngineError> {
    r.downcast_ref::<EngineError>()
}

#[test]
fn enable_twice_reports_already_armed_and_keeps_counters() {
    let rig = Rig::new(single(count(1000, 500), Evaluation::Edge));
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 7);
    rig.steps(ENCODER, 2);

    let err = rig.ctl.enable().expect_err("second enable");
    assert_eq!(engine_err(&err), Some(&EngineError::AlreadyArmed));
    let ch = rig.ctl.status().channels[0];
    assert_eq!((ch.motor_steps, ch.encoder_steps), (7, 2));
    assert_eq!(rig.ctl.run_state(), RunState::Armed);
}

#[test]
fn disable_is_idempotent_and_keeps_counters() {
    let rig = Rig::new(single(count(1000, 500), Evaluation::Edge));
    rig.ctl.disable();
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 3);
    rig.ctl.disable();
    rig.ctl.disable();
    assert_eq!(rig.ctl.run_state(), RunState::Disabled);
    assert_eq!(rig.edges.registrations(), 0);

    let ch = rig.ctl.status().channels[0];
    assert!(!ch.armed);
    assert_eq!(ch.motor_steps, 3);
    // edges after disarm are not counted
    rig.steps(MOTOR, 3);
    assert_eq!(rig.ctl.status().channels[0].motor_steps, 3);
}

#[test]
fn reset_zeroes_counters_without_disarming() {
    let rig = Rig::new(single(count(1000, 500), Evaluation::Edge));
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 4);
    rig.steps(ENCODER, 4);
    rig.ctl.reset();

    let st = rig.ctl.status();
    assert_eq!(st.run_state, RunState::Armed);
    for ch in &st.channels {
        assert_eq!(ch.motor_steps, 0);
        assert_eq!(ch.encoder_steps, 0);
        assert_eq!(ch.last_pulse_age, None);
    }
}

#[test]
fn next_enable_starts_from_zero() {
    let rig = Rig::new(single(count(1000, 500), Evaluation::Edge));
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 5);
    rig.ctl.disable();
    rig.ctl.enable().expect("re-arm");
    assert_eq!(rig.ctl.status().channels[0].motor_steps, 0);
}

#[test]
fn no_sensors_never_arms_or_fires() {
    let mut cfg = single(count(1, 1), Evaluation::Edge);
    cfg.channels.clear();
    let rig = Rig::new(cfg);

    rig.ctl.enable().expect("no-op enable");
    rig.ctl
        .on_print_event(PrintEvent::Started)
        .expect("no-op print start");
    let st = rig.ctl.status();
    assert!(st.no_sensors);
    assert!(st.channels.is_empty());
    assert_eq!(st.run_state, RunState::Disabled);
    assert!(rig.ctl.channel_configs().is_empty());

    rig.edges.pulse_n(MOTOR, 10);
    rig.ctl.tick();
    assert!(rig.actuator.calls().is_empty());
    assert_eq!(rig.edges.registrations(), 0);
}

#[test]
fn failed_channel_is_isolated_and_reported() {
    let edges = SimulatedEdgeSource::new();
    edges.fail_setup(26); // channel 1 DIR pin
    let mut cfg = EngineCfg::default();
    cfg.detection.policy = count(2, 1);
    let rig = Rig::with_edges(cfg, edges);

    let failed = rig.ctl.failed_channels();
    assert_eq!(failed.len(), 1);
    assert!(matches!(
        &failed[0],
        EngineError::ChannelInit { channel: 1, reason } if reason.contains("pin 26")
    ));
    let wiring = rig.ctl.channel_configs();
    assert_eq!(wiring.len(), 1);
    assert_eq!(wiring[0].sensor, 0);
    assert_eq!(wiring[0].dir_pin, Some(16));
    assert_eq!(wiring[0].direction_gate, Some(true));

    rig.ctl.enable().expect("remaining channel arms");
    rig.edges.set_level(16, true);
    rig.steps(MOTOR, 2);
    rig.ctl.tick();
    assert_eq!(rig.actuator.pauses()[0].sensor, 0);
    assert_eq!(rig.ctl.status().failed_channels.len(), 1);
}

#[test]
fn registration_failure_rolls_back() {
    let rig = Rig::new(single(count(1000, 500), Evaluation::Edge));
    let squatter = rig
        .edges
        .register_rising_edge(ENCODER, Duration::ZERO, Box::new(|| {}))
        .expect("foreign registration");

    let err = rig.ctl.enable().expect_err("encoder pin is taken");
    assert!(matches!(
        engine_err(&err),
        Some(EngineError::Register { pin: ENCODER, .. })
    ));
    assert_eq!(rig.ctl.run_state(), RunState::Disabled);
    assert!(!rig.edges.is_registered(MOTOR));
    assert!(!rig.ctl.status().channels[0].armed);

    rig.edges.unregister(squatter).expect("release");
    rig.ctl.enable().expect("arms once the pin is free");
}

#[test]
fn test_mode_counts_but_never_fires() {
    let rig = Rig::new(single(count(3, 1), Evaluation::Edge));
    rig.ctl.enable_test().expect("test mode");
    let err = rig.ctl.enable_test().expect_err("already armed");
    assert_eq!(engine_err(&err), Some(&EngineError::AlreadyArmed));

    rig.steps(MOTOR, 5);
    rig.ctl.tick();
    let st = rig.ctl.status();
    assert_eq!(st.mode, Some(ArmMode::Test));
    assert!(st.channels[0].stalled);
    assert!(rig.actuator.calls().is_empty());

    rig.ctl.disable();
    assert_eq!(rig.ctl.status().mode, None);
    rig.ctl.enable().expect("monitor");
    rig.steps(MOTOR, 3);
    rig.ctl.tick();
    assert_eq!(rig.actuator.pauses().len(), 1);
}

#[test]
fn trigger_pauses_then_repositions() {
    let mut cfg = single(count(2, 1), Evaluation::Edge);
    cfg.reposition = Some(Reposition::default());
    let rig = Rig::new(cfg);
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 2);
    rig.ctl.tick();

    let calls = rig.actuator.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], ActuatorCall::Pause(_)));
    assert_eq!(
        calls[1],
        ActuatorCall::Reposition(Reposition {
            lift_z_mm: 2.0,
            lift_speed: 1000,
            park_x: 0.0,
            park_y: 0.0,
            park_speed: 600,
        })
    );
}

#[test]
fn actuator_errors_do_not_block_disarming() {
    let mut cfg = single(count(2, 1), Evaluation::Edge);
    cfg.reposition = Some(Reposition::default());
    let rig = Rig::new(cfg);
    rig.actuator.fail_calls(true);
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 2);
    rig.ctl.tick();
    assert_eq!(rig.actuator.calls().len(), 2);
    assert_eq!(rig.ctl.run_state(), RunState::Disabled);
    rig.ctl.enable().expect("re-arm after failed pause");
}

#[test]
fn stall_after_disable_is_discarded() {
    let rig = Rig::new(single(count(2, 1), Evaluation::Edge));
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 2);
    rig.ctl.disable();
    rig.ctl.tick();
    assert!(rig.actuator.calls().is_empty());
}

#[rstest]
#[case(PrintEvent::Started, RunState::Armed)]
#[case(PrintEvent::Resumed, RunState::Armed)]
#[case(PrintEvent::Paused, RunState::Disabled)]
#[case(PrintEvent::Done, RunState::Disabled)]
#[case(PrintEvent::Failed, RunState::Disabled)]
#[case(PrintEvent::Cancelled, RunState::Disabled)]
#[case(PrintEvent::Error, RunState::Disabled)]
fn print_events_drive_the_lifecycle(#[case] event: PrintEvent, #[case] expected: RunState) {
    let rig = Rig::new(single(count(1000, 500), Evaluation::Edge));
    rig.ctl.enable().expect("arm");
    rig.steps(MOTOR, 3);
    rig.ctl.on_print_event(event).expect("print event");
    assert_eq!(rig.ctl.run_state(), expected);
    if expected == RunState::Armed {
        // re-armed from a clean slate
        assert_eq!(rig.ctl.status().channels[0].motor_steps, 0);
        assert!(rig.edges.is_registered(MOTOR));
    } else {
        assert_eq!(rig.edges.registrations(), 0);
    }
}

#[test]
fn panicking_actuator_does_not_wedge_the_engine() {
    struct Boom;
    impl runout_traits::PauseActuator for Boom {
        fn pause(&mut self, _: &runout_traits::RunoutEvent) -> Result<(), runout_traits::BoxError> {
            panic!("actuator bug");
        }
        fn reposition(&mut self, _: &Reposition) -> Result<(), runout_traits::BoxError> {
            Ok(())
        }
    }

    let edges = SimulatedEdgeSource::new();
    let clock = runout_traits::ManualClock::new();
    let ctl = runout_core::SensorController::builder()
        .with_edge_source(edges.clone())
        .with_actuator(Boom)
        .with_config(single(count(2, 1), Evaluation::Edge))
        .with_clock(Box::new(clock.clone()))
        .with_watchdog_thread(false)
        .build()
        .expect("build");
    ctl.enable().expect("arm");
    for _ in 0..2 {
        clock.advance(support::BOUNCE);
        edges.pulse(MOTOR);
    }
    ctl.tick();
    assert_eq!(ctl.run_state(), RunState::Triggered);
    ctl.enable().expect("enable recovers from an interrupted trigger");
    assert_eq!(ctl.run_state(), RunState::Armed);
}
