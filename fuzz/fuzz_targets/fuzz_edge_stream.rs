#![no_main]
use std::time::{Duration, Instant};

use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;
use runout_core::{EdgeOutcome, PulseCounter, RunoutJudge, RunoutPolicy};

#[derive(Debug, Arbitrary)]
struct Edge {
    gap_us: u16,
    encoder: bool,
    forward: bool,
}

#[derive(Debug, Arbitrary)]
struct Input {
    bounce_us: u16,
    motor_steps: u8,
    encoder_steps: u8,
    edges: Vec<Edge>,
}

fuzz_target!(|input: Input| {
    let bounce = Duration::from_micros(u64::from(input.bounce_us));
    let judge = RunoutJudge::new(RunoutPolicy::Count {
        motor_steps: u64::from(input.motor_steps.max(1)),
        encoder_steps: u64::from(input.encoder_steps.max(1)),
    });
    let t0 = Instant::now();
    let mut now = t0;
    let mut motor = PulseCounter::new(bounce);
    let mut encoder = PulseCounter::new(bounce);
    let mut caught_up = false;
    for e in input.edges {
        now += Duration::from_micros(u64::from(e.gap_us));
        let (counter, before) = if e.encoder {
            let b = encoder.steps_since();
            (&mut encoder, b)
        } else {
            let b = motor.steps_since();
            (&mut motor, b)
        };
        let outcome = counter.on_edge(now, e.forward);
        assert_eq!(
            counter.steps_since(),
            before + u64::from(outcome == EdgeOutcome::Accepted)
        );
        let j = judge.judge(&motor, &encoder, Some(t0), now);
        caught_up |= encoder.steps_since() >= u64::from(input.encoder_steps.max(1));
        assert!(!(caught_up && j.stalled), "stall after the encoder caught up");
    }
});
