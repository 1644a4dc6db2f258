use std::time::{Duration, Instant};

use proptest::prelude::*;
use runout_core::{Debouncer, PulseCounter, RunoutJudge, RunoutPolicy};

proptest! {
    #[test]
    fn accepted_edges_are_never_closer_than_the_window(
        window_ms in 1u64..500,
        gaps in prop::collection::vec(0u64..1000, 1..300),
    ) {
        let window = Duration::from_millis(window_ms);
        let mut d = Debouncer::new(window);
        let mut t = Instant::now();
        let mut last: Option<Instant> = None;
        for g in gaps {
            t += Duration::from_millis(g);
            if d.accept(t) {
                if let Some(prev) = last {
                    prop_assert!(t.duration_since(prev) >= window);
                }
                last = Some(t);
            }
        }
    }

    #[test]
    fn gated_edges_still_space_counted_edges(
        window_ms in 1u64..200,
        edges in prop::collection::vec((0u64..400, any::<bool>()), 1..300),
    ) {
        let window = Duration::from_millis(window_ms);
        let mut c = PulseCounter::new(window);
        let mut t = Instant::now();
        let mut last: Option<Instant> = None;
        for (g, forward) in edges {
            t += Duration::from_millis(g);
            let before = c.steps_since();
            c.on_edge(t, forward);
            if c.steps_since() > before {
                prop_assert!(forward);
                if let Some(prev) = last {
                    prop_assert!(t.duration_since(prev) >= window);
                }
                last = Some(t);
            }
        }
    }

    #[test]
    fn encoder_catch_up_clears_the_stall_for_good(
        seq in prop::collection::vec(any::<bool>(), 0..400),
        motor_req in 1u64..60,
        encoder_req in 1u64..60,
    ) {
        let judge = RunoutJudge::new(RunoutPolicy::Count {
            motor_steps: motor_req,
            encoder_steps: encoder_req,
        });
        let t0 = Instant::now();
        let mut motor = PulseCounter::new(Duration::ZERO);
        let mut encoder = PulseCounter::new(Duration::ZERO);
        for (i, is_motor) in seq.into_iter().enumerate() {
            let now = t0 + Duration::from_millis(i as u64);
            if is_motor {
                motor.on_edge(now, true);
            } else {
                encoder.on_edge(now, true);
            }
            let j = judge.judge(&motor, &encoder, Some(t0), now);
            prop_assert_eq!(
                j.stalled,
                motor.steps_since() >= motor_req && encoder.steps_since() < encoder_req
            );
            if encoder.steps_since() >= encoder_req {
                prop_assert!(!j.stalled);
            }
        }
    }

    #[test]
    fn time_policy_matches_its_definition(
        stale_ms in 1u64..20_000,
        first_pulse_ms in proptest::option::of(0u64..30_000),
        probe_ms in 0u64..60_000,
    ) {
        let stale = Duration::from_millis(stale_ms);
        let judge = RunoutJudge::new(RunoutPolicy::Time { stale_timeout: stale });
        let t0 = Instant::now();
        let motor = PulseCounter::new(Duration::ZERO);
        let mut encoder = PulseCounter::new(Duration::ZERO);
        if let Some(p) = first_pulse_ms {
            encoder.on_edge(t0 + Duration::from_millis(p), true);
        }
        let now = t0 + Duration::from_millis(probe_ms);
        let expected = match encoder.last_pulse() {
            Some(last) => now.saturating_duration_since(last) > stale,
            None => now.duration_since(t0) > stale,
        };
        prop_assert_eq!(judge.judge(&motor, &encoder, Some(t0), now).stalled, expected);
    }
}
