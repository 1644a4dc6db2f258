//! RunoutJudge: has a channel stopped feeding filament?
use std::time::{Duration, Instant};

use crate::config::RunoutPolicy;
use crate::counter::PulseCounter;

/// One evaluation of a channel, with the numbers that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgement {
    pub stalled: bool,
    pub motor_steps: u64,
    pub encoder_steps: u64,
    /// Age of the last encoder pulse, or time since arming if none arrived yet.
    pub stale_for: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunoutJudge {
    policy: RunoutPolicy,
}

impl RunoutJudge {
    pub const fn new(policy: RunoutPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RunoutPolicy {
        self.policy
    }

    /// `armed_at` is the start of the current armed period; `None` never stalls
    /// under the time policy.
    pub fn judge(
        &self,
        motor: &PulseCounter,
        encoder: &PulseCounter,
        armed_at: Option<Instant>,
        now: Instant,
    ) -> Judgement {
        let since_pulse = encoder.elapsed_since_last_pulse(now);
        let since_armed = armed_at.map(|t| now.saturating_duration_since(t));
        let stalled = match self.policy {
            RunoutPolicy::Count {
                motor_steps,
                encoder_steps,
            } => motor.steps_since() >= motor_steps && encoder.steps_since() < encoder_steps,
            RunoutPolicy::Time { stale_timeout } => match since_pulse {
                Some(age) => age > stale_timeout,
                // grace period between arming and the first pulse
                None => since_armed.is_some_and(|d| d > stale_timeout),
            },
        };
        Judgement {
            stalled,
            motor_steps: motor.steps_since(),
            encoder_steps: encoder.steps_since(),
            stale_for: since_pulse.or(since_armed),
        }
    }

    /// Positive form of the judgement. Under the time policy a channel that has
    /// never pulsed is not rotating, even while the grace period keeps it from
    /// counting as stalled.
    pub fn is_rotating(
        &self,
        motor: &PulseCounter,
        encoder: &PulseCounter,
        armed_at: Option<Instant>,
        now: Instant,
    ) -> bool {
        match self.policy {
            RunoutPolicy::Time { stale_timeout } => encoder
                .elapsed_since_last_pulse(now)
                .is_some_and(|age| age <= stale_timeout),
            RunoutPolicy::Count { .. } => !self.judge(motor, encoder, armed_at, now).stalled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn pulses(n: u64, t0: Instant) -> PulseCounter {
        let mut c = PulseCounter::new(Duration::ZERO);
        for i in 0..n {
            c.on_edge(t0 + Duration::from_millis(i), true);
        }
        c
    }

    #[rstest]
    #[case(999, 0, false)]
    #[case(1000, 0, true)]
    #[case(1000, 499, true)]
    #[case(1000, 500, false)]
    #[case(5000, 500, false)]
    fn count_policy_thresholds(#[case] motor: u64, #[case] encoder: u64, #[case] stalled: bool) {
        let t0 = Instant::now();
        let judge = RunoutJudge::new(RunoutPolicy::Count {
            motor_steps: 1000,
            encoder_steps: 500,
        });
        let j = judge.judge(&pulses(motor, t0), &pulses(encoder, t0), Some(t0), t0);
        assert_eq!(j.stalled, stalled);
        assert_eq!((j.motor_steps, j.encoder_steps), (motor, encoder));
    }

    #[test]
    fn time_policy_grace_then_stall() {
        let t0 = Instant::now();
        let judge = RunoutJudge::new(RunoutPolicy::Time {
            stale_timeout: secs(15),
        });
        let idle = PulseCounter::new(Duration::ZERO);
        let at = |s| judge.judge(&idle, &idle, Some(t0), t0 + secs(s));
        assert!(!at(15).stalled);
        assert!(at(16).stalled);
        assert_eq!(at(16).stale_for, Some(secs(16)));
        assert!(!judge.is_rotating(&idle, &idle, Some(t0), t0 + secs(1)));
    }

    #[test]
    fn time_policy_measures_from_last_pulse() {
        let t0 = Instant::now();
        let judge = RunoutJudge::new(RunoutPolicy::Time {
            stale_timeout: secs(15),
        });
        let motor = PulseCounter::new(Duration::ZERO);
        let mut enc = PulseCounter::new(Duration::ZERO);
        enc.on_edge(t0 + secs(10), true);
        assert!(!judge.judge(&motor, &enc, Some(t0), t0 + secs(25)).stalled);
        assert!(judge.is_rotating(&motor, &enc, Some(t0), t0 + secs(25)));
        assert!(judge.judge(&motor, &enc, Some(t0), t0 + secs(26)).stalled);
    }

    #[test]
    fn never_armed_never_stalls() {
        let t0 = Instant::now();
        let judge = RunoutJudge::new(RunoutPolicy::Time {
            stale_timeout: secs(1),
        });
        let idle = PulseCounter::new(Duration::ZERO);
        assert!(!judge.judge(&idle, &idle, None, t0 + secs(100)).stalled);
    }
}
