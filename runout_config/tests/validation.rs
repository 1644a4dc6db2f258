use runout_config::{Evaluation, ExtruderPolicy, RunoutPolicy, load_file, load_toml};
use rstest::rstest;
use std::io::Write;

const FULL: &str = r#"
[sensors]
count = 2
bounce_ms = 250

[[sensors.channel]]
motor_step_pin = 13
dir_pin = 16
motor_dir = true
encoder_pin = 5

[[sensors.channel]]
motor_step_pin = 19
dir_pin = 26
motor_dir = false
encoder_pin = 6

[detection]
policy = "time"
evaluation = "polling"
stale_timeout_ms = 15000
poll_interval_ms = 5000

[extruder]
pin = 21
policy = "pulse"
min_extrude_ms = 5000
pulse_gap_ms = 800

[reposition]
enabled = false

[logging]
level = "debug"
rotation = "daily"
"#;

#[test]
fn parses_full_config() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.sensors.bounce_ms, 250);
    assert_eq!(cfg.detection.policy, RunoutPolicy::Time);
    assert_eq!(cfg.detection.evaluation, Evaluation::Polling);
    let ex = cfg.extruder.as_ref().expect("extruder section");
    assert_eq!(ex.pin, 21);
    assert_eq!(ex.policy, ExtruderPolicy::Pulse);
    assert_eq!(ex.pulse_gap_ms, 800);
    assert!(!cfg.reposition.enabled);
    assert_eq!(cfg.active_channels()[1].motor_dir, Some(false));
}

#[test]
fn direction_pin_is_read_from_its_own_key() {
    let cfg = load_toml(FULL).expect("parse TOML");
    let ch = cfg.active_channels()[0];
    assert_ne!(ch.dir_pin, Some(ch.motor_step_pin));
    assert_eq!(ch.dir_pin, Some(16));
}

#[rstest]
#[case("[sensors]\ncount = 3\n", "sensors.count")]
#[case("[sensors]\ncount = -2\n", "sensors.count")]
#[case("[sensors]\nbounce_ms = 20000\n", "bounce_ms")]
#[case("[detection]\nmotor_steps_required = 0\n", "motor_steps_required")]
#[case("[detection]\nencoder_steps_required = 0\n", "encoder_steps_required")]
#[case("[detection]\nstale_timeout_ms = 0\n", "stale_timeout_ms")]
#[case("[detection]\npoll_interval_ms = 0\n", "poll_interval_ms")]
#[case("[extruder]\npin = 21\npulse_gap_ms = 0\n", "pulse_gap_ms")]
#[case("[extruder]\npin = 13\n", "pin 13 is used by both")]
#[case("[extruder]\npin = 40\n", "not a valid bcm pin")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
#[case("[reposition]\nlift_speed = 0\n", "reposition speeds")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").to_lowercase().contains(&needle.to_lowercase()),
        "unexpected message: {err}"
    );
}

#[test]
fn rejects_count_larger_than_channel_list() {
    let toml = r#"
[sensors]
count = 2

[[sensors.channel]]
motor_step_pin = 13
encoder_pin = 5
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("missing second channel");
    assert!(format!("{err}").contains("only 1"));
}

#[test]
fn rejects_direction_gate_without_dir_pin() {
    let toml = r#"
[sensors]
count = 1

[[sensors.channel]]
motor_step_pin = 13
motor_dir = true
encoder_pin = 5
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("gate needs a pin");
    assert!(format!("{err}").contains("requires dir_pin"));
}

#[test]
fn rejects_unknown_policy() {
    let err = load_toml("[detection]\npolicy = \"vibes\"\n").expect_err("unknown variant");
    assert!(format!("{err}").contains("unknown variant"));
}

#[test]
fn load_file_reads_from_disk() {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(f, "[sensors]\ncount = 1\nbounce_ms = 100").expect("write");
    let cfg = load_file(f.path()).expect("load");
    assert_eq!(cfg.sensors.count, 1);
    assert_eq!(cfg.sensors.bounce_ms, 100);
}

#[test]
fn load_file_reports_missing_path() {
    let err = load_file(std::path::Path::new("/nonexistent/runout.toml")).expect_err("missing");
    assert!(format!("{err}").contains("read config"));
}
