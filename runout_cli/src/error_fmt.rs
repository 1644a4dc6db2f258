//! Human-readable error descriptions and structured JSON error formatting.

use runout_core::error::{BuildError, EngineError};

/// Context attached to `Config::validate` failures.
pub const INVALID_CONFIG: &str = "invalid configuration";

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingEdgeSource => {
                "What happened: No edge source was provided to the runout engine.\nLikely causes: GPIO backend failed to initialize or was not wired into the builder.\nHow to fix: Ensure the edge source is created successfully and passed via with_edge_source(...).".to_string()
            }
            BuildError::MissingActuator => {
                "What happened: No pause actuator was provided to the runout engine.\nLikely causes: The output adapter was not wired into the builder.\nHow to fix: Pass an actuator via with_actuator(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `runout check-config`."
            ),
            BuildError::WatchdogSpawn(msg) => format!(
                "What happened: The watchdog thread could not be started ({msg}).\nLikely causes: Thread or memory limits reached.\nHow to fix: Check ulimits and free memory, then restart."
            ),
        };
    }

    if let Some(ee) = err.downcast_ref::<EngineError>() {
        return match ee {
            EngineError::AlreadyArmed => "What happened: Monitoring is already active.\nLikely causes: A start or resume event arrived twice.\nHow to fix: Send `paused` or `done` first, or ignore this message.".to_string(),
            EngineError::Register { pin, reason } => format!(
                "What happened: Edge detection could not be enabled on pin {pin} ({reason}).\nLikely causes: Another process holds the GPIO line, or the pin number is wrong.\nHow to fix: Check [[sensors.channel]] pins and stop other GPIO users; monitoring stays off until the next start."
            ),
            EngineError::ChannelInit { channel, reason } => format!(
                "What happened: Sensor {channel} could not be initialized ({reason}).\nLikely causes: Wrong pin numbers or missing GPIO permissions.\nHow to fix: Fix the channel pins in the config; the other sensor keeps working."
            ),
            EngineError::Hardware(msg) => format!(
                "What happened: GPIO error ({msg}).\nLikely causes: Wiring or permission problem.\nHow to fix: Verify wiring and that the process may access /dev/gpiomem."
            ),
            EngineError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Check the path. Original: {msg}"
        );
    }

    if lower.starts_with("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this program.\nLikely causes: Typo in a key or an unknown policy name.\nHow to fix: Compare against the sample config. Original: {msg}"
        );
    }

    if lower.starts_with(INVALID_CONFIG) {
        let detail = err.root_cause();
        return format!(
            "What happened: Configuration is invalid ({detail}).\nLikely causes: Out-of-range or duplicated pins, or thresholds of zero.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration problems, 3 for hardware, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(BuildError::InvalidConfig(_)) = err.downcast_ref::<BuildError>() {
        return 2;
    }
    if let Some(
        EngineError::Register { .. } | EngineError::ChannelInit { .. } | EngineError::Hardware(_),
    ) = err.downcast_ref::<EngineError>()
    {
        return 3;
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.starts_with("read config")
        || lower.starts_with("parse config")
        || lower.starts_with(INVALID_CONFIG)
    {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingEdgeSource => "MissingEdgeSource",
            BuildError::MissingActuator => "MissingActuator",
            BuildError::InvalidConfig(_) => "InvalidConfig",
            BuildError::WatchdogSpawn(_) => "WatchdogSpawn",
        };
    }
    if let Some(ee) = err.downcast_ref::<EngineError>() {
        return match ee {
            EngineError::AlreadyArmed => "AlreadyArmed",
            EngineError::ChannelInit { .. } => "ChannelInit",
            EngineError::Register { .. } => "Register",
            EngineError::Hardware(_) => "Hardware",
            EngineError::State(_) => "State",
        };
    }
    if err.to_string().starts_with(INVALID_CONFIG) {
        return "InvalidConfig";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(EngineError::Register { pin, .. }) = err.downcast_ref::<EngineError>() {
        obj["details"] = json!({ "pin": pin });
    }
    obj.to_string()
}
