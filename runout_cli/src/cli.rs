//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "runout", version, about = "Filament runout monitor")]
pub struct Cli {
    /// Path to config TOML; built-in reference wiring when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to [logging].level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Use the simulated edge source even when built with GPIO support
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor filament while print-state events arrive on stdin
    #[command(long_about = "Monitor filament while print-state events arrive on stdin.\n\n\
One event per line: started, resumed, paused, done, failed, cancelled, error.\n\
Control lines: status, reset, test-start, test-stop.\n\n\
With the simulated edge source the clock only moves when told to:\n\
  pulse <pin> [count]   deliver rising edges one bounce window apart\n\
  level <pin> <0|1>     set an input level\n\
  wait <ms>             advance time, running poll cycles on the way\n\n\
Exits on end of input or Ctrl-C.")]
    Monitor,
    /// Feed synthetic pulses to one sensor and report whether runout fires
    Simulate {
        /// Motor step edges to deliver
        #[arg(long, value_name = "N")]
        motor_steps: u64,
        /// Encoder edges to deliver alongside
        #[arg(long, value_name = "M", default_value_t = 0)]
        encoder_steps: u64,
        /// Sensor channel to drive
        #[arg(long, value_name = "INDEX", default_value_t = 0)]
        sensor: usize,
        /// Extra time to let pass after the last edge (polling policies need it)
        #[arg(long, value_name = "MS", default_value_t = 0)]
        settle_ms: u64,
    },
    /// Validate the config and print the resolved wiring
    CheckConfig,
}
