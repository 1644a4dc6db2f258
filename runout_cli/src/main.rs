#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `runout`: filament runout monitor for Raspberry Pi print hosts.

mod actuator;
mod cli;
mod error_fmt;
mod logging;
mod monitor;
mod report;
mod session;
mod simulate;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{INVALID_CONFIG, exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let cfg = match &cli.config {
        Some(path) => runout_config::load_file(path)?,
        None => runout_config::Config::default(),
    };
    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    logging::init_tracing(cli.json, &level, &cfg.logging)?;
    cfg.validate().wrap_err(INVALID_CONFIG)?;

    let out = Arc::new(Mutex::new(std::io::stdout()));
    match cli.cmd {
        Commands::CheckConfig => {
            let s = session::build(&cfg, true, out.clone())?;
            let wiring = s.ctl.channel_configs();
            let mut w = out
                .lock()
                .map_err(|_| eyre::eyre!("stdout writer poisoned"))?;
            if cli.json {
                writeln!(w, "{}", report::wiring_json(&wiring))?;
            } else {
                writeln!(w, "config ok\n{}", report::wiring_text(&wiring))?;
            }
        }
        Commands::Monitor => {
            let s = session::build(&cfg, cli.sim, out.clone())?;
            monitor::run(s, &out)?;
        }
        Commands::Simulate {
            motor_steps,
            encoder_steps,
            sensor,
            settle_ms,
        } => {
            let args = simulate::SimulateArgs {
                motor_steps,
                encoder_steps,
                sensor,
                settle: Duration::from_millis(settle_ms),
            };
            let verdict = simulate::run(&cfg, args, out.clone())?;
            let mut w = out
                .lock()
                .map_err(|_| eyre::eyre!("stdout writer poisoned"))?;
            writeln!(w, "{verdict}")?;
        }
    }
    Ok(())
}
