//! `runout monitor`: print-state lines on stdin drive the engine.

use std::io::{BufRead, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;
use runout_core::PrintEvent;
use tracing::{debug, info, warn};

use crate::report::{state_json, status_json};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Print(PrintEvent),
    Status,
    Reset,
    TestStart,
    TestStop,
    Pulse { pin: u8, count: u64 },
    Level { pin: u8, high: bool },
    Wait(Duration),
}

fn arg<T: FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    let w = word.ok_or_else(|| format!("missing {what}"))?;
    w.parse().map_err(|_| format!("invalid {what}: {w:?}"))
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default().to_ascii_lowercase();
        let cmd = match head.as_str() {
            "started" => Self::Print(PrintEvent::Started),
            "resumed" => Self::Print(PrintEvent::Resumed),
            "paused" => Self::Print(PrintEvent::Paused),
            "done" => Self::Print(PrintEvent::Done),
            "failed" => Self::Print(PrintEvent::Failed),
            "cancelled" => Self::Print(PrintEvent::Cancelled),
            "error" => Self::Print(PrintEvent::Error),
            "status" => Self::Status,
            "reset" => Self::Reset,
            "test-start" => Self::TestStart,
            "test-stop" => Self::TestStop,
            "pulse" => Self::Pulse {
                pin: arg(words.next(), "pin")?,
                count: match words.next() {
                    Some(w) => arg(Some(w), "count")?,
                    None => 1,
                },
            },
            "level" => Self::Level {
                pin: arg(words.next(), "pin")?,
                high: match words.next() {
                    Some("1" | "high") => true,
                    Some("0" | "low") => false,
                    other => return Err(format!("invalid level: {other:?}")),
                },
            },
            "wait" => Self::Wait(Duration::from_millis(arg(words.next(), "milliseconds")?)),
            other => return Err(format!("unknown command {other:?}")),
        };
        if let Some(extra) = words.next() {
            return Err(format!("unexpected argument {extra:?}"));
        }
        Ok(cmd)
    }
}

enum Input {
    Line(String),
    Eof,
    Interrupt,
}

fn spawn_stdin_reader(tx: xch::Sender<Input>) -> eyre::Result<()> {
    // detached: a blocking stdin read cannot be interrupted for a join
    std::thread::Builder::new()
        .name("runout-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(Input::Line(l)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(Input::Eof);
        })
        .wrap_err("spawn stdin reader")?;
    Ok(())
}

fn emit<W: Write>(out: &Mutex<W>, value: &serde_json::Value) {
    let Ok(mut w) = out.lock() else {
        return;
    };
    if writeln!(w, "{value}").and_then(|()| w.flush()).is_err() {
        debug!("stdout closed");
    }
}

/// Apply one command. Errors are reported on `out` and never end the session.
pub fn apply<W: Write>(session: &mut Session, cmd: Command, out: &Mutex<W>) {
    let ctl = &session.ctl;
    let result = match cmd {
        Command::Print(event) => ctl.on_print_event(event),
        Command::Reset => {
            ctl.reset();
            Ok(())
        }
        Command::TestStart => ctl.enable_test(),
        Command::TestStop => {
            ctl.disable();
            Ok(())
        }
        Command::Status => {
            emit(out, &status_json(&ctl.status(), &ctl.channel_configs()));
            return;
        }
        Command::Pulse { .. } | Command::Level { .. } | Command::Wait(_) => {
            let Some(bench) = session.sim.as_mut() else {
                warn!(?cmd, "only available with the simulated edge source");
                return;
            };
            match cmd {
                Command::Pulse { pin, count } => {
                    let delivered = bench.pulse(ctl, pin, count);
                    debug!(pin, count, delivered, "simulated edges");
                }
                Command::Level { pin, high } => bench.edges().set_level(pin, high),
                Command::Wait(d) => bench.advance(ctl, d),
                _ => {}
            }
            return;
        }
    };
    if let Err(e) = result {
        warn!(error = %e, ?cmd, "command failed");
        emit(
            out,
            &serde_json::json!({ "event": "error", "message": crate::error_fmt::humanize(&e) }),
        );
    }
    let status = ctl.status();
    emit(out, &state_json(status.run_state, status.mode));
}

pub fn run<W: Write + Send>(mut session: Session, out: &Arc<Mutex<W>>) -> eyre::Result<()> {
    let (tx, rx) = xch::unbounded();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Input::Interrupt);
    })
    .wrap_err("install Ctrl-C handler")?;
    spawn_stdin_reader(tx)?;

    info!(
        sensors = session.ctl.channel_configs().len(),
        simulated = session.sim.is_some(),
        "monitoring print events from stdin"
    );
    for input in rx.iter() {
        match input {
            Input::Line(line) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(cmd) => apply(&mut session, cmd, out),
                    Err(reason) => warn!(line, %reason, "ignoring input"),
                }
            }
            Input::Eof => {
                info!("end of input; stopping");
                break;
            }
            Input::Interrupt => {
                info!("interrupted; stopping");
                break;
            }
        }
    }
    session.ctl.disable();
    Ok(())
}
