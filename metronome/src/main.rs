/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use metronome::clock::MonotonicClock;
use metronome::config::ApplicationConfig;
use metronome::module::ModuleRegistry;
use metronome::scheduler::DiagnosticEvent;
use metronome::Application;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Metronome cyclic executive.
///
/// Example:
///   metronome -c demos/ddb.yaml --cycles 100 --switch 50:State2 --dump
#[derive(Debug, Parser)]
#[command(
    name = "metronome",
    about = "Metronome – cyclic real-time application executive",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML application description.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Stop after this many cycles.
    #[arg(short = 'n', long = "cycles", conflicts_with = "duration_ms")]
    cycles: Option<u64>,

    /// Stop after this much wall-clock time.
    #[arg(short = 'd', long = "duration-ms")]
    duration_ms: Option<u64>,

    /// Request a State change before the given cycle (`<cycle>:<state>`).
    /// It is applied at the end of that cycle, so the new State first runs
    /// in the cycle after it.  May be repeated.
    #[arg(short = 's', long = "switch", value_parser = parse_switch)]
    switches: Vec<(u64, String)>,

    /// Log level used when RUST_LOG is not set.
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: String,

    /// Print every signal's final value.
    #[arg(long = "dump", default_value_t = false)]
    dump: bool,
}

fn parse_switch(s: &str) -> Result<(u64, String), String> {
    let (cycle, state) = s
        .split_once(':')
        .ok_or_else(|| format!("expected <cycle>:<state>, got '{s}'"))?;
    let cycle = cycle
        .trim()
        .parse()
        .map_err(|e| format!("invalid cycle '{cycle}': {e}"))?;
    let state = state.trim();
    if state.is_empty() {
        return Err(format!("missing state name in '{s}'"));
    }
    Ok((cycle, state.to_string()))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    info!(
        config      = %cli.config.display(),
        cycles      = ?cli.cycles,
        duration_ms = ?cli.duration_ms,
        switches    = cli.switches.len(),
        "Metronome starting up..."
    );

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(mut cli: Cli) -> Result<()> {
    let config = ApplicationConfig::load_from_file(&cli.config)?;
    let app = Application::build(config, &ModuleRegistry::with_builtins())
        .context("Failed to assemble application")?;

    if cli.cycles.is_none() && cli.duration_ms.is_none() {
        warn!("Neither --cycles nor --duration-ms given, running 1000 cycles");
        cli.cycles = Some(1_000);
    }
    let deadline = cli
        .duration_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    cli.switches.sort_by_key(|(cycle, _)| *cycle);
    let mut switches = cli.switches.into_iter().peekable();

    let mut scheduler = app
        .scheduler(Arc::new(MonotonicClock::new()))
        .context("Failed to start scheduler")?;

    loop {
        let cycle = app.cycle();
        if cli.cycles.is_some_and(|n| cycle >= n) || deadline.is_some_and(|d| Instant::now() >= d)
        {
            break;
        }
        while let Some((_, state)) = switches.next_if(|(at, _)| *at <= cycle) {
            if let Err(e) = app.request_state_change(&state) {
                warn!(state = %state, cycle, "State change refused: {e}");
            }
        }
        if let Err(e) = scheduler.step() {
            report(&app);
            return Err(e).context("Scheduler stopped");
        }
    }

    scheduler.stop().context("Scheduler shutdown failed")?;
    report(&app);
    if cli.dump {
        dump(&app);
    }
    app.shutdown().context("Application shutdown failed")?;
    Ok(())
}

// ── Reporting ─────────────────────────────────────────────────────────────────

fn report(app: &Application) {
    for event in app.diagnostics().drain() {
        match event {
            DiagnosticEvent::TransitionCompleted { .. } => info!("{event:?}"),
            _ => warn!("{event:?}"),
        }
    }
    let s = app.diagnostics().snapshot();
    info!(
        cycles          = s.cycles,
        overruns        = s.overruns,
        module_failures = s.module_failures,
        signal_errors   = s.signal_errors,
        transitions     = s.transitions,
        dropped_events  = s.dropped_events,
        state           = %app.current_state(),
        "Run summary"
    );
}

fn dump(app: &Application) {
    let store = app.store();
    for (_, decl) in store.decls() {
        match store.read_vec(&decl.path) {
            Ok(values) => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                println!("{} = [{}]", decl.path, values.join(", "));
            }
            Err(e) => warn!(signal = %decl.path, "Cannot read signal: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_argument_parsing() {
        assert_eq!(parse_switch("50:State2"), Ok((50, "State2".to_string())));
        assert_eq!(parse_switch(" 7 : Idle "), Ok((7, "Idle".to_string())));
        assert!(parse_switch("State2").is_err());
        assert!(parse_switch("x:State2").is_err());
        assert!(parse_switch("5:").is_err());
    }

    #[test]
    fn cli_accepts_repeated_switches() {
        let cli = Cli::try_parse_from([
            "metronome", "-c", "app.yaml", "--cycles", "10", "-s", "2:A", "-s", "4:B",
        ])
        .unwrap();
        assert_eq!(cli.switches.len(), 2);
        assert_eq!(cli.cycles, Some(10));
    }

    #[test]
    fn cycles_and_duration_are_exclusive() {
        assert!(Cli::try_parse_from([
            "metronome", "-c", "a.yaml", "--cycles", "1", "--duration-ms", "5",
        ])
        .is_err());
    }
}
