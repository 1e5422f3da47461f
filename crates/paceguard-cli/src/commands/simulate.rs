//! Dry-run a worker loop against a manual clock.
//!
//! Every delay and break advances the simulated clock instead of sleeping,
//! so an eight hour session replays in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use clap::Args;
use paceguard_core::{
    classify, BackoffPolicy, ErrorKind, EventLog, GovernorEvent, ManualClock, PatternName,
    RandomSource, SeededRandom, SessionGovernor, SessionReport, Settings, SolveError,
};
use serde::Serialize;

/// Simulated solver time per attempt, in milliseconds.
const SOLVE_MIN_MS: u64 = 2_000;
const SOLVE_MAX_MS: u64 = 15_000;

#[derive(Args)]
pub struct SimulateArgs {
    /// Pattern name; defaults to the configured pattern and overrides
    #[arg(long)]
    pattern: Option<String>,
    /// Number of tasks to attempt
    #[arg(long, default_value_t = 50)]
    tasks: u64,
    /// Seed for every random draw
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Probability in [0, 1] that a simulated solve attempt fails
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,
    /// Retries per task after a failed solve
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    /// UTC hour the simulated session starts at
    #[arg(long, default_value_t = 10)]
    start_hour: u32,
    /// Output the report as JSON
    #[arg(long)]
    json: bool,
    /// Include the event log (as JSON)
    #[arg(long)]
    events: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Outcome {
    solved: u64,
    skipped: u64,
    failed: u64,
    retries: u64,
    /// Code of the error that ended the run early, if any.
    stopped_by: Option<String>,
}

#[derive(Serialize)]
struct SimulationOutput {
    report: SessionReport,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<GovernorEvent>>,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&args.failure_rate) {
        return Err(format!("--failure-rate must be within [0, 1], got {}", args.failure_rate).into());
    }
    if args.start_hour > 23 {
        return Err(format!("--start-hour must be 0-23, got {}", args.start_hour).into());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let output = runtime.block_on(simulate(&args))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", output.report);
    let o = &output.outcome;
    println!(
        "solved {}  skipped {}  failed {}  retries {}",
        o.solved, o.skipped, o.failed, o.retries
    );
    if let Some(code) = &o.stopped_by {
        println!("stopped by {code}");
    }
    if let Some(events) = &output.events {
        println!("{}", serde_json::to_string_pretty(events)?);
    }
    Ok(())
}

async fn simulate(args: &SimulateArgs) -> Result<SimulationOutput, SolveError> {
    let builder = match &args.pattern {
        Some(name) => SessionGovernor::builder().pattern(name.parse::<PatternName>()?),
        None => Settings::load()?.governor_builder()?,
    };

    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, args.start_hour, 0, 0)
        .single()
        .ok_or_else(|| SolveError::configuration("invalid start hour"))?;
    let clock = ManualClock::new(start);
    let log = EventLog::new();
    let mut governor = builder
        .clock(Arc::new(clock.clone()))
        .rng(Arc::new(SeededRandom::new(args.seed)))
        .listener(Arc::new(log.clone()))
        .build()?;

    let solver = SeededRandom::new(args.seed.wrapping_add(1));
    let backoff = BackoffPolicy::default();
    let mut outcome = Outcome::default();

    for _ in 0..args.tasks {
        match governor.before_task().await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::MarkedUnsolvable => {
                outcome.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::info!(code = e.code(), "simulation ended: {}", e.message());
                outcome.stopped_by = Some(e.code().to_string());
                break;
            }
        }

        match solve_with_retries(&clock, &solver, &backoff, args, &mut outcome) {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(code = e.code(), "task failed after retries");
                outcome.failed += 1;
                continue;
            }
        }

        outcome.solved += 1;
        if let Err(e) = governor.after_task().await {
            outcome.stopped_by = Some(e.code().to_string());
            break;
        }
    }

    Ok(SimulationOutput {
        report: governor.report(),
        outcome,
        events: args.events.then(|| log.snapshot()),
    })
}

/// Simulated solve; failures are classified and retried with backoff.
fn solve_with_retries(
    clock: &ManualClock,
    solver: &SeededRandom,
    backoff: &BackoffPolicy,
    args: &SimulateArgs,
    outcome: &mut Outcome,
) -> Result<(), SolveError> {
    let mut attempt = 0;
    loop {
        let solve_ms = solver.range_inclusive(SOLVE_MIN_MS, SOLVE_MAX_MS);
        clock.advance(Duration::from_millis(solve_ms));
        if solver.next_f64() >= args.failure_rate {
            return Ok(());
        }

        let err = SolveError::solver_timeout("simulated", SOLVE_MAX_MS, solve_ms);
        if !classify(&err).retryable || attempt >= args.max_retries {
            return Err(err);
        }
        let delay = backoff.delay(attempt, solver);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying solve");
        clock.advance(delay);
        attempt += 1;
        outcome.retries += 1;
    }
}
