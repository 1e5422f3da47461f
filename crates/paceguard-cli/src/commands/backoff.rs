use clap::Args;
use paceguard_core::error::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS};
use paceguard_core::{BackoffPolicy, RandomSource, SeededRandom, ThreadRandom};

use super::format_ms;

#[derive(Args)]
pub struct BackoffArgs {
    /// Number of retry attempts to show
    #[arg(long, default_value_t = 6)]
    attempts: u32,
    /// Base delay in milliseconds
    #[arg(long, default_value_t = DEFAULT_BACKOFF_BASE_MS)]
    base_ms: u64,
    /// Upper bound for any single delay in milliseconds
    #[arg(long, default_value_t = DEFAULT_BACKOFF_CAP_MS)]
    cap_ms: u64,
    /// Seed for reproducible jitter
    #[arg(long)]
    seed: Option<u64>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: BackoffArgs) -> Result<(), Box<dyn std::error::Error>> {
    let policy = BackoffPolicy::new(args.base_ms, args.cap_ms);
    let rng: Box<dyn RandomSource> = match args.seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(ThreadRandom),
    };

    let delays: Vec<u64> = (0..args.attempts)
        .map(|attempt| policy.delay_ms(attempt, rng.as_ref()))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&delays)?);
        return Ok(());
    }

    let mut total = 0u64;
    println!("{:>7} {:>10} {:>10}", "ATTEMPT", "DELAY", "TOTAL");
    for (attempt, delay) in delays.iter().enumerate() {
        total = total.saturating_add(*delay);
        println!(
            "{:>7} {:>10} {:>10}",
            attempt,
            format_ms(*delay),
            format_ms(total)
        );
    }
    Ok(())
}
