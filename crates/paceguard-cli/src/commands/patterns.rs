use clap::Subcommand;
use paceguard_core::{AntiBanConfig, PatternCatalog, PatternName};

use super::format_ms;

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List all patterns
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one pattern in full
    Show {
        /// Pattern name (normal, aggressive, cautious, night-owl)
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: PatternsAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PatternsAction::List { json } => {
            if json {
                let mut all = serde_json::Map::new();
                for (name, cfg) in PatternCatalog::iter() {
                    all.insert(name.to_string(), serde_json::to_value(cfg)?);
                }
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else {
                println!("{:<12} {:>12} {:>8} {:>8} {:>8}", "PATTERN", "DELAY", "SKIP", "HOURS", "TASKS");
                for (name, cfg) in PatternCatalog::iter() {
                    println!(
                        "{:<12} {:>12} {:>8} {:>8} {:>8}",
                        name.as_str(),
                        format!("{}-{}", format_ms(cfg.min_delay_ms), format_ms(cfg.max_delay_ms)),
                        format!("{:.0}%", cfg.skip_rate * 100.0),
                        format!("{:02}-{:02}", cfg.work_hours_start, cfg.work_hours_end),
                        cfg.max_tasks_per_session,
                    );
                }
            }
        }
        PatternsAction::Show { name, json } => {
            let pattern: PatternName = name.parse()?;
            let cfg = PatternCatalog::get(pattern);
            if json {
                println!("{}", serde_json::to_string_pretty(cfg)?);
            } else {
                print_details(pattern, cfg);
            }
        }
    }
    Ok(())
}

fn print_details(pattern: PatternName, cfg: &AntiBanConfig) {
    let range = |min: u64, max: u64| format!("{} - {}", format_ms(min), format_ms(max));
    println!("Pattern:            {pattern}");
    println!("Task delay:         {}", range(cfg.min_delay_ms, cfg.max_delay_ms));
    println!(
        "Typing delay:       {}",
        range(cfg.min_typing_delay_ms, cfg.max_typing_delay_ms)
    );
    println!("Skip rate:          {:.0}%", cfg.skip_rate * 100.0);
    println!(
        "Interaction rate:   {:.0}%",
        cfg.incidental_interaction_rate * 100.0
    );
    println!(
        "Work hours:         {:02}:00 - {:02}:00",
        cfg.work_hours_start, cfg.work_hours_end
    );
    println!(
        "Work before break:  {}",
        range(cfg.min_work_before_break_ms, cfg.max_work_before_break_ms)
    );
    println!(
        "Break length:       {}",
        range(cfg.min_break_duration_ms, cfg.max_break_duration_ms)
    );
    println!("Max work time:      {}", format_ms(cfg.max_continuous_work_ms));
    println!("Max tasks:          {}", cfg.max_tasks_per_session);
}
