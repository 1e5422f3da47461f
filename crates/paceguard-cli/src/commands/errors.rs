use clap::Subcommand;
use paceguard_core::{Classification, ErrorKind};

#[derive(Subcommand)]
pub enum ErrorsAction {
    /// List every error code
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one error code
    Show {
        /// Error code, e.g. SOLVER_TIMEOUT
        code: String,
    },
}

pub fn run(action: ErrorsAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ErrorsAction::List { json } => {
            if json {
                let all: Vec<Classification> =
                    ErrorKind::ALL.iter().map(|&k| k.into()).collect();
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else {
                println!(
                    "{:<26} {:>5} {:>12} {:>10}  CATEGORY",
                    "CODE", "HTTP", "RECOVERABLE", "RETRYABLE"
                );
                for kind in ErrorKind::ALL {
                    println!(
                        "{:<26} {:>5} {:>12} {:>10}  {:?}",
                        kind.code(),
                        kind.http_status(),
                        yes_no(kind.is_recoverable()),
                        yes_no(kind.is_retryable()),
                        kind.category(),
                    );
                }
            }
        }
        ErrorsAction::Show { code } => {
            let kind = ErrorKind::from_code(&code.to_ascii_uppercase())
                .ok_or_else(|| format!("unknown error code: {code}"))?;
            let mut value = serde_json::to_value(Classification::from(kind))?;
            value["category"] = serde_json::to_value(kind.category())?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
