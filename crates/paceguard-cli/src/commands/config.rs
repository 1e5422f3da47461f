use clap::Subcommand;
use paceguard_core::{PatternCatalog, Settings};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the settings file as TOML
    Show {
        /// Print the effective pattern configuration with overrides applied
        #[arg(long)]
        effective: bool,
    },
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "pattern", "overrides.skip_rate")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dot-separated key
        key: String,
        /// New value ("null" clears an override)
        value: String,
    },
    /// Print the settings file location
    Path,
    /// Reset settings to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show { effective } => {
            let settings = Settings::load()?;
            if effective {
                let cfg = settings
                    .overrides
                    .apply(PatternCatalog::get(settings.pattern))?;
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                print!("{}", toml::to_string_pretty(&settings)?);
            }
        }
        ConfigAction::Get { key } => {
            let settings = Settings::load()?;
            match settings.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut settings = Settings::load()?;
            settings.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::Path => {
            println!("{}", Settings::path()?.display());
        }
        ConfigAction::Reset => {
            Settings::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
