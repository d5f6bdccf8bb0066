use clap::Subcommand;
use slotwise_core::config::config_dir;
use slotwise_core::EngineConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write the default configuration if none exists
    Init,
    /// Print the configuration file path
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = EngineConfig::load_or_default();
            config.validate()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            EngineConfig::load()?;
            println!("config ready at {}", config_dir()?.join("config.toml").display());
        }
        ConfigAction::Path => {
            println!("{}", config_dir()?.join("config.toml").display());
        }
    }
    Ok(())
}
