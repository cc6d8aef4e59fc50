//! Config command - show the effective configuration.

use std::path::PathBuf;
use ultrasearch_core::Config;

/// Run the config command.
pub fn run(config: Config, explicit_path: Option<PathBuf>, path_only: bool) -> anyhow::Result<()> {
    if path_only {
        let path = match explicit_path {
            Some(path) => path,
            None => Config::default_config_path()?,
        };
        println!("{}", path.display());
        return Ok(());
    }

    print!("{}", config.to_toml_string()?);
    Ok(())
}
