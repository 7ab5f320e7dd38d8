use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{debug, info};
use std::fs::File;
use std::path::Path;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Load the configuration file if one was given, otherwise fall back to defaults
pub fn load_or_default(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            debug!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

/// Overrides supplied on the command line, applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub store_path: Option<std::path::PathBuf>,
    pub log_level: Option<String>,
}

/// Apply CLI overrides to a loaded configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    if let Some(path) = &overrides.store_path {
        config.store.path = path.clone();
    }

    if let Some(level) = &overrides.log_level {
        config.log_level = level.clone();
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}
