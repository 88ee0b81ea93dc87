//! Init and Config commands.

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, Settings};

/// Write a default `.watchbridge/settings.toml` in the current directory.
pub fn run_init(force: bool) -> Result<PathBuf, ConfigError> {
    let path = Settings::init_config_file(force)?;

    println!("Created configuration file at: {}", path.display());
    println!("Edit [server] and [publish] to change where the bridge listens and how it announces itself.");

    Ok(path)
}

/// Print the effective settings and the file they were read from.
pub fn run_config(config: &Settings, source: &Path) -> Result<(), ConfigError> {
    if source.exists() {
        println!("# Settings file: {}", source.display());
    } else {
        println!(
            "# Settings file: {} (not found, using defaults)",
            source.display()
        );
    }
    println!("# WATCHBRIDGE_* environment variables override file values");
    println!();
    print!("{}", toml::to_string_pretty(config)?);

    Ok(())
}
