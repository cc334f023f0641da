//! Config command implementations

use std::path::Path;

use anyhow::{bail, Context, Result};

use bb_core::config::{self, AppConfig};

use crate::output::{print_info, print_success, print_warning};

/// Show the effective configuration
pub fn config_show(config_dir: &Path) -> Result<()> {
    let path = config::config_path(config_dir);
    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_warning(&format!("No configuration file at {:?}, showing defaults", path));
        print_info("Run 'bastion-buddy config init' to create one");
    }
    println!();

    let config: AppConfig = config::load_config(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Print the configuration directory
pub fn config_path(config_dir: &Path) {
    println!("{}", config_dir.display());
}

/// Write the default configuration file
pub fn config_init(config_dir: &Path, force: bool) -> Result<()> {
    let path = config::config_path(config_dir);
    if path.exists() && !force {
        bail!("Config file already exists: {:?} (use --force to overwrite)", path);
    }

    config::save_config(&path, &AppConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}
