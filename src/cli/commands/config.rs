//! Config Command
//!
//! Manage Planwright configuration.
//!
//! Usage:
//!   planwright config show [-g] [-f json]
//!   planwright config path
//!   planwright config init [-g] [--force]

use crate::cli::util::OutputFormat;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show configuration
pub fn show(global: bool, format: OutputFormat) -> Result<()> {
    if !global {
        return ConfigLoader::show_config(format.is_json());
    }

    match ConfigLoader::global_config_path() {
        Some(global_path) if global_path.exists() => {
            let config = ConfigLoader::load_from_file(&global_path)?;
            println!("# Global Config: {}\n", global_path.display());
            println!("{}", ConfigLoader::render(&config, format.is_json())?);
        }
        Some(_) => {
            println!("No global config found.");
            println!("Run 'planwright config init --global' to create one.");
        }
        None => println!("Cannot determine global config directory."),
    }
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize global configuration
pub fn init_global(force: bool) -> Result<()> {
    let dir = ConfigLoader::init_global(force)?;
    println!("✓ Initialized global configuration");
    println!("  Directory: {}", dir.display());
    if let Some(config_path) = ConfigLoader::global_config_path() {
        println!("  Config:    {}", config_path.display());
    }
    Ok(())
}

/// Initialize project configuration
pub fn init_project(force: bool) -> Result<()> {
    let dir = ConfigLoader::init_project(force)?;
    println!("✓ Initialized project configuration");
    println!("  Directory: {}", dir.display());
    println!(
        "  Config:    {}",
        ConfigLoader::project_config_path().display()
    );
    Ok(())
}
