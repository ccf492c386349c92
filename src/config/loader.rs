//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/planwright/config.toml)
//! 3. Project config (.planwright/config.toml)
//! 4. Environment variables (PLANWRIGHT_* prefix, `__` between sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{PlanwrightError, Result};

const ENV_PREFIX: &str = "PLANWRIGHT_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layered(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Same chain as [`load`](Self::load) with explicit file locations
    pub fn load_layered(global: Option<&Path>, project: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // PLANWRIGHT_LLM__MODEL -> llm.model
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| PlanwrightError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| PlanwrightError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/planwright/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("planwright"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".planwright")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());

        if let Ok(config) = Self::load() {
            let db = &config.storage.database_path;
            let exists = if db.exists() { "✓" } else { "✗" };
            println!("  Usage:   {} {}", exists, db.display());
        }
    }

    /// Show current effective configuration
    pub fn show_config(as_json: bool) -> Result<()> {
        let config = Self::load()?;
        println!("{}", Self::render(&config, as_json)?);
        Ok(())
    }

    /// Render a configuration as TOML or JSON; API keys are redacted
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| PlanwrightError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            PlanwrightError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::write_template(&global_dir, Self::default_global_config(), force)?;
        Ok(global_dir)
    }

    /// Initialize project configuration
    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        Self::write_template(&project_dir, Self::default_project_config(), force)?;
        Ok(project_dir)
    }

    fn write_template(dir: &Path, content: &str, force: bool) -> Result<()> {
        fs::create_dir_all(dir)?;

        let config_path = dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, content)?;
            info!("Created config: {}", config_path.display());
        } else {
            info!("Config exists: {}", config_path.display());
        }
        Ok(())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn default_global_config() -> &'static str {
        r#"# Planwright Global Configuration
# User-wide defaults. Project settings in .planwright/config.toml override these.

version = "1.0"

[llm]
# provider = "openai"
timeout_secs = 120
temperature = 0.3
# token_estimator = "char_ratio"   # or "word"

[execution]
max_attempts = 3
max_concurrent_requests = 3
request_delay_ms = 500

# Credentials normally come from the environment (OPENAI_API_KEY, ...).
# [providers.openai]
# api_key = "..."
# priority = 10
"#
    }

    fn default_project_config() -> &'static str {
        r#"# Planwright Project Configuration
# Project-specific settings that override global defaults.

version = "1.0"

[storage]
database_path = ".planwright/usage.db"
persist_usage = true

# [providers.ollama]
# api_base = "http://localhost:11434"
# priority = 5
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use tempfile::TempDir;

    // Tests that read PLANWRIGHT_* run inside a Jail, which serializes them
    // and restores the environment and working directory afterwards.

    #[test]
    fn test_load_defaults_without_files() {
        Jail::expect_with(|jail| {
            let missing = jail.directory().join("missing.toml");
            let config = ConfigLoader::load_layered(None, &missing).map_err(|e| e.to_string())?;
            assert_eq!(config.version, "1.0");
            assert_eq!(config.execution.max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn test_project_overrides_global() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "global.toml",
                "[llm]\nprovider = \"google\"\ntimeout_secs = 60\n[execution]\nmax_attempts = 4\n",
            )?;
            jail.create_file("project.toml", "[llm]\ntimeout_secs = 30\n")?;
            let global = jail.directory().join("global.toml");
            let project = jail.directory().join("project.toml");

            let config =
                ConfigLoader::load_layered(Some(&global), &project).map_err(|e| e.to_string())?;
            assert_eq!(config.llm.provider.as_deref(), Some("google"));
            assert_eq!(config.llm.timeout_secs, 30);
            assert_eq!(config.execution.max_attempts, 4);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\ntemperature = 3.0\n").unwrap();
        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(PlanwrightError::Config(_))
        ));
    }

    #[test]
    fn test_provider_section_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[providers.ollama]\napi_base = \"http://gpu-box:11434\"\npriority = 1\n\n[providers.google]\nenabled = false\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        let ollama = &config.providers["ollama"];
        assert_eq!(ollama.api_base.as_deref(), Some("http://gpu-box:11434"));
        assert!(ollama.enabled);
        assert!(!config.providers["google"].enabled);
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("PLANWRIGHT_LLM__MODEL", "test-model");
            jail.set_env("PLANWRIGHT_EXECUTION__MAX_ATTEMPTS", "7");
            let project = jail.directory().join("none.toml");
            let config = ConfigLoader::load_layered(None, &project).map_err(|e| e.to_string())?;
            assert_eq!(config.llm.model.as_deref(), Some("test-model"));
            assert_eq!(config.execution.max_attempts, 7);
            Ok(())
        });
    }

    #[test]
    fn test_init_project_writes_loadable_template() {
        Jail::expect_with(|jail| {
            let dir = ConfigLoader::init_project(false).map_err(|e| e.to_string())?;
            let path = jail.directory().join(dir).join("config.toml");
            assert!(path.exists());

            let config = ConfigLoader::load_from_file(&path).map_err(|e| e.to_string())?;
            assert!(config.storage.persist_usage);
            Ok(())
        });
    }

    #[test]
    fn test_token_estimator_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\ntoken_estimator = \"word\"\n").unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.token_estimator, crate::ai::EstimatorKind::Word);
    }

    #[test]
    fn test_templates_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("global.toml");
        fs::write(&path, ConfigLoader::default_global_config()).unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_ok());
    }
}
