//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;

use crate::ai::provider::{HttpProviderFactory, ProviderRegistry};
use crate::ai::usage::UsageSink;
use crate::ai::{HealthTracker, Orchestrator};
use crate::config::{Config, ConfigLoader};
use crate::storage::SqliteUsageSink;
use crate::types::{ContextGraph, PlanwrightError, Result};

/// Output format shared by the reporting commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == Self::Json
    }
}

/// Command execution context
///
/// Holds the resolved configuration and builds the orchestration objects
/// a command needs.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
}

impl CommandContext {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        Ok(Self {
            config: ConfigLoader::load()?,
        })
    }

    /// Provider registry over the enabled built-in descriptors
    pub fn registry(&self) -> ProviderRegistry {
        let descriptors = self.config.descriptors();
        let credentials = self.config.credentials(&descriptors);
        let health = Arc::new(HealthTracker::new(self.config.health.max_error_types));
        let factory = Arc::new(HttpProviderFactory::new(self.config.client_options()));

        ProviderRegistry::new(descriptors, credentials, factory, health)
            .with_default_provider(self.config.llm.provider.clone())
    }

    /// Usage sink when persistence is enabled
    pub fn usage_sink(&self) -> Result<Option<Arc<SqliteUsageSink>>> {
        if !self.config.storage.persist_usage {
            return Ok(None);
        }
        let sink = SqliteUsageSink::open(&self.config.storage.database_path)?;
        Ok(Some(Arc::new(sink)))
    }

    /// Orchestrator wired from configuration; `persist` attaches the usage store
    pub fn orchestrator(&self, persist: bool) -> Result<Orchestrator> {
        let sink: Option<Arc<dyn UsageSink>> = if persist {
            self.usage_sink()?.map(|s| s as Arc<dyn UsageSink>)
        } else {
            None
        };

        Ok(Orchestrator::new(
            Arc::new(self.registry()),
            self.config.orchestrator_settings(),
            sink,
        ))
    }
}

/// Read a context graph from a JSON file (array of fragments)
pub fn load_context_graph(path: &Path) -> Result<ContextGraph> {
    if !path.exists() {
        return Err(PlanwrightError::Config(format!(
            "Context file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_context_graph() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "stakeholder-register", "body": "Sponsors", "relationships": ["project-charter"]},
                {"name": "glossary"}
            ]"#,
        )
        .unwrap();

        let graph = load_context_graph(&path).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.fragments()[1].body, "");
    }

    #[test]
    fn test_missing_context_file() {
        let dir = TempDir::new().unwrap();
        let err = load_context_graph(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, PlanwrightError::Config(_)));
    }

    #[test]
    fn test_registry_respects_disabled_providers() {
        let mut config = Config::default();
        config.providers.insert(
            "google".to_string(),
            crate::config::ProviderOverride {
                enabled: false,
                ..Default::default()
            },
        );
        config.storage.persist_usage = false;

        let ctx = CommandContext { config };
        let registry = ctx.registry();
        assert!(registry.descriptor("google").is_none());
        assert!(registry.descriptor("openai").is_some());
        assert!(ctx.usage_sink().unwrap().is_none());
    }
}
