//! Configuration management for Veil
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (VEIL_* prefix, `__` between section and key)
//! 3. veil.local.toml (gitignored, local overrides)
//! 4. veil.toml (git-tracked, project config)
//! 5. ~/.config/veil/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use veil_types::{AccessModel, ResolveContext};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Veil configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    pub run: RunConfig,
    pub engine: EngineConfig,
    pub policies: PolicyConfig,
    pub metrics: MetricsConfig,
}

/// Who is asking, and under which model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: AccessModel,
    pub subject: String,
    pub purpose: String,
    /// Environment attributes in effect for the run.
    pub environment: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: AccessModel::Abac,
            subject: "Alice".to_string(),
            purpose: "perform CEO tasks".to_string(),
            environment: vec![
                "5/20/2020".to_string(),
                "security 1".to_string(),
                "morning".to_string(),
                "hp laptop".to_string(),
            ],
        }
    }
}

impl RunConfig {
    /// The resolution context described by this section.
    pub fn context(&self) -> ResolveContext {
        ResolveContext::new(self.subject.as_str())
            .with_purpose(self.purpose.as_str())
            .with_environment(self.environment.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// DuckDB database file; in-memory when unset.
    pub database: Option<PathBuf>,
    pub lookup_timeout_ms: u64,
    pub execute_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: None,
            lookup_timeout_ms: 5_000,
            execute_timeout_ms: 60_000,
        }
    }
}

impl EngineConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_millis(self.execute_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// JSON policy corpus; an empty corpus is used when unset.
    pub corpus: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// JSON-lines file receiving one record per query.
    pub output: Option<PathBuf>,
}

impl VeilConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Rejects values no run can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.subject.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "run.subject must not be empty".to_string(),
            ));
        }
        if self.engine.lookup_timeout_ms == 0 || self.engine.execute_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engine timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        for path in [
            &mut self.engine.database,
            &mut self.policies.corpus,
            &mut self.metrics.output,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VeilConfig::default();
        assert_eq!(config.run.model, AccessModel::Abac);
        assert_eq!(config.run.purpose, "perform CEO tasks");
        assert_eq!(config.run.environment.len(), 4);
        assert_eq!(config.engine.lookup_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_context_carries_run_section() {
        let ctx = RunConfig::default().context();
        assert_eq!(ctx.subject, "Alice");
        assert_eq!(ctx.purpose, "perform CEO tasks");
        assert!(ctx.environment.iter().any(|a| a == "morning"));
    }

    #[test]
    fn test_path_resolution() {
        let mut config = VeilConfig::default();
        config.engine.database = Some(PathBuf::from("tpch.duckdb"));
        config.metrics.output = Some(PathBuf::from("/var/log/veil.jsonl"));
        config.resolve_paths("/home/user/project");

        assert_eq!(
            config.engine.database,
            Some(PathBuf::from("/home/user/project/tpch.duckdb"))
        );
        assert_eq!(
            config.metrics.output,
            Some(PathBuf::from("/var/log/veil.jsonl"))
        );
        assert!(config.policies.corpus.is_none());
    }

    #[test]
    fn test_empty_subject_is_invalid() {
        let mut config = VeilConfig::default();
        config.run.subject = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = VeilConfig::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[engine]"));
        let parsed: VeilConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
