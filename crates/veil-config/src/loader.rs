//! Configuration loader with multi-source merging

use crate::{Paths, VeilConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    env_overrides: Option<config::Map<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "VEIL".to_string(),
            env_overrides: None,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "VEIL")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read variables from `vars` instead of the process environment
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_overrides = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<VeilConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = VeilConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/veil/config.toml)
        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 3. Project config (veil.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local config (veil.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (VEIL_SECTION__KEY)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("run.environment")
                .try_parsing(true)
                .source(self.env_overrides),
        );

        // Build and deserialize
        let config = builder.build().context("Failed to build configuration")?;

        let mut veil_config: VeilConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        veil_config
            .validate()
            .context("Configuration failed validation")?;

        // Resolve relative paths
        veil_config.resolve_paths(&self.project_dir);

        Ok(veil_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> VeilConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use veil_types::AccessModel;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_vars(Vec::<(String, String)>::new())
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.run.model, AccessModel::Abac);
        assert_eq!(config.run.subject, "Alice");
        assert_eq!(config.engine.execute_timeout_ms, 60_000);
        assert!(config.engine.database.is_none());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[run]
model = "rbac"
subject = "Bob"
environment = ["evening", "security 2"]

[engine]
database = "tpch.duckdb"
lookup_timeout_ms = 250

[policies]
corpus = "policies/corpus.json"
"#;
        fs::write(project_dir.join("veil.toml"), config_content).expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.run.model, AccessModel::Rbac);
        assert_eq!(config.run.subject, "Bob");
        assert_eq!(config.run.environment, vec!["evening", "security 2"]);
        assert_eq!(config.engine.lookup_timeout_ms, 250);
        assert_eq!(
            config.engine.database,
            Some(project_dir.join("tpch.duckdb"))
        );
        assert_eq!(
            config.policies.corpus,
            Some(project_dir.join("policies/corpus.json"))
        );
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("veil.toml"),
            r#"
[run]
purpose = "billing"
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("veil.local.toml"),
            r#"
[run]
purpose = "audit"
"#,
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.run.purpose, "audit");
    }

    #[test]
    fn test_env_overrides_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(project_dir.join("veil.toml"), "[run]\nmodel = \"rbac\"\n")
            .expect("Failed to write project config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_vars([
                ("VEIL_RUN__MODEL", "pbac"),
                ("VEIL_ENGINE__EXECUTE_TIMEOUT_MS", "1500"),
                ("VEIL_RUN__ENVIRONMENT", "night,security 3"),
            ])
            .load()
            .expect("Failed to load config");

        assert_eq!(config.run.model, AccessModel::Pbac);
        assert_eq!(config.engine.execute_timeout_ms, 1500);
        assert_eq!(config.run.environment, vec!["night", "security 3"]);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("veil.toml"),
            "[engine]\nexecute_timeout_ms = 0\n",
        )
        .expect("Failed to write project config");

        assert!(loader(temp_dir.path()).load().is_err());
    }
}
