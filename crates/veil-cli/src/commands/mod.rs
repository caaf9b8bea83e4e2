//! Command implementations and the flags they share.

pub mod catalog;
pub mod config;
pub mod generate;
pub mod rewrite;
pub mod run;

pub use run::RunArgs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use veil::{AccessModel, Engine, PolicyCorpus, QueryCycle};
use veil_abac::EnvironmentAttributes;
use veil_config::{ConfigLoader, VeilConfig};

/// Who asks, under which model, against which corpus.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// Access model: abac, rbac, pbac, or unrestricted to bypass policies.
    #[arg(short, long)]
    pub model: Option<AccessModel>,

    /// Requesting subject.
    #[arg(long)]
    pub subject: Option<String>,

    /// Stated purpose (PBAC).
    #[arg(long)]
    pub purpose: Option<String>,

    /// Environment attribute; repeat to give several. Replaces the configured set.
    #[arg(long = "env", value_name = "ATTRIBUTE")]
    pub environment: Vec<String>,

    /// Derive the date and part of day from the clock instead of configuration.
    #[arg(long)]
    pub observe_clock: bool,

    /// JSON policy corpus.
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Log every policy lookup.
    #[arg(long)]
    pub audit: bool,
}

impl PolicyArgs {
    /// Overlays the flags onto a loaded configuration.
    pub fn apply(&self, config: &mut VeilConfig) {
        if let Some(subject) = &self.subject {
            config.run.subject.clone_from(subject);
        }
        if let Some(purpose) = &self.purpose {
            config.run.purpose.clone_from(purpose);
        }
        if !self.environment.is_empty() {
            config.run.environment.clone_from(&self.environment);
        }
        if self.observe_clock {
            // Keep non-temporal attributes such as device and security level.
            let extras: Vec<String> = config
                .run
                .environment
                .iter()
                .filter(|attr| !is_temporal(attr))
                .cloned()
                .collect();
            config.run.environment = EnvironmentAttributes::observed_at(Utc::now(), extras);
        }
        if let Some(corpus) = &self.corpus {
            config.policies.corpus = Some(corpus.clone());
        }

        if let Some(model) = self.model {
            config.run.model = model;
        }
    }
}

fn is_temporal(attr: &str) -> bool {
    matches!(attr, "morning" | "afternoon" | "evening" | "night")
        || (attr.matches('/').count() == 2 && attr.chars().all(|c| c.is_ascii_digit() || c == '/'))
}

/// Loads configuration for `project` and applies the policy flags.
pub fn load_config(project: &Path, policy: &PolicyArgs) -> Result<VeilConfig> {
    let mut config = ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .with_context(|| format!("Failed to load configuration from {}", project.display()))?;
    policy.apply(&mut config);
    Ok(config)
}

/// Reads the configured corpus; no corpus means no grants.
pub fn load_corpus(config: &VeilConfig) -> Result<PolicyCorpus> {
    match &config.policies.corpus {
        Some(path) => {
            let corpus = PolicyCorpus::load(path)?;
            let (abac, rbac, pbac) = corpus.rule_counts();
            tracing::info!(path = %path.display(), abac, rbac, pbac, "Loaded policy corpus");
            Ok(corpus)
        }
        None => {
            tracing::warn!("No policy corpus configured; every policy-governed query is denied");
            Ok(PolicyCorpus::default())
        }
    }
}

/// Builds the query cycle for a configuration and engine.
pub fn build_cycle(config: &VeilConfig, engine: Arc<dyn Engine>, audit: bool) -> Result<QueryCycle> {
    let model = config.run.model;
    let corpus = if model == AccessModel::Unrestricted {
        PolicyCorpus::default()
    } else {
        load_corpus(config)?
    };
    let resolver = veil::build_resolver(model, &corpus, audit);
    Ok(QueryCycle::new(engine, resolver, config.run.context())
        .with_lookup_timeout(config.engine.lookup_timeout())
        .with_execute_timeout(config.engine.execute_timeout()))
}
