//! `veil generate`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use veil::{Catalog, CorpusGenerator, Scenario};
use veil_config::ConfigLoader;

use crate::style::{SemanticStyle, print_labeled, print_success};

pub fn run(
    project: &Path,
    scenario: Scenario,
    seed: u64,
    noise: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = ConfigLoader::new().with_project_dir(project).load()?;
    let output = output
        .or_else(|| config.policies.corpus.clone())
        .context("No output file: pass --output or set policies.corpus")?;

    let catalog = Catalog::tpch()?;
    let corpus = CorpusGenerator::new(seed)
        .with_noise(noise)
        .with_subject(config.run.subject.as_str())
        .with_purpose(config.run.purpose.as_str())
        .with_environment(config.run.environment.iter().map(String::as_str))
        .generate(&catalog, scenario);
    corpus.save(&output)?;

    let (abac, rbac, pbac) = corpus.rule_counts();
    print_success(&format!(
        "Wrote {} corpus to {}",
        scenario,
        output.display().code()
    ));
    print_labeled("seed", &seed.to_string());
    print_labeled("abac rules", &abac.to_string());
    print_labeled("rbac grants", &rbac.to_string());
    print_labeled("pbac grants", &pbac.to_string());
    Ok(())
}
