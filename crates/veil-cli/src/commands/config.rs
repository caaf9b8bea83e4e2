//! `veil config show`

use std::path::Path;

use anyhow::{Result, bail};
use veil_config::ConfigLoader;

pub fn show(project: &Path, format: &str) -> Result<()> {
    let config = ConfigLoader::new().with_project_dir(project).load()?;

    match format {
        "toml" => print!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        other => bail!("Unknown format '{other}' (expected toml or json)"),
    }
    Ok(())
}
