//! Veil command line.
//!
//! Runs the TPC-H workload under attribute-, role- or purpose-based
//! policies and reports what each query was allowed to see.
//!
//! # Quick Start
//!
//! ```bash
//! # Write a synthetic policy corpus
//! veil generate --scenario partial --seed 7 --output corpus.json
//!
//! # Show how query 3 is rewritten for Alice under RBAC
//! veil rewrite 3 --model rbac --corpus corpus.json
//!
//! # Run the whole catalog against in-memory DuckDB with sample rows
//! veil run --model rbac --corpus corpus.json --metrics metrics.jsonl
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use veil::Scenario;

use crate::commands::{PolicyArgs, RunArgs};

/// Veil - policy-driven query rewriting over TPC-H.
#[derive(Parser)]
#[command(name = "veil")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding veil.toml.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the query templates.
    Catalog,

    /// Show the decision and rewritten statements for one query.
    Rewrite {
        /// Query number (1-22).
        query: u32,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Run queries against DuckDB and report metrics.
    Run {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Write a synthetic policy corpus.
    Generate {
        /// Coverage: no-match, partial, all-conditioned, all-unconditioned.
        #[arg(short, long, default_value = "partial")]
        scenario: Scenario,

        /// Random seed.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Number of policies that never grant a catalog item.
        #[arg(long, default_value_t = 0)]
        noise: usize,

        /// Output file (defaults to policies.corpus from the configuration).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    match cli.command {
        Commands::Catalog => commands::catalog::run(),
        Commands::Rewrite { query, policy } => {
            commands::rewrite::run(&cli.project, query, &policy).await
        }
        Commands::Run { run, policy } => commands::run::run(&cli.project, &run, &policy).await,
        Commands::Generate {
            scenario,
            seed,
            noise,
            output,
        } => commands::generate::run(&cli.project, scenario, seed, noise, output),
        Commands::Config(ConfigCommands::Show { format }) => {
            commands::config::show(&cli.project, &format)
        }
    }
}
