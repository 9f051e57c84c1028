//! `agentloop` command line.
//!
//! Builds and queries the history index and runs the heuristics pipeline
//! over ad-hoc text. The agent loop itself is embedded by hosts that supply
//! perception, planning and sandbox collaborators.

use std::path::{Path, PathBuf};

use agentloop::heuristics::Metadata;
use agentloop::heuristics::engine::{HeuristicEngine, Mode, PipelineOutput};
use agentloop::indexer::EmbeddingIndexBuilder;
use agentloop::io::config::{AgentConfig, load_config, write_config};
use agentloop::io::heuristics_config::load_engine;
use agentloop::logging;
use agentloop::retriever::HistoryRetriever;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "agentloop",
    version,
    about = "Step/lifeline agent loop tooling"
)]
struct Cli {
    /// Agent configuration file.
    #[arg(long, global = true, default_value = "config/agent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default agent configuration.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Rebuild the history index from session transcripts.
    Index {
        #[arg(long)]
        memory_dir: Option<PathBuf>,
        #[arg(long)]
        index_dir: Option<PathBuf>,
        /// Skip the posting lists and remove stale ones.
        #[arg(long)]
        no_accelerate: bool,
    },
    /// Print past sessions most similar to a query.
    Retrieve {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },
    /// Run the heuristics pipeline and print every verdict.
    Heuristics {
        text: String,
        /// Run in post-result mode with this interim result.
        #[arg(long)]
        interim: Option<String>,
        /// Heuristics configuration; defaults to the agent config's path.
        #[arg(long)]
        heuristics: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Index {
            memory_dir,
            index_dir,
            no_accelerate,
        } => {
            let config = load_config(&cli.config)?;
            let builder = EmbeddingIndexBuilder::new(
                memory_dir.unwrap_or(config.memory_dir),
                index_dir.unwrap_or(config.index_dir),
            )
            .accelerate(config.accelerate_index && !no_accelerate);
            let report = builder.build()?;
            print_json(&report)
        }
        Command::Retrieve {
            query,
            top_k,
            index_dir,
        } => {
            let config = load_config(&cli.config)?;
            let retriever = HistoryRetriever::load(&index_dir.unwrap_or(config.index_dir));
            let records = retriever.retrieve(&query, top_k.unwrap_or(config.few_shot_top_k));
            print_json(&records)
        }
        Command::Heuristics {
            text,
            interim,
            heuristics,
        } => {
            let config = load_config(&cli.config)?;
            let engine = load_engine(&heuristics.unwrap_or(config.heuristics_path));
            print_json(&run_heuristics(&engine, &text, interim.as_deref()))
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &AgentConfig::default()).with_context(|| format!("write {}", path.display()))
}

fn run_heuristics(engine: &HeuristicEngine, text: &str, interim: Option<&str>) -> PipelineOutput {
    let mode = if interim.is_some() {
        Mode::PostResult
    } else {
        Mode::PreQuery
    };
    engine.run(mode, text, interim, &Metadata::new())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["agentloop", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from("config/agent.toml"));
    }

    #[test]
    fn parse_retrieve_with_top_k() {
        let cli = Cli::parse_from(["agentloop", "retrieve", "weather", "-k", "5"]);
        match cli.command {
            Command::Retrieve { query, top_k, .. } => {
                assert_eq!(query, "weather");
                assert_eq!(top_k, Some(5));
            }
            _ => panic!("expected retrieve"),
        }
    }

    #[test]
    fn interim_selects_post_result_mode() {
        let engine = HeuristicEngine::with_defaults();
        let output = run_heuristics(&engine, "task", Some("rate limit hit"));
        assert_eq!(output.text, "rate limit hit");
        let pre = run_heuristics(&engine, "task", None);
        assert_eq!(pre.text, "task");
    }
}
