//! Hivemind CLI
//!
//! Main entry point for the hivemind command-line tool.
//! Routes questions to human experts and answers with expert-backed AI.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{
    AskCommand, AssessCommand, AssignmentCommand, CorpusCommand, ExpertCommand, RequestCommand,
};
use hivemind_core::{config::AppConfig, logging};
use hivemind_experts::ExpertService;
use std::path::PathBuf;
use tracing::Instrument;

/// Hivemind - community expert answers with AI synthesis
#[derive(Parser, Debug)]
#[command(name = "hivemind")]
#[command(about = "Route questions to human experts and answer with their knowledge", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "HIVEMIND_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "HIVEMIND_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, scripted)
    #[arg(short, long, global = true, env = "HIVEMIND_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "HIVEMIND_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the AI (with expert context) or the expert community
    Ask(AskCommand),

    /// Register and manage experts
    Expert(ExpertCommand),

    /// Work on assignments
    Assignment(AssignmentCommand),

    /// Inspect expert requests and run consensus
    Request(RequestCommand),

    /// Score an answer against the quality rubric
    Assess(AssessCommand),

    /// Search and maintain the accepted-answer corpus
    Corpus(CorpusCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask(_) => "ask",
            Commands::Expert(_) => "expert",
            Commands::Assignment(_) => "assignment",
            Commands::Request(_) => "request",
            Commands::Assess(_) => "assess",
            Commands::Corpus(_) => "corpus",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()
        .context("Failed to load configuration")?
        .with_overrides(
            cli.workspace,
            cli.config,
            cli.provider,
            cli.model,
            cli.log_level,
            cli.verbose,
            cli.no_color,
        );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    tracing::info!("Hivemind CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;
    config.ensure_hivemind_dir()?;

    let service = ExpertService::from_config(&config)
        .with_context(|| format!("Failed to open expert store at {:?}", config.database_path()))?;

    let span = tracing::info_span!("command", name = cli.command.name());
    let result = async {
        let result = match cli.command {
            Commands::Ask(cmd) => cmd.execute(&service).await,
            Commands::Expert(cmd) => cmd.execute(&service).await,
            Commands::Assignment(cmd) => cmd.execute(&service).await,
            Commands::Request(cmd) => cmd.execute(&service).await,
            Commands::Assess(cmd) => cmd.execute(&service).await,
            Commands::Corpus(cmd) => cmd.execute(&service).await,
        };

        // Consensus runs and embeddings started by the command finish before exit
        service.drain_background().await;
        result
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}
