//! Delve CLI: interactive deep research from the terminal.
//!
//! Runs the step-by-step research wizard, or resumes a saved checkpoint.

mod commands;
mod progress;
mod wizard;

use clap::Parser;
use delve_core::DelveConfig;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Delve: iterative web-search deep research
#[derive(Parser, Debug)]
#[command(name = "delve", version, about, long_about = None)]
struct Cli {
    /// Research topic (prompted for if omitted)
    topic: Option<String>,

    /// Model for planning, search, evaluation and the report
    #[arg(short, long)]
    model: Option<String>,

    /// Model for clarifying questions
    #[arg(long)]
    light_model: Option<String>,

    /// Stop after this many executed batches
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Stop once this many queries have been executed
    #[arg(long)]
    max_queries: Option<usize>,

    /// Remove both loop limits
    #[arg(long, conflicts_with_all = ["max_iterations", "max_queries"])]
    unbounded: bool,

    /// Answer to a clarifying question, in order (repeatable; skips prompting)
    #[arg(short, long = "answer", visible_alias = "answers", value_name = "ANSWER")]
    answers: Vec<String>,

    /// Directory for the exported report
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save a checkpoint after the plan and after every iteration
    /// (defaults to checkpoint_<topic>.json next to the report)
    #[arg(long, value_name = "FILE", num_args = 0..=1)]
    checkpoint: Option<Option<PathBuf>>,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the user and workspace files)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Continue a run from a saved checkpoint and write its report
    Resume {
        /// Checkpoint file written with --checkpoint
        checkpoint: PathBuf,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init,
    /// Show current configuration
    Show,
}

/// Per-run settings taken from the command line.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunOptions {
    pub model: Option<String>,
    pub light_model: Option<String>,
    pub max_iterations: Option<usize>,
    pub max_queries: Option<usize>,
    pub unbounded: bool,
    pub answers: Vec<String>,
    pub output: Option<PathBuf>,
    /// `Some(None)` asks for the default checkpoint location.
    pub checkpoint: Option<Option<PathBuf>>,
    pub config_file: Option<PathBuf>,
    pub quiet: bool,
}

impl RunOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            model: cli.model.clone(),
            light_model: cli.light_model.clone(),
            max_iterations: cli.max_iterations,
            max_queries: cli.max_queries,
            unbounded: cli.unbounded,
            answers: cli.answers.clone(),
            output: cli.output.clone(),
            checkpoint: cli.checkpoint.clone(),
            config_file: cli.config.clone(),
            quiet: cli.quiet,
        }
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut DelveConfig) {
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(light_model) = &self.light_model {
            config.llm.light_model = light_model.clone();
        }
        if self.unbounded {
            config.research.max_iterations = None;
            config.research.max_queries = None;
        }
        if let Some(limit) = self.max_iterations {
            config.research.max_iterations = Some(limit);
        }
        if let Some(limit) = self.max_queries {
            config.research.max_queries = Some(limit);
        }
    }
}

/// Load the layered configuration and apply command-line overrides.
pub(crate) fn resolve_config(
    workspace: &std::path::Path,
    options: &RunOptions,
) -> anyhow::Result<DelveConfig> {
    let mut config = match &options.config_file {
        Some(path) => delve_core::config::load_config_file(path)?,
        None => delve_core::config::load_config(Some(workspace))
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?,
    };
    options.apply(&mut config);
    config.research.validate()?;
    for warning in config.llm.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

/// Cancel `token` when the user presses Ctrl-C.
fn install_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n\x1b[33mCancelling...\x1b[0m");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "delve", "delve")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "delve.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let options = RunOptions::from_cli(&cli);
    let cancel = CancellationToken::new();

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace, &options, cancel).await;
    }

    let config = resolve_config(&workspace, &options)?;
    install_ctrl_c(cancel.clone());
    wizard::run(cli.topic, config, &options, &workspace, cancel).await
}
