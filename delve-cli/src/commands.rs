//! CLI subcommand handlers.

use crate::wizard::{self, CheckpointSink};
use crate::{Commands, ConfigAction, RunOptions};
use delve_core::research::Checkpoint;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    options: &RunOptions,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, options),
        Commands::Resume { checkpoint } => {
            handle_resume(&checkpoint, workspace, options, cancel).await
        }
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    options: &RunOptions,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            match delve_core::config::write_default_config(workspace)? {
                Some(path) => println!("Created configuration file: {}", path.display()),
                None => println!(
                    "Configuration file already exists: {}",
                    delve_core::config::workspace_config_path(workspace).display()
                ),
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = crate::resolve_config(workspace, options)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

/// Continue the loop of a saved run, then write and export its report.
async fn handle_resume(
    path: &Path,
    workspace: &Path,
    options: &RunOptions,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let checkpoint = Checkpoint::load(path)
        .map_err(|e| anyhow::anyhow!("Cannot load checkpoint {}: {}", path.display(), e))?;
    let config = crate::resolve_config(workspace, options)?;
    let report_dir = wizard::report_dir(options, &config, workspace);

    println!("\x1b[1mResuming:\x1b[0m {}", checkpoint.topic);
    println!("\x1b[1mGoal:\x1b[0m {}", checkpoint.state.goal);
    println!(
        "{} queries collected, {} queued",
        checkpoint.state.collected.len(),
        checkpoint.state.current_batch.len()
    );

    let research = wizard::build_research(config, options, cancel.clone())?;
    crate::install_ctrl_c(cancel);

    let topic = checkpoint.topic.clone();
    let questions = checkpoint.questions.clone();
    let mut state = checkpoint.state.clone();
    let mut sink = CheckpointSink {
        checkpoint,
        path: path.to_path_buf(),
    };

    wizard::drive_loop(&research.engine(), &mut state, Some(&mut sink)).await?;
    wizard::present(&research, &topic, questions, state, &report_dir).await
}
