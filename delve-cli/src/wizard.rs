//! Step-by-step research wizard.
//!
//! Topic, clarifying questions, answers, plan, per-iteration progress, and
//! finally the printed and exported report.

use crate::RunOptions;
use crate::progress::ProgressPrinter;
use delve_core::research::{Checkpoint, DeepResearch, ResearchEngine, ResearchState, RunStatus};
use delve_core::{DelveConfig, create_provider};
use dialoguer::Input;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where iteration-boundary checkpoints go.
pub struct CheckpointSink {
    pub checkpoint: Checkpoint,
    pub path: PathBuf,
}

impl CheckpointSink {
    fn save(&mut self, state: &ResearchState) -> anyhow::Result<()> {
        self.checkpoint.update(state);
        self.checkpoint.save(&self.path)?;
        Ok(())
    }
}

/// Build the pipeline with progress output and the shared cancellation token.
pub fn build_research(
    config: DelveConfig,
    options: &RunOptions,
    cancel: CancellationToken,
) -> anyhow::Result<DeepResearch> {
    let provider = create_provider(&config.llm, &config.retry)?;
    Ok(DeepResearch::new(provider, config)
        .with_callback(Arc::new(ProgressPrinter::new(options.quiet)))
        .with_cancellation(cancel))
}

/// Run the full interactive wizard.
pub async fn run(
    topic: Option<String>,
    config: DelveConfig,
    options: &RunOptions,
    workspace: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let interactive = std::io::stdin().is_terminal();
    let report_dir = report_dir(options, &config, workspace);

    let topic = match topic {
        Some(topic) => topic,
        None if interactive => Input::<String>::new()
            .with_prompt("What do you want to research?")
            .interact_text()?,
        None => anyhow::bail!("No topic given. Pass one as an argument: delve \"<topic>\""),
    };
    let topic = topic.trim().to_string();
    if topic.is_empty() {
        anyhow::bail!("The research topic must not be empty");
    }

    let research = build_research(config, options, cancel)?;
    let planner = research.planner();

    println!("\n\x1b[1mTopic:\x1b[0m {}", topic);
    let questions = research.guarded(planner.clarifying_questions(&topic)).await?;

    println!("\n\x1b[1mA few questions to focus the research:\x1b[0m");
    let answers = collect_answers(&questions.questions, &options.answers, interactive)?;

    let plan = research
        .guarded(planner.plan(
            &topic,
            &questions.questions,
            &answers,
            Some(&questions.turn_id),
        ))
        .await?;

    println!("\n\x1b[1mGoal:\x1b[0m {}", plan.goal);
    println!("\x1b[1mInitial queries:\x1b[0m");
    for query in &plan.queries {
        println!("  - {}", query);
    }

    let mut state = plan.into_state()?;
    let mut sink = match checkpoint_path(options, &report_dir, &topic) {
        Some(path) => {
            let checkpoint = Checkpoint::new(
                topic.clone(),
                questions.questions.clone(),
                answers.clone(),
                state.clone(),
            );
            checkpoint.save(&path)?;
            info!(path = %path.display(), "Checkpoint saved");
            Some(CheckpointSink { checkpoint, path })
        }
        None => None,
    };

    drive_loop(&research.engine(), &mut state, sink.as_mut()).await?;
    present(&research, &topic, questions.questions, state, &report_dir).await
}

/// Advance the loop to a terminal state, saving a checkpoint after every
/// completed iteration.
///
/// On failure the state is back at the last iteration boundary; the error
/// message points at the checkpoint to restart from.
pub async fn drive_loop(
    engine: &ResearchEngine,
    state: &mut ResearchState,
    mut sink: Option<&mut CheckpointSink>,
) -> anyhow::Result<()> {
    while !state.is_terminal() {
        if let Err(e) = engine.advance(state).await {
            report_failure(&e, sink.as_deref());
            return Err(e.into());
        }
        if let Some(sink) = sink.as_deref_mut() {
            sink.save(state)?;
        }
    }
    Ok(())
}

fn report_failure(error: &delve_core::DelveError, sink: Option<&CheckpointSink>) {
    let what = if error.is_cancelled() {
        "Research cancelled"
    } else {
        "Research stopped"
    };
    eprintln!("\n\x1b[31m{}:\x1b[0m {}", what, error);
    match sink {
        Some(sink) => eprintln!(
            "{} collected queries are saved. Continue with:\n  delve resume {}",
            sink.checkpoint.state.collected.len(),
            sink.path.display()
        ),
        None => eprintln!("Re-run with --checkpoint <file> to be able to resume."),
    }
}

/// Write the report for a finished loop, print it and export it.
pub async fn present(
    research: &DeepResearch,
    topic: &str,
    questions: Vec<String>,
    state: ResearchState,
    report_dir: &Path,
) -> anyhow::Result<()> {
    println!("\n\x1b[1mWriting the report...\x1b[0m");
    let outcome = research.finish(topic, questions, state).await?;

    println!("\n{}\n", outcome.report.markdown);

    let path = outcome.report.export(report_dir, topic)?;
    info!(path = %path.display(), "Report written");

    println!("\x1b[1m--- Summary ---\x1b[0m");
    println!("{}", outcome.summary);
    println!("Report: {}", path.display());
    if let RunStatus::Exhausted(reason) = outcome.summary.status {
        println!(
            "\x1b[33mThe goal was not confirmed as covered ({}).\x1b[0m",
            reason
        );
    }
    Ok(())
}

/// Answers from `--answer` flags, from prompts, or none at all.
fn collect_answers(
    questions: &[String],
    given: &[String],
    interactive: bool,
) -> anyhow::Result<Vec<String>> {
    if !given.is_empty() || !interactive {
        for (i, question) in questions.iter().enumerate() {
            let answer = given.get(i).map(String::as_str).unwrap_or("-");
            println!("  {}\n    \x1b[90m> {}\x1b[0m", question, answer);
        }
        if given.len() > questions.len() {
            warn!(
                questions = questions.len(),
                answers = given.len(),
                "More answers than questions"
            );
        }
        return Ok(given.to_vec());
    }

    let mut answers = Vec::with_capacity(questions.len());
    for question in questions {
        let answer: String = Input::new()
            .with_prompt(question.as_str())
            .allow_empty(true)
            .interact_text()?;
        answers.push(answer.trim().to_string());
    }
    Ok(answers)
}

/// Directory for exported reports: `--output`, then `research.report_dir`
/// (relative to the workspace), then the workspace itself.
pub fn report_dir(options: &RunOptions, config: &DelveConfig, workspace: &Path) -> PathBuf {
    options
        .output
        .clone()
        .or_else(|| {
            config
                .research
                .report_dir
                .as_ref()
                .map(|dir| workspace.join(dir))
        })
        .unwrap_or_else(|| workspace.to_path_buf())
}

/// Checkpoint file for a new run: the `--checkpoint` path, or
/// `checkpoint_<topic>.json` in the report directory when none was given.
fn checkpoint_path(options: &RunOptions, report_dir: &Path, topic: &str) -> Option<PathBuf> {
    options.checkpoint.as_ref().map(|path| {
        path.clone().unwrap_or_else(|| Checkpoint::default_path(report_dir, topic))
    })
}
