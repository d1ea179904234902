//! Final report generation, citation parsing and markdown export.

use crate::brain::LlmProvider;
use crate::error::Result;
use crate::persistence;
use crate::research::prompts;
use crate::research::session::{ExhaustionReason, ResearchState};
use crate::types::{CompletionRequest, InputMessage, SearchRecord, TokenUsage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("citation pattern is valid")
});

static REFERENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]\s*)?\[(\d+)\]:?\s+(.*)$").expect("reference pattern is valid")
});

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)\]>"']+"#).expect("url pattern is valid"));

/// One entry of the trailing reference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub number: u32,
    pub url: String,
}

/// A generated research report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub goal: String,
    /// The markdown body as returned by the model.
    pub markdown: String,
    /// Distinct citation numbers used inline, ascending.
    pub citations: Vec<u32>,
    /// Parsed reference list.
    pub references: Vec<Reference>,
}

impl ResearchReport {
    /// Parse citations and references out of a markdown body.
    pub fn from_markdown(goal: impl Into<String>, markdown: impl Into<String>) -> Self {
        let markdown = markdown.into();
        let mut citations = BTreeSet::new();
        let mut references = Vec::new();

        for line in markdown.lines() {
            if let Some(caps) = REFERENCE_LINE.captures(line)
                && let Ok(number) = caps[1].parse::<u32>()
                && let Some(url) = URL.find(&caps[2])
            {
                if !references.iter().any(|r: &Reference| r.number == number) {
                    references.push(Reference {
                        number,
                        url: url.as_str().trim_end_matches(['.', ',']).to_string(),
                    });
                }
                continue;
            }
            for caps in CITATION.captures_iter(line) {
                citations.extend(
                    caps[1]
                        .split(',')
                        .filter_map(|n| n.trim().parse::<u32>().ok()),
                );
            }
        }

        Self {
            goal: goal.into(),
            markdown,
            citations: citations.into_iter().collect(),
            references,
        }
    }

    /// Inline citation numbers with no matching reference entry.
    pub fn unresolved_citations(&self) -> Vec<u32> {
        self.citations
            .iter()
            .copied()
            .filter(|n| !self.references.iter().any(|r| r.number == *n))
            .collect()
    }

    pub fn reference_url(&self, number: u32) -> Option<&str> {
        self.references
            .iter()
            .find(|r| r.number == number)
            .map(|r| r.url.as_str())
    }

    /// Write the report to `dir/research_report_<topic>.md`.
    pub fn export(&self, dir: &Path, topic: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(export_filename(topic));
        persistence::atomic_write(&path, self.markdown.as_bytes())?;
        info!(path = %path.display(), "Report exported");
        Ok(path)
    }
}

/// File name for an exported report. The topic keeps only ASCII letters,
/// digits, `-` and `_`; everything else becomes `_`.
pub fn export_filename(topic: &str) -> String {
    format!("research_report_{}.md", persistence::file_stem(topic))
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Exhausted(ExhaustionReason),
}

/// Headline numbers of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub topic: String,
    pub total_queries: usize,
    /// Executed batches, counting the final one.
    pub iterations: usize,
    pub status: RunStatus,
    /// Tokens spent by this session's completions.
    #[serde(default)]
    pub usage: TokenUsage,
}

impl RunSummary {
    pub fn from_state(topic: impl Into<String>, state: &ResearchState) -> Self {
        let status = match state.status() {
            crate::research::LoopStatus::Exhausted(reason) => RunStatus::Exhausted(reason),
            _ => RunStatus::Complete,
        };
        Self {
            topic: topic.into(),
            total_queries: state.collected.len(),
            iterations: state.rounds_executed(),
            status,
            usage: TokenUsage::default(),
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self.status {
            RunStatus::Complete => "complete".to_string(),
            RunStatus::Exhausted(reason) => format!("incomplete ({reason})"),
        };
        write!(
            f,
            "Topic: {}\nTotal queries: {}\nIterations: {}\nStatus: {}\nTokens: {} ({} in, {} out)",
            self.topic,
            self.total_queries,
            self.iterations,
            status,
            self.usage.total(),
            self.usage.input_tokens,
            self.usage.output_tokens
        )
    }
}

/// Writes the final cited report from the collected records.
pub struct ReportWriter {
    provider: Arc<dyn LlmProvider>,
    instructions: String,
}

impl ReportWriter {
    pub fn new(provider: Arc<dyn LlmProvider>, instructions: impl Into<String>) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
        }
    }

    pub async fn write(&self, goal: &str, collected: &[SearchRecord]) -> Result<ResearchReport> {
        let data = serde_json::to_string(collected)?;
        let request = CompletionRequest::dialogue(vec![
            InputMessage::developer(prompts::report_instruction(goal)),
            InputMessage::assistant(data),
        ])
        .with_instructions(self.instructions.as_str());

        let response = self.provider.complete(request).await?;
        let report = ResearchReport::from_markdown(goal, response.first_output_text()?);

        let unresolved = report.unresolved_citations();
        if !unresolved.is_empty() {
            warn!(?unresolved, "Report cites sources missing from its reference list");
        }
        info!(
            chars = report.markdown.len(),
            citations = report.citations.len(),
            references = report.references.len(),
            "Report generated"
        );
        Ok(report)
    }
}
