//! Terminal progress display for the research loop.

use delve_core::research::{ResearchCallback, ResearchPhase};
use delve_core::types::{Query, SearchRecord};

/// Longest finding excerpt shown per query.
const EXCERPT_CHARS: usize = 100;

/// Prints loop progress to stdout as the engine reports it.
pub struct ProgressPrinter {
    quiet: bool,
}

impl ProgressPrinter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ResearchCallback for ProgressPrinter {
    fn on_phase_change(&self, phase: &ResearchPhase, iteration: usize) {
        if self.quiet {
            return;
        }
        match phase {
            ResearchPhase::ExecutingBatch => {
                println!("\n\x1b[1;36mIteration {}\x1b[0m", iteration + 1);
            }
            ResearchPhase::Evaluating => {
                println!("  \x1b[90mChecking whether the goal is covered...\x1b[0m");
            }
            ResearchPhase::Expanding => {
                println!("  \x1b[90mPlanning follow-up queries...\x1b[0m");
            }
            ResearchPhase::Exhausted { reason } => {
                println!("  \x1b[33mStopped: {}\x1b[0m", reason);
            }
            ResearchPhase::AwaitingBatch | ResearchPhase::Complete => {}
        }
    }

    fn on_query_complete(&self, record: &SearchRecord, position: usize, batch_size: usize) {
        if self.quiet {
            return;
        }
        println!("{}", query_line(record, position, batch_size));
    }

    fn on_verdict(&self, satisfied: bool, collected: usize) {
        if self.quiet {
            return;
        }
        if satisfied {
            println!("  \x1b[32mGoal covered\x1b[0m after {} queries", collected);
        } else {
            println!("  \x1b[33mMore research needed\x1b[0m ({} queries so far)", collected);
        }
    }

    fn on_expansion(&self, queries: &[Query]) {
        if self.quiet {
            return;
        }
        for query in queries {
            println!("    \x1b[90m+\x1b[0m {}", query);
        }
    }
}

/// One progress line for a finished query: position, query and an excerpt.
pub fn query_line(record: &SearchRecord, position: usize, batch_size: usize) -> String {
    let mut line = format!(
        "  [{}/{}] {} \x1b[90m- {}\x1b[0m",
        position,
        batch_size,
        record.query,
        excerpt(&record.research_output, EXCERPT_CHARS)
    );
    if !record.citations.is_empty() {
        line.push_str(&format!(" \x1b[90m({} sources)\x1b[0m", record.citations.len()));
    }
    line
}

/// First line of `text`, cut to `max` characters.
pub fn excerpt(text: &str, max: usize) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first.chars().count() <= max {
        first.to_string()
    } else {
        let cut: String = first.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}
