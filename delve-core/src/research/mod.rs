//! Deep research workflow.
//!
//! Runs in three stages:
//! 1. **Plan**: clarifying questions, then a goal plus initial queries
//! 2. **Loop**: execute a batch, judge completeness, expand until satisfied
//! 3. **Report**: a cited markdown synthesis of everything collected
//!
//! The loop is driven by [`ResearchEngine`] over a caller-owned
//! [`ResearchState`], one round per `advance` call.

pub mod checkpoint;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod expander;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod report;
pub mod session;

pub use checkpoint::Checkpoint;
pub use engine::{LoopLimits, ResearchEngine};
pub use evaluator::{CompletenessEvaluator, parse_verdict};
pub use executor::QueryExecutor;
pub use expander::{QueryExpander, parse_query_list};
pub use pipeline::{DeepResearch, ResearchOutcome};
pub use planner::{ClarifyingQuestions, ResearchPlan, ResearchPlanner};
pub use report::{Reference, ReportWriter, ResearchReport, RunStatus, RunSummary, export_filename};
pub use session::{
    ExhaustionReason, LoopStatus, NoOpResearchCallback, ResearchCallback, ResearchPhase,
    ResearchState,
};
