//! # Delve Core
//!
//! Core library for Delve, an iterative web-search research assistant.
//! Provides the completion-service interface (brain), the OpenAI Responses
//! provider, the research loop with its planner and report writer,
//! configuration, and fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod persistence;
pub mod providers;
pub mod research;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{DelveConfig, LlmConfig, ResearchConfig, RetryConfig, VerdictRule};
pub use error::{ConfigError, DelveError, LlmError, ResearchError, Result};
pub use providers::create_provider;
pub use research::{
    Checkpoint, DeepResearch, LoopStatus, ResearchCallback, ResearchEngine, ResearchPhase,
    ResearchPlan, ResearchReport, ResearchState, RunSummary,
};
pub use types::{
    CompletionRequest, CompletionResponse, ModelTier, Query, SearchRecord, TokenUsage, TurnId,
};
