//! Research loop state and progress callbacks.
//!
//! `ResearchState` is a plain caller-owned value. The engine mutates it
//! through `&mut` and only at round boundaries, so a state observed between
//! calls is always safe to checkpoint.

use crate::error::ResearchError;
use crate::types::{Query, SearchRecord, TurnId};
use serde::{Deserialize, Serialize};

/// Why a run stopped without a positive verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    MaxIterations { limit: usize },
    MaxQueries { limit: usize },
}

impl std::fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExhaustionReason::MaxIterations { limit } => {
                write!(f, "iteration limit of {limit} reached")
            }
            ExhaustionReason::MaxQueries { limit } => write!(f, "query limit of {limit} reached"),
        }
    }
}

/// Current phase of the research loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    /// Waiting for `advance` with a pending batch.
    AwaitingBatch,
    /// Running the current batch of queries.
    ExecutingBatch,
    /// Asking whether the collected records satisfy the goal.
    Evaluating,
    /// Requesting the next batch of queries.
    Expanding,
    /// The goal was judged satisfied.
    Complete,
    /// A configured limit stopped the run before the goal was satisfied.
    Exhausted { reason: ExhaustionReason },
}

impl ResearchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResearchPhase::Complete | ResearchPhase::Exhausted { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResearchPhase::AwaitingBatch => "awaiting batch",
            ResearchPhase::ExecutingBatch => "executing batch",
            ResearchPhase::Evaluating => "evaluating",
            ResearchPhase::Expanding => "expanding",
            ResearchPhase::Complete => "complete",
            ResearchPhase::Exhausted { .. } => "exhausted",
        }
    }
}

/// Outcome of one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// A new batch is pending.
    Continuing,
    Complete,
    Exhausted(ExhaustionReason),
}

impl LoopStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopStatus::Continuing)
    }
}

/// State of one research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    /// The research goal the evaluator judges against.
    pub goal: String,
    /// Turn of the plan generation. Every expansion chains to it.
    pub context: TurnId,
    /// Every record produced so far, in execution order.
    pub collected: Vec<SearchRecord>,
    /// Queries to run on the next round.
    pub current_batch: Vec<Query>,
    /// Completed expansion rounds.
    pub iteration_count: usize,
    pub phase: ResearchPhase,
}

impl ResearchState {
    /// Start a run from a plan.
    pub fn new(
        goal: impl Into<String>,
        context: TurnId,
        initial_queries: Vec<Query>,
    ) -> Result<Self, ResearchError> {
        let goal = goal.into();
        if goal.trim().is_empty() {
            return Err(ResearchError::EmptyGoal);
        }
        if initial_queries.is_empty() {
            return Err(ResearchError::EmptyBatch);
        }
        Ok(Self {
            goal,
            context,
            collected: Vec::new(),
            current_batch: initial_queries,
            iteration_count: 0,
            phase: ResearchPhase::AwaitingBatch,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ResearchPhase::Complete
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Number of batches executed so far.
    pub fn rounds_executed(&self) -> usize {
        if self.is_terminal() {
            self.iteration_count + 1
        } else {
            self.iteration_count
        }
    }

    /// Status as seen by a caller of `advance`.
    pub fn status(&self) -> LoopStatus {
        match self.phase {
            ResearchPhase::Complete => LoopStatus::Complete,
            ResearchPhase::Exhausted { reason } => LoopStatus::Exhausted(reason),
            _ => LoopStatus::Continuing,
        }
    }
}

/// Callback trait for progressive research UI updates.
pub trait ResearchCallback: Send + Sync {
    /// Called when the loop enters a new phase.
    fn on_phase_change(&self, phase: &ResearchPhase, iteration: usize);
    /// Called after each query of a batch finishes. `position` is 1-based.
    fn on_query_complete(&self, record: &SearchRecord, position: usize, batch_size: usize);
    /// Called with every completeness verdict.
    fn on_verdict(&self, satisfied: bool, collected: usize);
    /// Called when a new batch replaces the previous one.
    fn on_expansion(&self, queries: &[Query]);
}

/// No-op callback for testing.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {
    fn on_phase_change(&self, _phase: &ResearchPhase, _iteration: usize) {}
    fn on_query_complete(&self, _record: &SearchRecord, _position: usize, _batch_size: usize) {}
    fn on_verdict(&self, _satisfied: bool, _collected: usize) {}
    fn on_expansion(&self, _queries: &[Query]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ResearchState {
        ResearchState::new(
            "Assess EV battery recycling",
            TurnId::new("resp_plan"),
            vec!["q1".into(), "q2".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_new_state() {
        let s = state();
        assert_eq!(s.phase, ResearchPhase::AwaitingBatch);
        assert!(s.collected.is_empty());
        assert_eq!(s.iteration_count, 0);
        assert_eq!(s.status(), LoopStatus::Continuing);
        assert_eq!(s.rounds_executed(), 0);
    }

    #[test]
    fn test_new_state_rejects_empty_inputs() {
        assert!(matches!(
            ResearchState::new("  ", TurnId::new("r"), vec!["q".into()]),
            Err(ResearchError::EmptyGoal)
        ));
        assert!(matches!(
            ResearchState::new("goal", TurnId::new("r"), Vec::new()),
            Err(ResearchError::EmptyBatch)
        ));
    }

    #[test]
    fn test_terminal_rounds() {
        let mut s = state();
        s.iteration_count = 2;
        assert_eq!(s.rounds_executed(), 2);
        s.phase = ResearchPhase::Complete;
        assert!(s.is_complete());
        assert_eq!(s.rounds_executed(), 3);
        assert_eq!(s.status(), LoopStatus::Complete);
    }

    #[test]
    fn test_exhausted_phase_serialization() {
        let mut s = state();
        s.phase = ResearchPhase::Exhausted {
            reason: ExhaustionReason::MaxIterations { limit: 4 },
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: ResearchState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert_eq!(
            back.status(),
            LoopStatus::Exhausted(ExhaustionReason::MaxIterations { limit: 4 })
        );
        assert!(!back.is_complete());
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(ResearchPhase::Evaluating.label(), "evaluating");
        assert!(!ResearchPhase::Expanding.is_terminal());
        assert_eq!(
            ExhaustionReason::MaxQueries { limit: 20 }.to_string(),
            "query limit of 20 reached"
        );
    }
}
