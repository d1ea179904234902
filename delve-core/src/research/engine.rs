//! Research engine: drives the execute, evaluate, expand loop.

use super::evaluator::CompletenessEvaluator;
use super::executor::QueryExecutor;
use super::expander::QueryExpander;
use super::prompts;
use super::session::{
    ExhaustionReason, LoopStatus, NoOpResearchCallback, ResearchCallback, ResearchPhase,
    ResearchState,
};
use crate::brain::LlmProvider;
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::types::{Query, SearchRecord};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Limits that stop an otherwise unbounded loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopLimits {
    /// Maximum executed batches.
    pub max_iterations: Option<usize>,
    /// Maximum collected records.
    pub max_queries: Option<usize>,
}

impl LoopLimits {
    /// Limits from config; a limit of 0 means no limit.
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            max_iterations: config.max_iterations.filter(|&n| n > 0),
            max_queries: config.max_queries.filter(|&n| n > 0),
        }
    }

    /// Check limits after a round with a negative verdict.
    pub fn check(&self, rounds_executed: usize, records: usize) -> Option<ExhaustionReason> {
        if let Some(limit) = self.max_iterations
            && rounds_executed >= limit
        {
            return Some(ExhaustionReason::MaxIterations { limit });
        }
        if let Some(limit) = self.max_queries
            && records >= limit
        {
            return Some(ExhaustionReason::MaxQueries { limit });
        }
        None
    }
}

/// Orchestrates research rounds over a caller-owned `ResearchState`.
pub struct ResearchEngine {
    executor: QueryExecutor,
    evaluator: CompletenessEvaluator,
    expander: QueryExpander,
    limits: LoopLimits,
    concurrency: usize,
    callback: Arc<dyn ResearchCallback>,
    cancel: CancellationToken,
}

impl ResearchEngine {
    /// Create an engine whose collaborators all share `provider`.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &ResearchConfig,
        instructions: impl Into<String>,
    ) -> Self {
        let instructions = instructions.into();
        Self {
            executor: QueryExecutor::new(provider.clone(), instructions.as_str()),
            evaluator: CompletenessEvaluator::new(
                provider.clone(),
                instructions.as_str(),
                config.verdict_rule,
            ),
            expander: QueryExpander::new(provider, instructions, config.queries_per_batch),
            limits: LoopLimits::from_config(config),
            concurrency: config.query_concurrency.max(1),
            callback: Arc::new(NoOpResearchCallback),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Use an externally owned token so a signal handler can stop the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run one round: execute the batch, evaluate, then stop or expand.
    ///
    /// A terminal state is returned unchanged. On error the state is left as
    /// it was before the call.
    pub async fn advance(&self, state: &mut ResearchState) -> Result<LoopStatus> {
        if state.is_terminal() {
            return Ok(state.status());
        }
        if state.current_batch.is_empty() {
            return Err(ResearchError::EmptyBatch.into());
        }

        let committed = state.collected.len();
        let result = self.round(state).await;
        if result.is_err() {
            state.collected.truncate(committed);
            state.phase = ResearchPhase::AwaitingBatch;
        }
        result
    }

    /// Advance until the state is terminal.
    pub async fn run(&self, state: &mut ResearchState) -> Result<LoopStatus> {
        loop {
            let status = self.advance(state).await?;
            if status.is_terminal() {
                return Ok(status);
            }
        }
    }

    async fn round(&self, state: &mut ResearchState) -> Result<LoopStatus> {
        let iteration = state.iteration_count;
        info!(
            iteration,
            batch_size = state.current_batch.len(),
            collected = state.collected.len(),
            queries = %prompts::batch_preview(&state.current_batch),
            "Executing query batch"
        );
        self.callback
            .on_phase_change(&ResearchPhase::ExecutingBatch, iteration);
        let records = self.execute_batch(&state.current_batch).await?;
        state.collected.extend(records);

        self.callback
            .on_phase_change(&ResearchPhase::Evaluating, iteration);
        let satisfied = self
            .guarded(self.evaluator.evaluate(&state.goal, &state.collected))
            .await?;
        self.callback.on_verdict(satisfied, state.collected.len());

        if satisfied {
            info!(
                iteration,
                collected = state.collected.len(),
                "Research goal satisfied"
            );
            state.phase = ResearchPhase::Complete;
            self.callback.on_phase_change(&state.phase, iteration);
            return Ok(LoopStatus::Complete);
        }

        if let Some(reason) = self.limits.check(iteration + 1, state.collected.len()) {
            warn!(
                iteration,
                collected = state.collected.len(),
                reason = %reason,
                "Research stopped before the goal was satisfied"
            );
            state.phase = ResearchPhase::Exhausted { reason };
            self.callback.on_phase_change(&state.phase, iteration);
            return Ok(LoopStatus::Exhausted(reason));
        }

        self.callback
            .on_phase_change(&ResearchPhase::Expanding, iteration);
        let next_batch = self
            .guarded(
                self.expander
                    .expand(&state.goal, &state.collected, &state.context),
            )
            .await?;

        self.callback.on_expansion(&next_batch);
        state.current_batch = next_batch;
        state.iteration_count += 1;
        state.phase = ResearchPhase::AwaitingBatch;
        self.callback
            .on_phase_change(&state.phase, state.iteration_count);
        Ok(LoopStatus::Continuing)
    }

    /// Execute a batch in order. With `concurrency > 1` up to that many
    /// queries are in flight, but records still come back in batch order.
    async fn execute_batch(&self, batch: &[Query]) -> Result<Vec<SearchRecord>> {
        let total = batch.len();
        let mut results = std::pin::pin!(
            futures::stream::iter(batch)
                .map(|query| self.executor.execute(query))
                .buffered(self.concurrency)
        );

        let mut records = Vec::with_capacity(total);
        loop {
            self.check_cancelled()?;
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ResearchError::Cancelled.into()),
                next = results.next() => next,
            };
            let Some(result) = next else { break };
            let record = result?;
            self.callback
                .on_query_complete(&record, records.len() + 1, total);
            records.push(record);
        }
        Ok(records)
    }

    /// Race a collaborator call against cancellation.
    async fn guarded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        self.check_cancelled()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ResearchError::Cancelled.into()),
            result = call => result,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::{DelveError, LlmError};
    use crate::types::TurnId;
    use std::sync::Mutex;

    fn config() -> ResearchConfig {
        ResearchConfig {
            max_iterations: None,
            ..Default::default()
        }
    }

    fn state(batch: &[&str]) -> ResearchState {
        ResearchState::new(
            "Assess recycling options",
            TurnId::new("resp_plan"),
            batch.iter().map(|q| q.to_string()).collect(),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct RecordingCallback {
        events: Mutex<Vec<String>>,
    }

    impl ResearchCallback for RecordingCallback {
        fn on_phase_change(&self, phase: &ResearchPhase, iteration: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}@{}", phase.label(), iteration));
        }
        fn on_query_complete(&self, record: &SearchRecord, position: usize, batch_size: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("query {}/{} {}", position, batch_size, record.query));
        }
        fn on_verdict(&self, satisfied: bool, collected: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("verdict {satisfied} {collected}"));
        }
        fn on_expansion(&self, queries: &[Query]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("expanded {}", queries.len()));
        }
    }

    #[test]
    fn test_limits_check() {
        let limits = LoopLimits {
            max_iterations: Some(2),
            max_queries: Some(10),
        };
        assert_eq!(limits.check(1, 5), None);
        assert_eq!(
            limits.check(2, 5),
            Some(ExhaustionReason::MaxIterations { limit: 2 })
        );
        assert_eq!(
            limits.check(1, 10),
            Some(ExhaustionReason::MaxQueries { limit: 10 })
        );
        assert_eq!(LoopLimits::default().check(100, 1000), None);
    }

    #[test]
    fn test_zero_limits_mean_unbounded() {
        let config = ResearchConfig {
            max_iterations: Some(0),
            max_queries: Some(0),
            ..Default::default()
        };
        assert_eq!(LoopLimits::from_config(&config), LoopLimits::default());
        assert_eq!(
            LoopLimits::from_config(&ResearchConfig::default()).max_iterations,
            Some(8)
        );
    }

    #[tokio::test]
    async fn test_advance_completes_on_yes() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_search("a");
        mock.queue_search("b");
        mock.queue_text("Yes.");

        let engine = ResearchEngine::new(mock.clone(), &config(), "instr");
        let mut s = state(&["q1", "q2"]);
        let status = engine.advance(&mut s).await.unwrap();

        assert_eq!(status, LoopStatus::Complete);
        assert!(s.is_complete());
        assert_eq!(s.collected.len(), 2);
        assert_eq!(s.collected[0].query, "q1");
        assert_eq!(s.collected[1].query, "q2");
        assert_eq!(s.iteration_count, 0);
        assert_eq!(mock.pending(), 0);
    }

    #[tokio::test]
    async fn test_advance_on_terminal_state_does_nothing() {
        let mock = Arc::new(MockLlmProvider::new());
        let engine = ResearchEngine::new(mock.clone(), &config(), "instr");
        let mut s = state(&["q1"]);
        s.phase = ResearchPhase::Complete;
        let before = s.clone();

        let status = engine.advance(&mut s).await.unwrap();
        assert_eq!(status, LoopStatus::Complete);
        assert_eq!(s, before);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_advance_expands_on_no() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_search("a");
        mock.queue_text("No.");
        mock.queue_text(r#"["q2", "q3"]"#);

        let engine = ResearchEngine::new(mock.clone(), &config(), "instr");
        let mut s = state(&["q1"]);
        let status = engine.advance(&mut s).await.unwrap();

        assert_eq!(status, LoopStatus::Continuing);
        assert_eq!(s.phase, ResearchPhase::AwaitingBatch);
        assert_eq!(s.current_batch, vec!["q2".to_string(), "q3".to_string()]);
        assert_eq!(s.iteration_count, 1);
        assert_eq!(s.collected.len(), 1);
    }

    #[tokio::test]
    async fn test_executor_error_leaves_state_at_boundary() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_search("a");
        mock.queue_error(LlmError::Transport {
            message: "reset".into(),
        });

        let engine = ResearchEngine::new(mock.clone(), &config(), "instr");
        let mut s = state(&["q1", "q2", "q3"]);
        let before = s.clone();
        let err = engine.advance(&mut s).await.unwrap_err();

        assert!(matches!(err, DelveError::Llm(LlmError::Transport { .. })));
        assert_eq!(s, before);
        // No evaluation after a failed query.
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_expander_error_leaves_state_at_boundary() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_search("a");
        mock.queue_text("No");
        mock.queue_text("five more queries, coming up");

        let engine = ResearchEngine::new(mock.clone(), &config(), "instr");
        let mut s = state(&["q1"]);
        let before = s.clone();
        let err = engine.advance(&mut s).await.unwrap_err();

        assert!(matches!(err, DelveError::Llm(LlmError::ResponseParse { .. })));
        assert_eq!(s, before);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let mock = Arc::new(MockLlmProvider::new());
        let engine = ResearchEngine::new(mock, &config(), "instr");
        let mut s = state(&["q1"]);
        s.current_batch.clear();
        let err = engine.advance(&mut s).await.unwrap_err();
        assert!(matches!(err, DelveError::Research(ResearchError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_max_iterations_exhausts() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_search("a");
        mock.queue_text("No.");
        mock.queue_text(r#"["q2"]"#);
        mock.queue_search("b");
        mock.queue_text("No.");

        let cfg = ResearchConfig {
            max_iterations: Some(2),
            ..Default::default()
        };
        let engine = ResearchEngine::new(mock.clone(), &cfg, "instr");
        let mut s = state(&["q1"]);
        let status = engine.run(&mut s).await.unwrap();

        assert_eq!(
            status,
            LoopStatus::Exhausted(ExhaustionReason::MaxIterations { limit: 2 })
        );
        assert_eq!(s.collected.len(), 2);
        assert_eq!(s.iteration_count, 1);
        assert_eq!(s.rounds_executed(), 2);
        assert!(!s.is_complete());
        assert_eq!(mock.pending(), 0);
    }

    #[tokio::test]
    async fn test_max_queries_exhausts() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_search("a");
        mock.queue_search("b");
        mock.queue_text("No.");

        let cfg = ResearchConfig {
            max_iterations: None,
            max_queries: Some(2),
            ..Default::default()
        };
        let engine = ResearchEngine::new(mock, &cfg, "instr");
        let mut s = state(&["q1", "q2"]);
        let status = engine.advance(&mut s).await.unwrap();
        assert_eq!(
            status,
            LoopStatus::Exhausted(ExhaustionReason::MaxQueries { limit: 2 })
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_round() {
        let mock = Arc::new(MockLlmProvider::new());
        let token = CancellationToken::new();
        let engine =
            ResearchEngine::new(mock.clone(), &config(), "instr").with_cancellation(token.clone());
        token.cancel();

        let mut s = state(&["q1"]);
        let before = s.clone();
        let err = engine.advance(&mut s).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(s, before);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_batch_preserves_order() {
        let mock = Arc::new(MockLlmProvider::new());
        for text in ["a", "b", "c", "d"] {
            mock.queue_search(text);
        }
        mock.queue_text("yes");

        let cfg = ResearchConfig {
            query_concurrency: 3,
            ..config()
        };
        let engine = ResearchEngine::new(mock, &cfg, "instr");
        let mut s = state(&["q1", "q2", "q3", "q4"]);
        engine.advance(&mut s).await.unwrap();

        let queries: Vec<&str> = s.collected.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["q1", "q2", "q3", "q4"]);
    }

    #[tokio::test]
    async fn test_callback_sequence() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_search("a");
        mock.queue_text("No.");
        mock.queue_text(r#"["q2"]"#);

        let callback = Arc::new(RecordingCallback::default());
        let engine = ResearchEngine::new(mock, &config(), "instr").with_callback(callback.clone());
        let mut s = state(&["q1"]);
        engine.advance(&mut s).await.unwrap();

        let events = callback.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "executing batch@0",
                "query 1/1 q1",
                "evaluating@0",
                "verdict false 1",
                "expanding@0",
                "expanded 1",
                "awaiting batch@1",
            ]
        );
    }
}
