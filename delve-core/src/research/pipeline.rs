//! End-to-end deep research: questions, plan, loop, report.

use super::engine::ResearchEngine;
use super::planner::ResearchPlanner;
use super::report::{ReportWriter, ResearchReport, RunSummary};
use super::session::{NoOpResearchCallback, ResearchCallback, ResearchState};
use crate::brain::{LlmProvider, MeteredProvider};
use crate::config::DelveConfig;
use crate::error::{ResearchError, Result};
use crate::types::TokenUsage;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub goal: String,
    pub questions: Vec<String>,
    pub state: ResearchState,
    pub report: ResearchReport,
    pub summary: RunSummary,
}

/// Wires the planner, loop engine and report writer around one provider.
pub struct DeepResearch {
    provider: Arc<MeteredProvider>,
    config: DelveConfig,
    callback: Arc<dyn ResearchCallback>,
    cancel: CancellationToken,
}

impl DeepResearch {
    pub fn new(provider: Arc<dyn LlmProvider>, config: DelveConfig) -> Self {
        Self {
            provider: Arc::new(MeteredProvider::new(provider)),
            config,
            callback: Arc::new(NoOpResearchCallback),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn planner(&self) -> ResearchPlanner {
        ResearchPlanner::new(
            self.provider.clone(),
            self.config.llm.instructions.as_str(),
            self.config.research.question_count,
            self.config.research.queries_per_batch,
        )
    }

    pub fn engine(&self) -> ResearchEngine {
        ResearchEngine::new(
            self.provider.clone(),
            &self.config.research,
            self.config.llm.instructions.as_str(),
        )
        .with_callback(self.callback.clone())
        .with_cancellation(self.cancel.clone())
    }

    pub fn report_writer(&self) -> ReportWriter {
        ReportWriter::new(self.provider.clone(), self.config.llm.instructions.as_str())
    }

    /// Tokens spent by every completion made through this pipeline.
    pub fn usage(&self) -> TokenUsage {
        self.provider.usage()
    }

    /// Race a collaborator call against this pipeline's cancellation token.
    pub async fn guarded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled.into());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ResearchError::Cancelled.into()),
            result = call => result,
        }
    }

    /// Run the whole workflow with answers supplied up front.
    pub async fn run(&self, topic: &str, answers: &[String]) -> Result<ResearchOutcome> {
        let planner = self.planner();
        let questions = self.guarded(planner.clarifying_questions(topic)).await?;
        let plan = self
            .guarded(planner.plan(
                topic,
                &questions.questions,
                answers,
                Some(&questions.turn_id),
            ))
            .await?;

        let mut state = plan.into_state()?;
        self.engine().run(&mut state).await?;
        self.finish(topic, questions.questions, state).await
    }

    /// Write the report for a terminal state and assemble the outcome.
    pub async fn finish(
        &self,
        topic: &str,
        questions: Vec<String>,
        state: ResearchState,
    ) -> Result<ResearchOutcome> {
        let writer = self.report_writer();
        let report = self
            .guarded(writer.write(&state.goal, &state.collected))
            .await?;
        let mut summary = RunSummary::from_state(topic, &state);
        summary.usage = self.usage();
        info!(
            topic = %topic,
            total_queries = summary.total_queries,
            iterations = summary.iterations,
            tokens = summary.usage.total(),
            "Deep research finished"
        );
        Ok(ResearchOutcome {
            goal: state.goal.clone(),
            questions,
            state,
            report,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::types::TurnId;

    fn finished_state() -> ResearchState {
        let mut state =
            ResearchState::new("goal", TurnId::new("resp_plan"), vec!["q1".into()]).unwrap();
        state.phase = crate::research::ResearchPhase::Complete;
        state
    }

    #[tokio::test]
    async fn test_finish_after_cancel_sends_nothing() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("# Report");
        let token = CancellationToken::new();
        token.cancel();

        let research = DeepResearch::new(mock.clone(), DelveConfig::default())
            .with_cancellation(token);
        let err = research
            .finish("t", Vec::new(), finished_state())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(mock.requests().is_empty());
        assert_eq!(mock.pending(), 1);
    }

    #[tokio::test]
    async fn test_run_after_cancel_skips_questions() {
        let mock = Arc::new(MockLlmProvider::new());
        let token = CancellationToken::new();
        token.cancel();

        let research = DeepResearch::new(mock.clone(), DelveConfig::default())
            .with_cancellation(token);
        let err = research.run("t", &[]).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_finish_reports_usage() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("# Report\nDone.");

        let research = DeepResearch::new(mock.clone(), DelveConfig::default());
        let outcome = research
            .finish("t", Vec::new(), finished_state())
            .await
            .unwrap();
        assert_eq!(outcome.summary.usage.total(), 150);
        assert_eq!(research.usage(), outcome.summary.usage);
    }
}
