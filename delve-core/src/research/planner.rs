//! Clarifying questions and research plan generation.
//!
//! Both run once before the loop. The plan's turn becomes the context every
//! later expansion chains to.

use crate::brain::LlmProvider;
use crate::error::{LlmError, ResearchError, Result};
use crate::research::prompts;
use crate::research::session::ResearchState;
use crate::types::{CompletionRequest, ModelTier, Query, TurnId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Questions asked to narrow down the research purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyingQuestions {
    pub questions: Vec<String>,
    pub turn_id: TurnId,
}

/// Goal and initial queries produced from the user's answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub goal: String,
    pub queries: Vec<Query>,
    /// Turn of the plan generation.
    pub context: TurnId,
}

impl ResearchPlan {
    /// Initial loop state for this plan.
    pub fn into_state(self) -> std::result::Result<ResearchState, ResearchError> {
        ResearchState::new(self.goal, self.context, self.queries)
    }
}

#[derive(Deserialize)]
struct PlanBody {
    goal: String,
    queries: Vec<String>,
}

pub struct ResearchPlanner {
    provider: Arc<dyn LlmProvider>,
    instructions: String,
    question_count: usize,
    queries_per_batch: usize,
}

impl ResearchPlanner {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        instructions: impl Into<String>,
        question_count: usize,
        queries_per_batch: usize,
    ) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
            question_count,
            queries_per_batch,
        }
    }

    /// Ask the light model for numbered clarifying questions about `topic`.
    pub async fn clarifying_questions(&self, topic: &str) -> Result<ClarifyingQuestions> {
        let request = CompletionRequest::text(prompts::clarify_prompt(topic, self.question_count))
            .with_tier(ModelTier::Light)
            .with_instructions(self.instructions.as_str());

        let response = self.provider.complete(request).await?;
        let questions = parse_questions(response.first_output_text()?);
        if questions.is_empty() {
            return Err(LlmError::malformed("no clarifying questions in response").into());
        }
        debug!(count = questions.len(), "Clarifying questions generated");
        Ok(ClarifyingQuestions {
            questions,
            turn_id: response.id,
        })
    }

    /// Build the research plan from the user's answers.
    ///
    /// `previous` is normally the questions turn.
    pub async fn plan(
        &self,
        topic: &str,
        questions: &[String],
        answers: &[String],
        previous: Option<&TurnId>,
    ) -> Result<ResearchPlan> {
        let prompt = prompts::plan_prompt(topic, questions, answers, self.queries_per_batch);
        let request = CompletionRequest::text(prompt)
            .with_instructions(self.instructions.as_str())
            .with_previous_turn(previous.cloned());

        let response = self.provider.complete(request).await?;
        let (goal, queries) = parse_plan(response.first_output_text()?)?;
        info!(goal = %goal, queries = queries.len(), "Research plan ready");
        Ok(ResearchPlan {
            goal,
            queries,
            context: response.id,
        })
    }
}

/// Split question text into trimmed, non-blank lines.
pub fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `{"goal": "...", "queries": [...]}`.
pub fn parse_plan(text: &str) -> std::result::Result<(String, Vec<Query>), LlmError> {
    let body: PlanBody = serde_json::from_str(text.trim())
        .map_err(|e| LlmError::parse(format!("expected a goal and queries object: {e}")))?;
    if body.goal.trim().is_empty() {
        return Err(LlmError::parse("plan goal is empty"));
    }
    if body.queries.is_empty() || body.queries.iter().any(|q| q.trim().is_empty()) {
        return Err(LlmError::parse("plan queries are missing or empty"));
    }
    Ok((body.goal, body.queries))
}
