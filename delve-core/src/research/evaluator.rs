//! Completeness evaluator: asks whether the collected records satisfy the goal.

use crate::brain::LlmProvider;
use crate::config::VerdictRule;
use crate::error::Result;
use crate::research::prompts;
use crate::types::{CompletionRequest, InputMessage, SearchRecord};
use std::sync::Arc;
use tracing::debug;

pub struct CompletenessEvaluator {
    provider: Arc<dyn LlmProvider>,
    instructions: String,
    rule: VerdictRule,
}

impl CompletenessEvaluator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        instructions: impl Into<String>,
        rule: VerdictRule,
    ) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
            rule,
        }
    }

    /// Judge the full collected history against the goal.
    pub async fn evaluate(&self, goal: &str, collected: &[SearchRecord]) -> Result<bool> {
        let history = serde_json::to_string(collected)?;
        let request = CompletionRequest::dialogue(vec![
            InputMessage::developer(prompts::goal_turn(goal)),
            InputMessage::assistant(history),
            InputMessage::user(prompts::VERDICT_QUESTION),
        ])
        .with_instructions(self.instructions.as_str());

        let response = self.provider.complete(request).await?;
        let text = response.first_output_text()?;
        let satisfied = parse_verdict(text, self.rule);
        debug!(
            verdict = %text.trim(),
            satisfied,
            records = collected.len(),
            "Completeness verdict"
        );
        Ok(satisfied)
    }
}

/// Turn verdict text into a boolean under the given rule.
pub fn parse_verdict(text: &str, rule: VerdictRule) -> bool {
    match rule {
        VerdictRule::Substring => text.to_lowercase().contains("yes"),
        VerdictRule::Strict => text
            .split_whitespace()
            .next()
            .map(|word| {
                word.trim_matches(|c: char| !c.is_alphanumeric())
                    .eq_ignore_ascii_case("yes")
            })
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::types::{Role, TurnId};

    #[test]
    fn test_substring_rule() {
        for text in ["Yes.", "yes, partially", "YES", "I would say yes"] {
            assert!(parse_verdict(text, VerdictRule::Substring), "{text}");
        }
        for text in ["No.", "Not yet.", ""] {
            assert!(!parse_verdict(text, VerdictRule::Substring), "{text}");
        }
    }

    #[test]
    fn test_strict_rule() {
        assert!(parse_verdict("Yes.", VerdictRule::Strict));
        assert!(parse_verdict("  **YES**", VerdictRule::Strict));
        assert!(!parse_verdict("I would say yes", VerdictRule::Strict));
        assert!(!parse_verdict("No, yes later", VerdictRule::Strict));
        assert!(!parse_verdict("", VerdictRule::Strict));
    }

    #[tokio::test]
    async fn test_evaluate_sends_three_turn_dialogue() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("Yes.");
        let evaluator =
            CompletenessEvaluator::new(mock.clone(), "instr", VerdictRule::Substring);

        let records = vec![SearchRecord {
            query: "q1".into(),
            turn_id: TurnId::new("msg_1"),
            research_output: "out".into(),
            citations: Vec::new(),
        }];
        assert!(evaluator.evaluate("the goal", &records).await.unwrap());

        let requests = mock.requests();
        let request = &requests[0];
        let turns = request.input.messages();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::Developer);
        assert_eq!(turns[0].content, "Research goal: the goal");
        assert_eq!(turns[1].role, Role::Assistant);
        let history: Vec<SearchRecord> = serde_json::from_str(&turns[1].content).unwrap();
        assert_eq!(history, records);
        assert_eq!(turns[2].role, Role::User);
        assert_eq!(turns[2].content, prompts::VERDICT_QUESTION);
        assert!(request.tools.is_empty());
        assert!(request.previous_turn_id.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_negative_verdict() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("No.");
        let evaluator = CompletenessEvaluator::new(mock, "instr", VerdictRule::Substring);
        assert!(!evaluator.evaluate("g", &[]).await.unwrap());
    }
}
