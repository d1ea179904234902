//! Query expander: requests a fresh batch when the goal is not yet met.

use crate::brain::LlmProvider;
use crate::error::{LlmError, Result};
use crate::research::prompts;
use crate::types::{CompletionRequest, InputMessage, Query, SearchRecord, TurnId};
use std::sync::Arc;
use tracing::debug;

pub struct QueryExpander {
    provider: Arc<dyn LlmProvider>,
    instructions: String,
    queries_per_batch: usize,
}

impl QueryExpander {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        instructions: impl Into<String>,
        queries_per_batch: usize,
    ) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
            queries_per_batch,
        }
    }

    /// Ask for the next batch of queries.
    ///
    /// `context` is the plan-generation turn; the request always chains to
    /// it, never to an evaluation turn.
    pub async fn expand(
        &self,
        goal: &str,
        collected: &[SearchRecord],
        context: &TurnId,
    ) -> Result<Vec<Query>> {
        let data = serde_json::to_string(collected)?;
        let request = CompletionRequest::dialogue(vec![
            InputMessage::assistant(prompts::current_data_turn(&data)),
            InputMessage::user(prompts::expansion_request(goal, self.queries_per_batch)),
        ])
        .with_instructions(self.instructions.as_str())
        .with_previous_turn(Some(context.clone()));

        let response = self.provider.complete(request).await?;
        let queries = parse_query_list(response.first_output_text()?)?;
        debug!(count = queries.len(), "Expanded query batch");
        Ok(queries)
    }
}

/// Parse a JSON array of non-empty query strings.
pub fn parse_query_list(text: &str) -> std::result::Result<Vec<Query>, LlmError> {
    let queries: Vec<String> = serde_json::from_str(text.trim())
        .map_err(|e| LlmError::parse(format!("expected a JSON array of strings: {e}")))?;
    if queries.is_empty() {
        return Err(LlmError::parse("query list is empty"));
    }
    if let Some(pos) = queries.iter().position(|q| q.trim().is_empty()) {
        return Err(LlmError::parse(format!("query at index {pos} is empty")));
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::DelveError;
    use crate::types::Role;

    #[test]
    fn test_parse_query_list() {
        let queries = parse_query_list(r#"["a", "b c"]"#).unwrap();
        assert_eq!(queries, vec!["a".to_string(), "b c".to_string()]);
    }

    #[test]
    fn test_parse_query_list_rejects_bad_shapes() {
        for text in [
            "not json",
            "[]",
            r#"{"queries": ["a"]}"#,
            r#"["a", 3]"#,
            r#"["a", "  "]"#,
            "```json\n[\"a\"]\n```",
        ] {
            let err = parse_query_list(text).unwrap_err();
            assert!(matches!(err, LlmError::ResponseParse { .. }), "{text}");
        }
    }

    #[tokio::test]
    async fn test_expand_chains_to_plan_context() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text(r#"["second-life storage", "recycling policy EU"]"#);
        let expander = QueryExpander::new(mock.clone(), "instr", 2);

        let queries = expander
            .expand("g", &[], &TurnId::new("resp_plan"))
            .await
            .unwrap();
        assert_eq!(queries.len(), 2);

        let requests = mock.requests();
        let request = &requests[0];
        assert_eq!(
            request.previous_turn_id.as_ref().map(TurnId::as_str),
            Some("resp_plan")
        );
        let turns = request.input.messages();
        assert_eq!(turns[0].role, Role::Assistant);
        assert_eq!(turns[0].content, "Current data: []");
        assert_eq!(turns[1].role, Role::User);
        assert!(turns[1].content.contains("2 other web searches"));
    }

    #[tokio::test]
    async fn test_expand_parse_failure_surfaces() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("Here are five more searches: ...");
        let expander = QueryExpander::new(mock, "instr", 5);
        let err = expander
            .expand("g", &[], &TurnId::new("resp_plan"))
            .await
            .unwrap_err();
        assert!(matches!(err, DelveError::Llm(LlmError::ResponseParse { .. })));
    }
}
