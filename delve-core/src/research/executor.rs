//! Query executor: runs one search query through the hosted web-search tool.

use crate::brain::LlmProvider;
use crate::error::{LlmError, ResearchError, Result};
use crate::research::prompts;
use crate::types::{
    CompletionRequest, CompletionResponse, ModelTier, SearchRecord, ToolDirective,
};
use std::sync::Arc;
use tracing::debug;

/// Runs a single query with web search enabled and normalizes the answer.
pub struct QueryExecutor {
    provider: Arc<dyn LlmProvider>,
    instructions: String,
}

impl QueryExecutor {
    pub fn new(provider: Arc<dyn LlmProvider>, instructions: impl Into<String>) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
        }
    }

    /// Execute one query. The returned record's `query` equals the input.
    pub async fn execute(&self, query: &str) -> Result<SearchRecord> {
        if query.trim().is_empty() {
            return Err(ResearchError::EmptyQuery.into());
        }
        if !self.provider.supports_web_search() {
            return Err(ResearchError::WebSearchUnsupported {
                model: self.provider.model_name(ModelTier::Heavy).to_string(),
            }
            .into());
        }
        let request = CompletionRequest::text(prompts::search_prompt(query))
            .with_instructions(self.instructions.as_str())
            .with_tool(ToolDirective::WebSearch);

        let response = self.provider.complete(request).await?;
        let record = Self::record_from_response(query, &response)?;
        debug!(
            query = %query,
            turn_id = %record.turn_id,
            chars = record.research_output.len(),
            citations = record.citations.len(),
            "Query executed"
        );
        Ok(record)
    }

    /// Build a record from a search response.
    ///
    /// A search response carries the tool call first and the synthesized
    /// answer second; the answer item supplies both id and text.
    pub fn record_from_response(
        query: &str,
        response: &CompletionResponse,
    ) -> std::result::Result<SearchRecord, LlmError> {
        let answer = response.output.get(1).ok_or_else(|| {
            LlmError::malformed(format!(
                "search response has {} output item(s), expected at least 2",
                response.output.len()
            ))
        })?;
        let part = answer.content.first().ok_or_else(|| {
            LlmError::malformed(format!("search answer item '{}' has no text", answer.id))
        })?;

        Ok(SearchRecord {
            query: query.to_string(),
            turn_id: crate::types::TurnId::new(answer.id.clone()),
            research_output: part.text.clone(),
            citations: answer
                .content
                .iter()
                .flat_map(|c| c.citations.iter().cloned())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::DelveError;
    use crate::types::{OutputItem, TokenUsage, TurnId, UrlCitation};

    fn executor(mock: &Arc<MockLlmProvider>) -> QueryExecutor {
        QueryExecutor::new(mock.clone(), "be thorough")
    }

    #[tokio::test]
    async fn test_execute_builds_record_from_second_item() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_response(MockLlmProvider::search_response(
            "Cobalt recovery is above 95%.",
            vec![UrlCitation {
                url: "https://example.org/a".into(),
                title: "A".into(),
            }],
        ));

        let record = executor(&mock).execute("cobalt recovery rates").await.unwrap();
        assert_eq!(record.query, "cobalt recovery rates");
        assert_eq!(record.research_output, "Cobalt recovery is above 95%.");
        assert!(record.turn_id.as_str().starts_with("msg_"));
        assert_eq!(record.citations.len(), 1);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].input.as_text(),
            Some("search: cobalt recovery rates")
        );
        assert_eq!(requests[0].tools, vec![ToolDirective::WebSearch]);
        assert_eq!(requests[0].instructions.as_deref(), Some("be thorough"));
        assert!(requests[0].previous_turn_id.is_none());
    }

    #[tokio::test]
    async fn test_execute_single_item_is_malformed() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("only one item");

        let err = executor(&mock).execute("q").await.unwrap_err();
        assert!(matches!(
            err,
            DelveError::Llm(LlmError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_rejects_blank_query() {
        let mock = Arc::new(MockLlmProvider::new());
        let err = executor(&mock).execute("   ").await.unwrap_err();
        assert!(matches!(err, DelveError::Research(ResearchError::EmptyQuery)));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_execute_requires_web_search() {
        let mock = Arc::new(MockLlmProvider::new().without_web_search());
        mock.queue_search("never sent");

        let err = executor(&mock).execute("q").await.unwrap_err();
        match err {
            DelveError::Research(ResearchError::WebSearchUnsupported { model }) => {
                assert_eq!(model, "mock-model");
            }
            other => panic!("Expected WebSearchUnsupported, got {:?}", other),
        }
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_execute_propagates_transport_error() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::Transport {
            message: "connection reset".into(),
        });
        let err = executor(&mock).execute("q").await.unwrap_err();
        assert!(err.as_llm().is_some_and(LlmError::is_transport));
    }

    #[test]
    fn test_record_from_answer_without_text() {
        let response = CompletionResponse {
            id: TurnId::new("resp_1"),
            model: "m".into(),
            output: vec![
                OutputItem::web_search_call("ws_1"),
                OutputItem::web_search_call("ws_2"),
            ],
            usage: TokenUsage::default(),
        };
        let err = QueryExecutor::record_from_response("q", &response).unwrap_err();
        assert!(err.to_string().contains("ws_2"));
    }
}
