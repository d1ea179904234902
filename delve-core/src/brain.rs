//! Brain module: completion service abstraction.
//!
//! Defines the `LlmProvider` trait every research collaborator talks to,
//! plus a queue-driven `MockLlmProvider` for tests and offline runs.

use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, ModelTier, OutputItem, OutputText, TokenUsage, TurnId,
    UrlCitation,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Trait for completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a completion and return the structured response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name serving the given tier.
    fn model_name(&self, tier: ModelTier) -> &str;

    /// Whether this provider can run hosted web search.
    fn supports_web_search(&self) -> bool {
        false
    }
}

/// A mock provider that replays queued responses in order.
///
/// Every request is recorded so tests can assert on prompts, tools and
/// conversational chaining.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    web_search: bool,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            web_search: true,
        }
    }

    /// Report no web search support, like a plain chat model.
    pub fn without_web_search(mut self) -> Self {
        self.web_search = false;
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Ok(response));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Err(error));
    }

    /// Queue a plain text answer.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue a search answer shaped like a hosted web-search response.
    pub fn queue_search(&self, text: &str) {
        self.queue_response(Self::search_response(text, Vec::new()));
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of queued responses not yet consumed.
    pub fn pending(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Create a single-item text response.
    pub fn text_response(text: &str) -> CompletionResponse {
        let id = TurnId::new(next_mock_id("resp"));
        CompletionResponse {
            output: vec![OutputItem::message(next_mock_id("msg"), text)],
            id,
            model: "mock-model".to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
        }
    }

    /// Create a two-item response: a web search call followed by the answer.
    pub fn search_response(text: &str, citations: Vec<UrlCitation>) -> CompletionResponse {
        let id = TurnId::new(next_mock_id("resp"));
        CompletionResponse {
            output: vec![
                OutputItem::web_search_call(next_mock_id("ws")),
                OutputItem {
                    id: next_mock_id("msg"),
                    kind: crate::types::OutputItemKind::Message,
                    content: vec![OutputText {
                        text: text.to_string(),
                        citations,
                    }],
                },
            ],
            id,
            model: "mock-model".to_string(),
            usage: TokenUsage {
                input_tokens: 200,
                output_tokens: 120,
            },
        }
    }
}

fn next_mock_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            ))
        } else {
            responses.remove(0)
        }
    }

    fn model_name(&self, _tier: ModelTier) -> &str {
        &self.model
    }

    fn supports_web_search(&self) -> bool {
        self.web_search
    }
}

/// Wraps a provider and totals the token usage of every response.
pub struct MeteredProvider {
    inner: Arc<dyn LlmProvider>,
    usage: Mutex<TokenUsage>,
}

impl MeteredProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        Self {
            inner,
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Usage summed over all successful completions so far.
    pub fn usage(&self) -> TokenUsage {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LlmProvider for MeteredProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self.inner.complete(request).await?;
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accumulate(&response.usage);
        Ok(response)
    }

    fn model_name(&self, tier: ModelTier) -> &str {
        self.inner.model_name(tier)
    }

    fn supports_web_search(&self) -> bool {
        self.inner.supports_web_search()
    }
}
