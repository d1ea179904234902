//! Core type definitions for Delve.
//!
//! Defines the request/response shapes exchanged with the completion
//! service and the records accumulated by a research run.

use serde::{Deserialize, Serialize};

/// Represents a participant role in a dialogue input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::Developer => write!(f, "developer"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single turn in a dialogue-shaped input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: Role,
    pub content: String,
}

impl InputMessage {
    pub fn developer(text: impl Into<String>) -> Self {
        Self {
            role: Role::Developer,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Input for a completion: a plain prompt or a short dialogue.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionInput {
    Text(String),
    Dialogue(Vec<InputMessage>),
}

impl CompletionInput {
    /// Plain prompt text, if this is a text input.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CompletionInput::Text(text) => Some(text),
            CompletionInput::Dialogue(_) => None,
        }
    }

    /// Dialogue turns, if this is a dialogue input.
    pub fn messages(&self) -> &[InputMessage] {
        match self {
            CompletionInput::Text(_) => &[],
            CompletionInput::Dialogue(messages) => messages,
        }
    }
}

/// Which model a request should run on.
///
/// The light tier is only used for clarifying questions; planning, search,
/// evaluation, expansion and reporting all use the heavy tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Light,
    Heavy,
}

/// Hosted tools the service may invoke while answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDirective {
    WebSearch,
}

impl ToolDirective {
    /// Wire name of the tool type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolDirective::WebSearch => "web_search",
        }
    }
}

/// Opaque identifier of one request/response exchange.
///
/// Produced by one call and threaded into a later one through
/// `previous_turn_id`. Never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to the completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub tier: ModelTier,
    pub input: CompletionInput,
    pub instructions: Option<String>,
    pub tools: Vec<ToolDirective>,
    pub previous_turn_id: Option<TurnId>,
}

impl CompletionRequest {
    /// A heavy-tier request with a plain text prompt.
    pub fn text(input: impl Into<String>) -> Self {
        Self {
            tier: ModelTier::Heavy,
            input: CompletionInput::Text(input.into()),
            instructions: None,
            tools: Vec::new(),
            previous_turn_id: None,
        }
    }

    /// A heavy-tier request with a dialogue input.
    pub fn dialogue(messages: Vec<InputMessage>) -> Self {
        Self {
            tier: ModelTier::Heavy,
            input: CompletionInput::Dialogue(messages),
            instructions: None,
            tools: Vec::new(),
            previous_turn_id: None,
        }
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolDirective) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_previous_turn(mut self, turn: Option<TurnId>) -> Self {
        self.previous_turn_id = turn;
        self
    }
}

/// Kind of an output item in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputItemKind {
    /// Tool-invocation metadata (e.g. a web search call).
    WebSearchCall,
    /// Synthesized answer text.
    Message,
    Other(String),
}

/// A source URL attached to a span of output text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCitation {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
}

/// One text part inside an output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<UrlCitation>,
}

impl OutputText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }
}

/// One entry of the ordered `output` list of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    pub id: String,
    pub kind: OutputItemKind,
    #[serde(default)]
    pub content: Vec<OutputText>,
}

impl OutputItem {
    /// A message item carrying a single text part.
    pub fn message(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: OutputItemKind::Message,
            content: vec![OutputText::new(text)],
        }
    }

    /// A web search call item with no text content.
    pub fn web_search_call(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: OutputItemKind::WebSearchCall,
            content: Vec::new(),
        }
    }

    /// Text of the first content part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| c.text.as_str())
    }
}

/// Token usage statistics for a single completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A response from the completion service.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Turn identifier usable as a later `previous_turn_id`.
    pub id: TurnId,
    pub model: String,
    /// Ordered output items as returned by the service.
    pub output: Vec<OutputItem>,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Text of the first content part of the first output item.
    ///
    /// Calls without tools answer with a single message item, so this is
    /// where their text lives.
    pub fn first_output_text(&self) -> Result<&str, crate::error::LlmError> {
        let item = self
            .output
            .first()
            .ok_or_else(|| crate::error::LlmError::malformed("response has no output items"))?;
        item.first_text().ok_or_else(|| {
            crate::error::LlmError::malformed(format!("output item '{}' has no text", item.id))
        })
    }
}

/// A search query text.
pub type Query = String;

/// The outcome of executing one query.
///
/// Records are immutable once created and appended to the run's collected
/// history in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: Query,
    pub turn_id: TurnId,
    pub research_output: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<UrlCitation>,
}
