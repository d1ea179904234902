//! OpenAI Responses API provider.
//!
//! Speaks `POST {base_url}/responses`, which accepts either a plain prompt
//! or a list of role-tagged turns, supports the hosted `web_search` tool and
//! chains turns through `previous_response_id`.

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use crate::types::{
    CompletionInput, CompletionRequest, CompletionResponse, ModelTier, OutputItem, OutputItemKind,
    OutputText, TokenUsage, TurnId, UrlCitation,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Completion provider backed by the OpenAI Responses API.
pub struct OpenAiResponsesProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    light_model: String,
    retry: RetryConfig,
    timeout_secs: u64,
}

impl OpenAiResponsesProvider {
    /// Create a new provider, reading the API key from `config.api_key_env`.
    pub fn new(config: &LlmConfig, retry: RetryConfig) -> Result<Self, LlmError> {
        let api_key = super::resolve_api_key(config)?;
        Self::new_with_key(config, retry, api_key)
    }

    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(
        config: &LlmConfig,
        retry: RetryConfig,
        api_key: String,
    ) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            light_model: config.light_model.clone(),
            retry,
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Build the JSON request body.
    fn request_body(&self, request: &CompletionRequest) -> Value {
        let input = match &request.input {
            CompletionInput::Text(text) => json!(text),
            CompletionInput::Dialogue(messages) => json!(
                messages
                    .iter()
                    .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
                    .collect::<Vec<_>>()
            ),
        };

        let mut body = json!({
            "model": self.model_name(request.tier),
            "input": input,
        });
        if let Some(instructions) = &request.instructions {
            body["instructions"] = json!(instructions);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|t| json!({ "type": t.as_str() }))
                    .collect::<Vec<_>>()
            );
        }
        if let Some(previous) = &request.previous_turn_id {
            body["previous_response_id"] = json!(previous.as_str());
        }
        body
    }

    async fn send_once(&self, body: &Value) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/responses", self.base_url);
        debug!(url = %url, model = %body["model"], "Sending Responses API request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value = serde_json::from_str(&response_body)
            .map_err(|e| LlmError::malformed(format!("Invalid JSON body: {}", e)))?;

        Self::parse_response(&json, &self.model)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            LlmError::Transport {
                message: format!("Request failed: {}", err),
            }
        }
    }

    /// Parse a Responses API body into a `CompletionResponse`.
    fn parse_response(json: &Value, fallback_model: &str) -> Result<CompletionResponse, LlmError> {
        let id = json["id"]
            .as_str()
            .ok_or_else(|| LlmError::malformed("response has no id"))?;
        let items = json["output"]
            .as_array()
            .ok_or_else(|| LlmError::malformed("response has no output list"))?;

        let output = items.iter().map(Self::parse_output_item).collect();

        let usage = TokenUsage {
            input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
            output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
        };

        Ok(CompletionResponse {
            id: TurnId::new(id),
            model: json["model"]
                .as_str()
                .unwrap_or(fallback_model)
                .to_string(),
            output,
            usage,
        })
    }

    fn parse_output_item(item: &Value) -> OutputItem {
        let kind = match item["type"].as_str().unwrap_or_default() {
            "web_search_call" => OutputItemKind::WebSearchCall,
            "message" => OutputItemKind::Message,
            other => OutputItemKind::Other(other.to_string()),
        };

        let content = item["content"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter(|p| p["type"] == "output_text")
                    .filter_map(|p| {
                        let text = p["text"].as_str()?;
                        Some(OutputText {
                            text: text.to_string(),
                            citations: Self::parse_citations(&p["annotations"]),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        OutputItem {
            id: item["id"].as_str().unwrap_or_default().to_string(),
            kind,
            content,
        }
    }

    fn parse_citations(annotations: &Value) -> Vec<UrlCitation> {
        annotations
            .as_array()
            .map(|list| {
                list.iter()
                    .filter(|a| a["type"] == "url_citation")
                    .filter_map(|a| {
                        Some(UrlCitation {
                            url: a["url"].as_str()?.to_string(),
                            title: a["title"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Map an HTTP status code to the appropriate LlmError.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed ({})", status.as_u16());
                LlmError::AuthFailed {
                    provider: "openai".to_string(),
                }
            }
            429 => {
                // "Rate limit reached ... Please try again in 7s."
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                    .and_then(|msg| {
                        msg.split("in ").last().and_then(|s| {
                            s.trim_end_matches('.')
                                .trim_end_matches('s')
                                .parse::<f64>()
                                .ok()
                        })
                    })
                    .map(|secs| secs.ceil() as u64)
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            code if code >= 500 => LlmError::Transport {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::Transport {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiResponsesProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.request_body(&request);
        super::with_retry(&self.retry, || self.send_once(&body)).await
    }

    fn model_name(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Light => &self.light_model,
            ModelTier::Heavy => &self.model,
        }
    }

    fn supports_web_search(&self) -> bool {
        true
    }
}
