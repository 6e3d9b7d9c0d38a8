//! OpenAI chat-completions contextualizer.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use adaptest_core::model::Item;
use adaptest_core::traits::{extract_json_object, Contextualizer, ItemContext};

use crate::error::ContextError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const TEMPERATURE: f64 = 0.2;
const MAX_TOKENS: u32 = 256;
const SYSTEM_PROMPT: &str = "You are an introductory mathematics teacher. Answer in Spanish, \
in clear, simple and general language. When asked to contextualize a statement for a \
diagnostic test, produce a valid JSON object with the keys: display_text, exercise, \
learning_objective, tags, hint (optional). Do not reference degree programs or \
specialties, and do not add contextualizing examples.";

/// Rephrases item statements through an OpenAI-compatible chat API.
pub struct OpenAiContextualizer {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiContextualizer {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        model: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// The item as described to the model.
#[derive(Serialize)]
struct ItemPayload<'a> {
    exercise: &'a str,
    kind: &'a str,
    level: &'a str,
    usage: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

/// The JSON object the model is asked to produce.
#[derive(Deserialize)]
struct ContextPayload {
    display_text: String,
    #[serde(default)]
    learning_objective: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Turn the raw model output into a presentation payload.
fn parse_context(content: &str, item: &Item) -> Result<ItemContext, ContextError> {
    let json = extract_json_object(content)
        .ok_or_else(|| ContextError::MalformedPayload("no JSON object in response".into()))?;
    let payload: ContextPayload = serde_json::from_str(json)
        .map_err(|e| ContextError::MalformedPayload(e.to_string()))?;
    if payload.display_text.trim().is_empty() {
        return Err(ContextError::MalformedPayload("display_text is empty".into()));
    }

    Ok(ItemContext {
        display_text: payload.display_text,
        hint: payload.hint.filter(|h| !h.trim().is_empty()),
        learning_objective: payload.learning_objective,
        tags: if payload.tags.is_empty() {
            item.tags.clone()
        } else {
            payload.tags
        },
        note: None,
    })
}

#[async_trait]
impl Contextualizer for OpenAiContextualizer {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, item), fields(item_id = item.id, model = %self.model))]
    async fn contextualize(&self, item: &Item) -> anyhow::Result<ItemContext> {
        let payload = ItemPayload {
            exercise: &item.statement,
            kind: "diagnostic",
            level: "basic",
            usage: "initial diagnostic test",
        };

        let body = ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: serde_json::to_string(&payload)?,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ContextError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    ContextError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                .saturating_mul(1000);
            return Err(ContextError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(ContextError::AuthenticationFailed(body).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ContextError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: ChatResponse = response.json().await.map_err(|e| {
            ContextError::MalformedPayload(format!("failed to parse response: {e}"))
        })?;
        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        Ok(parse_context(content, item)?)
    }
}
