//! Optional advisory suggester, consulted only when no rule matched.
//!
//! A suggester proposes at most one action and never executes anything. The
//! agent forces the suggestion's source to `llm` and sends it through the
//! same guard as rule actions.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::action::Action;
use crate::config::LlmConfig;
use crate::context::{Context, Scalar};
use crate::error::{Result, TaniclawError};

const SYSTEM_PROMPT: &str = r#"You are TaniClaw, a lightweight plant-care assistant.
Suggest exactly ONE practical action for the plant described by the user.

Rules:
- Respond with a single JSON object and nothing else.
- Allowed action types: water, skip_water, fertilize, harvest, notify, alert, log.
- Keep the description short and practical (at most 150 characters).
- You cannot execute actions, only suggest them.

Response format:
{"type": "water", "description": "...", "amount_ml": 300, "amount_grams": null}"#;

#[async_trait]
pub trait AdvisorySuggester: Send + Sync {
    async fn suggest(&self, context: &Context) -> Option<Action>;
}

// ---------------------------------------------------------------------------
// ChatCompletionsSuggester
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint. Tries the
/// primary model, then the fallback.
pub struct ChatCompletionsSuggester {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    models: Vec<String>,
}

impl ChatCompletionsSuggester {
    /// `None` when the advisory is disabled or has no key.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>> {
        if !config.is_usable() {
            if config.enabled {
                tracing::warn!("llm enabled but no API key set, advisory disabled");
            }
            return Ok(None);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let mut models = vec![config.model.clone()];
        if config.fallback_model != config.model {
            models.push(config.fallback_model.clone());
        }
        tracing::info!(model = %config.model, "advisory suggester enabled");
        Ok(Some(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            models,
        }))
    }

    async fn ask(&self, model: &str, prompt: &str) -> Result<Action> {
        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": 300,
            "temperature": 0.3,
            "response_format": { "type": "json_object" },
        });
        let resp: CompletionResponse = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TaniclawError::Http("completion had no content".to_string()))?;
        Ok(serde_json::from_str(content.trim())?)
    }
}

/// Single structured prompt built from the context. No conversation history.
pub fn build_prompt(ctx: &Context) -> String {
    let field = |name: &str, default: &str| {
        ctx.get(name)
            .map(Scalar::to_string)
            .unwrap_or_else(|| default.to_string())
    };
    format!(
        "What action should I take for this plant?\n\n\
         Plant: {} ({})\n\
         State: {}\n\
         Days since planting: {}\n\
         Days in current state: {}\n\
         Days since last watering: {}\n\
         Days since last fertilizing: {}\n\
         Weather: max {}°C, rainfall {} mm, humidity {}%\n\
         Growing method: {}",
        field("plant_name", "unknown"),
        field("plant_type", "unknown"),
        field("plant_state", "seed"),
        field("days_since_planting", "0"),
        field("days_in_state", "0"),
        field("days_since_last_water", "0"),
        field("days_since_last_fertilize", "0"),
        field("temp_max", "28"),
        field("today_rainfall_mm", "0"),
        field("humidity", "70"),
        field("growing_method", "soil"),
    )
}

#[async_trait]
impl AdvisorySuggester for ChatCompletionsSuggester {
    async fn suggest(&self, context: &Context) -> Option<Action> {
        let prompt = build_prompt(context);
        for model in &self.models {
            match self.ask(model, &prompt).await {
                Ok(action) => {
                    tracing::info!(%model, action = %action.action_type, "advisory suggested action");
                    return Some(action);
                }
                Err(e) => tracing::warn!(%model, error = %e, "advisory call failed"),
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
