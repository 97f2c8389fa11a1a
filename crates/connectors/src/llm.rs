//! Language model seam and the OpenAI chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use demand_core::config::OpenAiConfig;
use demand_core::{CampaignError, CampaignResult};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::http::{check_status, decode_error, transport_error};

const SERVICE: &str = "openai";

/// A model that answers a system + user prompt with a JSON document.
///
/// Implementations return the raw text; callers decode and validate it.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> CampaignResult<String>;
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig, request_timeout: Duration) -> CampaignResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CampaignError::Config(format!("openai http client: {e}")))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> CampaignResult<String> {
        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let chat: ChatResponse = response.json().await.map_err(|e| decode_error(SERVICE, e))?;

        first_content(chat)
    }
}

fn first_content(chat: ChatResponse) -> CampaignResult<String> {
    let choice = chat
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CampaignError::MalformedOutput("completion had no choices".into()))?;

    if choice.finish_reason.as_deref() == Some("length") {
        return Err(CampaignError::MalformedOutput(
            "completion truncated at token limit".into(),
        ));
    }

    let content = choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| CampaignError::MalformedOutput("completion content was empty".into()))?;
    debug!(chars = content.len(), "Model completion received");
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_content() {
        let chat: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "{\"ok\":true}" }, "finish_reason": "stop" }]
        }))
        .unwrap();
        assert_eq!(first_content(chat).unwrap(), "{\"ok\":true}");
    }

    #[test]
    fn test_truncated_or_empty_completion_is_malformed() {
        let truncated: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "{\"headl" }, "finish_reason": "length" }]
        }))
        .unwrap();
        assert!(matches!(first_content(truncated), Err(CampaignError::MalformedOutput(_))));

        let empty: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(first_content(empty), Err(CampaignError::MalformedOutput(_))));

        let blank: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "  " } }]
        }))
        .unwrap();
        assert!(first_content(blank).is_err());
    }
}
