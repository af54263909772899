//! `OpenAI` chat completions provider
//!
//! Also serves `DeepSeek` and Mistral, which expose the same protocol.

use super::error::classify_status;
use super::types::{LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIService {
    pub fn new(
        provider: Provider,
        api_key: String,
        model: String,
        gateway: Option<&str>,
    ) -> Result<Self, LlmError> {
        let base_url = match (gateway, provider.openai_compatible_url()) {
            (Some(gw), Some(_)) => format!(
                "{}/{}/v1/chat/completions",
                gw.trim_end_matches('/'),
                provider.gateway_segment()
            ),
            (None, Some(url)) => url.to_string(),
            (_, None) => {
                return Err(LlmError::invalid_request(format!(
                    "{provider} does not speak the chat completions protocol"
                )))
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: request.system.clone(),
            });
        }
        for msg in &request.messages {
            let role = match msg.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            messages.push(OpenAIMessage {
                role: role.to_string(),
                content: msg.text.clone(),
            });
        }

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
        }
    }
}

fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::unknown("No choices in response"))?;

    Ok(LlmResponse {
        text: choice.message.content.unwrap_or_default(),
        usage: Usage {
            input_tokens: u64::from(resp.usage.prompt_tokens),
            output_tokens: u64::from(resp.usage.completion_tokens),
        },
    })
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[allow(clippy::struct_field_names)] // tokens suffix is meaningful
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
