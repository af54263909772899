//! Google Gemini provider implementation

use super::error::classify_status;
use super::types::{LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini service implementation
pub struct GeminiService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    via_gateway: bool,
}

impl GeminiService {
    pub fn new(api_key: String, model: String, gateway: Option<&str>) -> Result<Self, LlmError> {
        let base_url = match gateway {
            Some(gw) => format!(
                "{}/gemini/v1beta/models/{model}:generateContent",
                gw.trim_end_matches('/')
            ),
            None => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            ),
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
            via_gateway: gateway.is_some(),
        })
    }
}

fn translate_request(request: &LlmRequest) -> GeminiRequest {
    let system_instruction = if request.system.is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: request.system.clone(),
            }],
        })
    };

    let contents = request
        .messages
        .iter()
        .map(|msg| GeminiContent {
            role: Some(
                match msg.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "model",
                }
                .to_string(),
            ),
            parts: vec![GeminiPart {
                text: msg.text.clone(),
            }],
        })
        .collect();

    GeminiRequest {
        contents,
        system_instruction,
        generation_config: Some(GeminiGenerationConfig {
            max_output_tokens: request.max_tokens,
        }),
    }
}

fn normalize_response(resp: GeminiResponse) -> Result<LlmResponse, LlmError> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::unknown("No candidates in response"))?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let usage = resp.usage_metadata.unwrap_or_default();
    Ok(LlmResponse {
        text,
        usage: Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        },
    })
}

#[async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let gemini_request = translate_request(request);

        let mut builder = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json");
        if !self.via_gateway {
            builder = builder.header("x-goog-api-key", &self.api_key);
        }

        let response = builder
            .json(&gemini_request)
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

        let gemini_response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        normalize_response(gemini_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_field_names)] // count suffix mirrors the API
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmMessage;

    #[test]
    fn test_assistant_role_is_model() {
        let request = translate_request(&LlmRequest {
            system: String::new(),
            messages: vec![LlmMessage::user("q"), LlmMessage::assistant("a")],
            max_tokens: Some(100),
        });
        assert!(request.system_instruction.is_none());
        assert_eq!(request.contents[1].role.as_deref(), Some("model"));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 100);
    }

    #[test]
    fn test_normalize_response() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}],
                "usageMetadata":{"promptTokenCount":5,"candidatesTokenCount":2}}"#,
        )
        .unwrap();
        let normalized = normalize_response(resp).unwrap();
        assert_eq!(normalized.text, "ab");
        assert_eq!(normalized.usage.output_tokens, 2);
    }
}
