//! Provider configuration and client construction

use super::anthropic::AnthropicService;
use super::gemini::GeminiService;
use super::openai::OpenAIService;
use super::{LlmError, LlmService, LoggingService, Provider};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-request AI configuration, passed opaquely to generate and update
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AiConfig {
    pub provider: Provider,
    pub model_name: String,
    pub api_key: String,
}

impl AiConfig {
    /// Both the key and the model name must be present before any call
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.model_name.trim().is_empty()
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("provider", &self.provider)
            .field("model_name", &self.model_name)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Process-wide LLM settings read from the environment
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub default_provider: Provider,
    /// Base URL of an LLM gateway that handles authentication
    pub gateway: Option<String>,
    /// Fallback keys, used only when a request omits its own
    pub api_keys: HashMap<Provider, String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let default_provider = std::env::var("PROMOAI_DEFAULT_PROVIDER")
            .ok()
            .and_then(|p| match p.parse() {
                Ok(provider) => Some(provider),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring PROMOAI_DEFAULT_PROVIDER");
                    None
                }
            })
            .unwrap_or_default();

        let api_keys = Provider::ALL
            .into_iter()
            .filter_map(|p| {
                std::env::var(p.api_key_env_var())
                    .ok()
                    .filter(|k| !k.is_empty())
                    .map(|k| (p, k))
            })
            .collect();

        Self {
            default_provider,
            gateway: std::env::var("PROMOAI_LLM_GATEWAY")
                .ok()
                .filter(|g| !g.is_empty()),
            api_keys,
        }
    }

    /// Fill the gaps of a partial request configuration.
    ///
    /// The provider defaults to the configured one, the model to the
    /// provider's default and the key to the environment fallback. In
    /// gateway mode the key is "implicit". The result may still be
    /// incomplete; the caller decides whether that is acceptable.
    pub fn resolve(
        &self,
        provider: Option<Provider>,
        model_name: Option<String>,
        api_key: Option<String>,
    ) -> AiConfig {
        let provider = provider.unwrap_or(self.default_provider);
        let model_name = model_name
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_keys.get(&provider).cloned())
            .or_else(|| self.gateway.as_ref().map(|_| "implicit".to_string()))
            .unwrap_or_default();

        AiConfig {
            provider,
            model_name,
            api_key,
        }
    }

    /// Build a logging client for the given configuration
    pub fn connect(&self, config: &AiConfig) -> Result<Arc<dyn LlmService>, LlmError> {
        if !config.is_complete() {
            return Err(LlmError::auth(format!(
                "{} requires an API key and a model name. {}",
                config.provider,
                config.provider.key_help()
            )));
        }

        let gateway = self.gateway.as_deref();
        let key = config.api_key.clone();
        let model = config.model_name.clone();
        let service: Arc<dyn LlmService> = match config.provider {
            Provider::Google => Arc::new(GeminiService::new(key, model, gateway)?),
            Provider::Anthropic => Arc::new(AnthropicService::new(key, model, gateway)?),
            Provider::OpenAI | Provider::DeepSeek | Provider::Mistral => {
                Arc::new(OpenAIService::new(config.provider, key, model, gateway)?)
            }
        };

        Ok(Arc::new(LoggingService::new(config.provider, service)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;

    fn config_with_key(provider: Provider, key: &str) -> LlmConfig {
        LlmConfig {
            api_keys: HashMap::from([(provider, key.to_string())]),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_resolve_fills_defaults() {
        let config = config_with_key(Provider::Google, "env-key");
        let resolved = config.resolve(None, None, None);

        assert_eq!(resolved.provider, Provider::Google);
        assert_eq!(resolved.model_name, "gemini-2.5-pro");
        assert_eq!(resolved.api_key, "env-key");
        assert!(resolved.is_complete());
    }

    #[test]
    fn test_request_key_wins_over_environment() {
        let config = config_with_key(Provider::Mistral, "env-key");
        let resolved = config.resolve(
            Some(Provider::Mistral),
            Some("mistral-small-latest".to_string()),
            Some("request-key".to_string()),
        );
        assert_eq!(resolved.api_key, "request-key");
        assert_eq!(resolved.model_name, "mistral-small-latest");
    }

    #[test]
    fn test_missing_key_stays_incomplete() {
        let resolved = LlmConfig::default().resolve(Some(Provider::OpenAI), None, None);
        assert!(!resolved.is_complete());

        let err = LlmConfig::default().connect(&resolved).err().unwrap();
        assert_eq!(err.kind, LlmErrorKind::Auth);
    }

    #[test]
    fn test_gateway_mode_uses_implicit_key() {
        let config = LlmConfig {
            gateway: Some("http://gateway.local/llm".to_string()),
            ..LlmConfig::default()
        };
        let resolved = config.resolve(Some(Provider::Anthropic), None, None);
        assert_eq!(resolved.api_key, "implicit");

        let service = config.connect(&resolved).unwrap();
        assert_eq!(service.model_id(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AiConfig {
            provider: Provider::DeepSeek,
            model_name: "deepseek-chat".to_string(),
            api_key: "sk-secret".to_string(),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("***"));
    }
}
