//! Supported AI providers and their defaults

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Google,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Mistral,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Google,
        Provider::OpenAI,
        Provider::Anthropic,
        Provider::DeepSeek,
        Provider::Mistral,
    ];

    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::OpenAI => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::DeepSeek => "DeepSeek",
            Provider::Mistral => "Mistral",
        }
    }

    /// Model used when the request names none
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Google => "gemini-2.5-pro",
            Provider::OpenAI => "gpt-4.1",
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::DeepSeek => "deepseek-chat",
            Provider::Mistral => "mistral-large-latest",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Google => "GOOGLE_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::Mistral => "MISTRAL_API_KEY",
        }
    }

    /// Where a user obtains a key
    pub fn key_help(self) -> &'static str {
        match self {
            Provider::Google => "Create a key at https://aistudio.google.com/app/apikey",
            Provider::OpenAI => "Create a key at https://platform.openai.com/api-keys",
            Provider::Anthropic => "Create a key at https://console.anthropic.com/settings/keys",
            Provider::DeepSeek => "Create a key at https://platform.deepseek.com/api_keys",
            Provider::Mistral => "Create a key at https://console.mistral.ai/api-keys",
        }
    }

    /// Chat completions endpoint for providers speaking the `OpenAI` protocol
    pub fn openai_compatible_url(self) -> Option<&'static str> {
        match self {
            Provider::OpenAI => Some("https://api.openai.com/v1/chat/completions"),
            Provider::DeepSeek => Some("https://api.deepseek.com/chat/completions"),
            Provider::Mistral => Some("https://api.mistral.ai/v1/chat/completions"),
            Provider::Google | Provider::Anthropic => None,
        }
    }

    /// Path segment used when routing through an LLM gateway
    pub fn gateway_segment(self) -> &'static str {
        match self {
            Provider::Google => "gemini",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::DeepSeek => "deepseek",
            Provider::Mistral => "mistral",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown AI provider: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_provider_has_defaults() {
        for provider in Provider::ALL {
            assert!(!provider.default_model().is_empty());
            assert!(provider.api_key_env_var().ends_with("_API_KEY"));
            assert_eq!(provider.display_name().parse::<Provider>(), Ok(provider));
        }
        assert_eq!(Provider::default(), Provider::Google);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("openai".parse::<Provider>(), Ok(Provider::OpenAI));
        assert_eq!(" DEEPSEEK ".parse::<Provider>(), Ok(Provider::DeepSeek));
        assert!("cohere".parse::<Provider>().is_err());
    }

    #[test]
    fn test_openai_protocol_providers() {
        assert!(Provider::Mistral.openai_compatible_url().is_some());
        assert!(Provider::Google.openai_compatible_url().is_none());
    }
}
