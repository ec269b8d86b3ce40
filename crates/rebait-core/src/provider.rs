use crate::error::{RebaitError, Result};

/// Closed set of LLM backends. Picked once from configuration, never
/// switched per call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Gemini,
    Openai,
    Openrouter,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    /// `None` means the model must come from the environment; there is no
    /// sensible default (OpenRouter serves many).
    pub default_model: Option<&'static str>,
    pub key_env: &'static str,
    pub model_env: &'static str,
}

impl Provider {
    pub fn parse(name: &str) -> Option<Provider> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(Provider::Gemini),
            "openai" => Some(Provider::Openai),
            "openrouter" => Some(Provider::Openrouter),
            _ => None,
        }
    }

    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/models",
                default_model: Some("gemini-2.0-flash"),
                key_env: "GEMINI_API_KEY",
                model_env: "GEMINI_MODEL",
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                default_model: Some("gpt-4o-mini"),
                key_env: "OPENAI_API_KEY",
                model_env: "OPENAI_MODEL",
            },
            Provider::Openrouter => ProviderConfig {
                api_url: "https://openrouter.ai/api/v1/chat/completions",
                default_model: None,
                key_env: "OPENROUTER_API_KEY",
                model_env: "OPENROUTER_MODEL",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Openai => "OpenAI",
            Provider::Openrouter => "OpenRouter",
        }
    }

    /// Validate that the API key is set for this provider.
    pub fn validate_api_key(&self) -> Result<String> {
        let config = self.config();
        std::env::var(config.key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RebaitError::ConfigError {
                reason: format!("{} environment variable is not set", config.key_env),
            })
    }

    /// Resolve the model name from the environment, falling back to the
    /// provider default where one exists.
    pub fn resolve_model(&self) -> Result<String> {
        let config = self.config();
        if let Ok(model) = std::env::var(config.model_env) {
            if !model.trim().is_empty() {
                return Ok(model.trim().to_string());
            }
        }
        config
            .default_model
            .map(str::to_string)
            .ok_or_else(|| RebaitError::ConfigError {
                reason: format!(
                    "{} requires an explicit model via {}",
                    self.name(),
                    config.model_env
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_provider_names() {
        assert_eq!(Provider::parse("gemini"), Some(Provider::Gemini));
        assert_eq!(Provider::parse(" OpenAI "), Some(Provider::Openai));
        assert_eq!(Provider::parse("openrouter"), Some(Provider::Openrouter));
        assert_eq!(Provider::parse("claude"), None);
    }

    #[test]
    fn openrouter_has_no_default_model() {
        assert!(Provider::Openrouter.config().default_model.is_none());
        assert!(Provider::Gemini.config().default_model.is_some());
        assert!(Provider::Openai.config().default_model.is_some());
    }
}
