//! LLM response service: token-budget enforcement, provider dispatch and
//! per-video response caching.
//!
//! The response cache is keyed by video, not by prompt content, so edits
//! to the template or transcript reuse a stale answer until the caller
//! forces a refresh. Known trade-off, kept deliberately.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    cache::{CacheStore, Stage},
    config::Config,
    error::{RebaitError, Result},
    provider::Provider,
    video_id::VideoId,
};

/// LLM calls run longer than scrape traffic; give them more room.
const LLM_TIMEOUT: Duration = Duration::from_secs(120);

pub struct LlmService {
    cache: CacheStore,
    client: Client,
    provider: Provider,
    api_key: String,
    model: String,
    max_tokens: usize,
}

impl LlmService {
    /// Resolve credentials and model up front so a misconfigured provider
    /// fails before any acquisition work starts.
    pub fn new(cache: CacheStore, config: &Config) -> Result<Self> {
        let provider = config.provider;
        let api_key = match (provider, &config.gemini_key) {
            (Provider::Gemini, Some(key)) => key.clone(),
            _ => provider.validate_api_key()?,
        };
        let model = provider.resolve_model()?;
        let client = Client::builder().timeout(LLM_TIMEOUT).build()?;
        Ok(Self {
            cache,
            client,
            provider,
            api_key,
            model,
            max_tokens: config.max_tokens,
        })
    }

    pub async fn respond(
        &self,
        video_id: &VideoId,
        prompt: &str,
        force: bool,
    ) -> Result<String> {
        if !force {
            if let Some(cached) = self.cache.read_text(video_id, Stage::LlmResponse).await {
                debug!(video_id = %video_id, "LLM response cache hit");
                return Ok(cached);
            }
        }

        let prompt = truncate_to_token_budget(prompt, &self.model, self.max_tokens)?;
        let response = match self.provider {
            Provider::Gemini => self.send_gemini(&prompt).await?,
            Provider::Openai | Provider::Openrouter => {
                self.send_chat_completions(&prompt).await?
            }
        };

        self.cache
            .write_text(video_id, Stage::LlmResponse, &response)
            .await?;
        Ok(response)
    }

    async fn send_gemini(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent",
            self.provider.config().api_url,
            self.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [{"parts": [{"text": prompt}]}],
            }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(provider_error(self.provider, status, &text));
        }

        let body: Value = serde_json::from_str(&text)?;
        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RebaitError::ExtractionFailed {
                reason: "Gemini response carried no candidate text".to_string(),
            })
    }

    async fn send_chat_completions(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(self.provider.config().api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.3,
            }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(provider_error(self.provider, status, &text));
        }

        let body: Value = serde_json::from_str(&text)?;
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RebaitError::ExtractionFailed {
                reason: format!("unexpected completion shape from {}", self.provider.name()),
            })
    }
}

/// Count the prompt under the model's tokenizer and, when it exceeds the
/// ceiling, keep only the first `max_tokens` tokens decoded back to text.
/// The result is a strict prefix of the input.
pub fn truncate_to_token_budget(
    prompt: &str,
    model: &str,
    max_tokens: usize,
) -> Result<String> {
    let bpe = tiktoken_rs::get_bpe_from_model(model)
        .or_else(|_| tiktoken_rs::cl100k_base())
        .map_err(|e| RebaitError::ConfigError {
            reason: format!("tokenizer initialization failed: {e}"),
        })?;

    let tokens = bpe.encode_ordinary(prompt);
    if tokens.len() <= max_tokens {
        return Ok(prompt.to_string());
    }

    debug!(
        tokens = tokens.len(),
        max_tokens, "prompt over token ceiling, truncating"
    );
    bpe.decode(tokens[..max_tokens].to_vec())
        .map_err(|e| RebaitError::ExtractionFailed {
            reason: format!("token decode failed during truncation: {e}"),
        })
}

/// Build a `ProviderError` from a non-2xx body, tolerating non-JSON.
fn provider_error(provider: Provider, status: StatusCode, body: &str) -> RebaitError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = parsed.get("error").cloned().unwrap_or(Value::Null);

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(body.trim())
        .to_string();
    let code = match error.get("code") {
        Some(Value::String(code)) => code.clone(),
        Some(Value::Number(code)) => code.to_string(),
        _ => error
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    };

    // Telemetry only; a failed parse must never mask the primary error.
    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(details) = parse_rate_limit(&message) {
            warn!(
                limit = details.limit,
                requested = details.requested,
                tier = details.tier.as_deref().unwrap_or("unknown"),
                "provider rate limit hit"
            );
        }
    }

    RebaitError::ProviderError {
        provider: provider.name().to_string(),
        status: status.as_u16(),
        code,
        message,
    }
}

#[derive(Debug, PartialEq)]
struct RateLimitDetails {
    limit: u64,
    requested: u64,
    tier: Option<String>,
}

static RATE_LIMIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Limit (\d+).*?Requested (\d+)")
        .expect("Should be able to parse the rate limit regex")
});
static TIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:on the |tier[:=\s]+)([A-Za-z0-9_-]+) tier|tier ([A-Za-z0-9_-]+)")
        .expect("Should be able to parse the tier regex")
});

fn parse_rate_limit(message: &str) -> Option<RateLimitDetails> {
    let caps = RATE_LIMIT_REGEX.captures(message)?;
    let limit = caps[1].parse().ok()?;
    let requested = caps[2].parse().ok()?;
    let tier = TIER_REGEX.captures(message).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    });
    Some(RateLimitDetails {
        limit,
        requested,
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompts_pass_through_untouched() {
        let prompt = "a short prompt";
        assert_eq!(
            truncate_to_token_budget(prompt, "gpt-4o-mini", 4000).unwrap(),
            prompt
        );
    }

    #[test]
    fn oversized_prompts_truncate_to_a_prefix_within_budget() {
        let prompt = "one two three four five six seven eight nine ten ".repeat(100);
        let truncated = truncate_to_token_budget(&prompt, "gpt-3.5-turbo", 50).unwrap();

        assert!(prompt.starts_with(&truncated));
        assert!(truncated.len() < prompt.len());

        let bpe = tiktoken_rs::get_bpe_from_model("gpt-3.5-turbo").unwrap();
        assert!(bpe.encode_ordinary(&truncated).len() <= 50);
    }

    #[test]
    fn unknown_models_fall_back_to_a_default_encoding() {
        let prompt = "word ".repeat(200);
        let truncated = truncate_to_token_budget(&prompt, "gemini-2.0-flash", 20).unwrap();
        assert!(prompt.starts_with(&truncated));
    }

    #[test]
    fn chat_error_bodies_are_parsed_for_diagnostics() {
        let body = r#"{"error": {"message": "model overloaded", "type": "server_error", "code": "overloaded"}}"#;
        let err = provider_error(Provider::Openai, StatusCode::SERVICE_UNAVAILABLE, body);
        match err {
            RebaitError::ProviderError {
                provider,
                status,
                code,
                message,
            } => {
                assert_eq!(provider, "OpenAI");
                assert_eq!(status, 503);
                assert_eq!(code, "overloaded");
                assert_eq!(message, "model overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn numeric_codes_and_non_json_bodies_still_produce_errors() {
        let gemini_body = r#"{"error": {"code": 400, "message": "bad request", "status": "INVALID_ARGUMENT"}}"#;
        let err = provider_error(Provider::Gemini, StatusCode::BAD_REQUEST, gemini_body);
        match err {
            RebaitError::ProviderError { code, .. } => assert_eq!(code, "400"),
            other => panic!("unexpected error: {other}"),
        }

        let err = provider_error(
            Provider::Openrouter,
            StatusCode::BAD_GATEWAY,
            "<html>Bad Gateway</html>",
        );
        match err {
            RebaitError::ProviderError { code, message, .. } => {
                assert_eq!(code, "unknown");
                assert!(message.contains("Bad Gateway"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rate_limit_telemetry_is_best_effort() {
        let message =
            "Rate limit reached for gpt-4o-mini on the free tier. Limit 6000, Requested 7100.";
        let details = parse_rate_limit(message).unwrap();
        assert_eq!(details.limit, 6000);
        assert_eq!(details.requested, 7100);
        assert_eq!(details.tier.as_deref(), Some("free"));

        assert!(parse_rate_limit("quota exceeded, try later").is_none());
    }
}
