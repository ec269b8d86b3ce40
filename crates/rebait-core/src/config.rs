use crate::{
    error::{RebaitError, Result},
    provider::Provider,
};

pub const DEFAULT_TOKEN_CEILING: usize = 4000;
const DEFAULT_PROXY_ATTEMPTS: usize = 4;

/// Proxy-backed transcript retrieval. The URL may embed rotating
/// credentials; each race attempt opens a fresh connection through it.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub attempts: usize,
}

/// Environment-driven configuration for one run. CLI flags may override
/// individual fields after `from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    /// CLI-supplied Gemini key, taking precedence over `GEMINI_API_KEY`.
    pub gemini_key: Option<String>,
    pub max_tokens: usize,
    pub proxy: Option<ProxyConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let provider = match env("REBAIT_PROVIDER") {
            Some(name) => Provider::parse(&name).ok_or_else(|| RebaitError::ConfigError {
                reason: format!("unknown provider: {name}"),
            })?,
            None => Provider::default(),
        };

        let max_tokens = env("REBAIT_MAX_TOKENS")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_CEILING);

        let proxy = env("REBAIT_PROXY_URL").map(|url| ProxyConfig {
            url,
            attempts: env("REBAIT_PROXY_ATTEMPTS")
                .and_then(|raw| raw.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(DEFAULT_PROXY_ATTEMPTS),
        });

        Ok(Self {
            provider,
            gemini_key: None,
            max_tokens,
            proxy,
        })
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
