//! Configuration Module
//!
//! This module reads configuration values from environment variables, provides
//! sensible defaults, and validates limits such as the maximum accepted HTML size.

use anyhow::Result;
use std::env;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
const DEFAULT_FALLBACK_MODELS: [&str; 3] = [
    "anthropic/claude-3-sonnet-20240229",
    "anthropic/claude-3-haiku-20240307",
    "openai/gpt-4-turbo-preview",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_fallback_models: Vec<String>,
    pub llm_timeout: u64,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub app_url: String,
    pub max_html_size: usize,
    pub default_clients: Vec<String>,
    pub history_limit: usize,
}

impl Config {
    /// Creates a new configuration by reading environment variables.
    /// If a variable is missing or empty, a default value is used.
    pub fn new() -> Result<Self> {
        // Read max HTML size from env or use default 1MB.
        let max_html_size = env::var("INBOXER_MAX_HTML_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1024 * 1024);

        if max_html_size > 50_000_000 {
            return Err(anyhow::anyhow!("Max HTML size too large (50MB limit)"));
        }

        let llm_timeout = env::var("INBOXER_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(45);

        let llm_max_tokens = env::var("INBOXER_LLM_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2500);

        let llm_temperature = env::var("INBOXER_LLM_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.7);

        let history_limit = env::var("INBOXER_HISTORY_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // Trim the API key before checking for emptiness.
        let llm_api_key = env::var("INBOXER_LLM_API_KEY")
            .map(|s| s.trim().to_string())
            .ok()
            .filter(|s| !s.is_empty());

        let llm_base_url = non_empty_var("INBOXER_LLM_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let llm_model = non_empty_var("INBOXER_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let llm_fallback_models = non_empty_var("INBOXER_LLM_FALLBACK_MODELS")
            .map(|s| split_list(&s))
            .unwrap_or_else(|| DEFAULT_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect());

        let app_url = non_empty_var("INBOXER_APP_URL").unwrap_or_else(|| "https://mailtrendz.com".to_string());

        let default_clients = non_empty_var("INBOXER_DEFAULT_CLIENTS")
            .map(|s| split_list(&s))
            .unwrap_or_else(|| vec!["gmail".to_string(), "outlook".to_string()]);

        if default_clients.is_empty() {
            return Err(anyhow::anyhow!("INBOXER_DEFAULT_CLIENTS must name at least one client"));
        }

        Ok(Config {
            llm_api_key,
            llm_base_url,
            llm_model,
            llm_fallback_models,
            llm_timeout,
            llm_max_tokens,
            llm_temperature,
            app_url,
            max_html_size,
            default_clients,
            history_limit,
        })
    }

    /// Primary model followed by the fallbacks, in the order they are tried.
    pub fn model_priority(&self) -> Vec<String> {
        let mut models = vec![self.llm_model.clone()];
        models.extend(self.llm_fallback_models.iter().cloned());
        models
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            llm_api_key: None,
            llm_base_url: DEFAULT_BASE_URL.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            llm_fallback_models: DEFAULT_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            llm_timeout: 45,
            llm_max_tokens: 2500,
            llm_temperature: 0.7,
            app_url: "https://mailtrendz.com".to_string(),
            max_html_size: 1024 * 1024,
            default_clients: vec!["gmail".to_string(), "outlook".to_string()],
            history_limit: 10,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Both tests mutate the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 11] = [
        "INBOXER_LLM_API_KEY",
        "INBOXER_LLM_BASE_URL",
        "INBOXER_LLM_MODEL",
        "INBOXER_LLM_FALLBACK_MODELS",
        "INBOXER_LLM_TIMEOUT_SECS",
        "INBOXER_LLM_MAX_TOKENS",
        "INBOXER_LLM_TEMPERATURE",
        "INBOXER_APP_URL",
        "INBOXER_MAX_HTML_SIZE",
        "INBOXER_DEFAULT_CLIENTS",
        "INBOXER_HISTORY_LIMIT",
    ];

    #[test]
    fn test_config_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in VARS {
            env::remove_var(var);
        }

        let config = Config::new().unwrap();
        assert!(config.llm_api_key.is_none());
        assert_eq!(config.llm_base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.llm_model, "anthropic/claude-3.5-sonnet");
        assert_eq!(config.llm_fallback_models.len(), 3);
        assert_eq!(config.llm_timeout, 45);
        assert_eq!(config.llm_max_tokens, 2500);
        assert_eq!(config.max_html_size, 1024 * 1024);
        assert_eq!(config.default_clients, vec!["gmail", "outlook"]);
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.model_priority()[0], "anthropic/claude-3.5-sonnet");
    }

    #[test]
    fn test_config_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("INBOXER_LLM_API_KEY", "  sk-test  ");
        env::set_var("INBOXER_LLM_BASE_URL", "http://localhost:9999/v1/");
        env::set_var("INBOXER_LLM_MODEL", "primary/model");
        env::set_var("INBOXER_LLM_FALLBACK_MODELS", "a/one, b/two,,");
        env::set_var("INBOXER_LLM_TIMEOUT_SECS", "5");
        env::set_var("INBOXER_MAX_HTML_SIZE", "2048");
        env::set_var("INBOXER_DEFAULT_CLIENTS", "outlook,yahoo");

        let config = Config::new().unwrap();
        assert_eq!(config.llm_api_key, Some("sk-test".to_string()));
        assert_eq!(config.llm_base_url, "http://localhost:9999/v1");
        assert_eq!(config.model_priority(), vec!["primary/model", "a/one", "b/two"]);
        assert_eq!(config.llm_timeout, 5);
        assert_eq!(config.max_html_size, 2048);
        assert_eq!(config.default_clients, vec!["outlook", "yahoo"]);

        env::set_var("INBOXER_MAX_HTML_SIZE", "60000000");
        assert!(Config::new().is_err());

        for var in VARS {
            env::remove_var(var);
        }
    }
}
