use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::pipeline::rag::prompt::PromptTemplates;

/// Application-level constants
pub const APP_NAME: &str = "medchat";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum similarity a retrieved chunk needs to count as relevant.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Small general-purpose chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 600;

pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,medchat=debug"
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub bind_addr: SocketAddr,
    pub similarity_threshold: f32,
    pub prompt_templates: PromptTemplates,
    pub model: String,
    pub max_output_tokens: u32,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub retriever_url: Option<String>,
    pub profile_store_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ChatConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values count as unset. Unparseable numbers fall back to their
    /// defaults with a warning instead of failing startup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = get("MEDCHAT_BIND")
            .and_then(|raw| match raw.parse::<SocketAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Invalid MEDCHAT_BIND, using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_BIND_ADDR);

        let similarity_threshold = get("RAG_SIMILARITY_THRESHOLD")
            .and_then(|raw| match raw.parse::<f32>() {
                Ok(v) if (0.0..=1.0).contains(&v) => Some(v),
                _ => {
                    tracing::warn!(value = %raw, "Invalid RAG_SIMILARITY_THRESHOLD, using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);

        let max_output_tokens = get("CHAT_MAX_TOKENS")
            .and_then(|raw| match raw.parse::<u32>() {
                Ok(v) if v > 0 => Some(v),
                _ => {
                    tracing::warn!(value = %raw, "Invalid CHAT_MAX_TOKENS, using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

        let prompt_templates =
            PromptTemplates::with_overrides(get("RAG_PROMPT_TEMPLATE"), get("FALLBACK_PROMPT_TEMPLATE"));

        Self {
            bind_addr,
            similarity_threshold,
            prompt_templates,
            model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            max_output_tokens,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            retriever_url: get("RETRIEVER_URL"),
            profile_store_url: get("PROFILE_STORE_URL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = ChatConfig::default();
        assert_eq!(config.similarity_threshold, 0.5);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_output_tokens, 600);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert!(config.openai_api_key.is_none());
        assert!(config.retriever_url.is_none());
        assert!(config.profile_store_url.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = ChatConfig::from_lookup(lookup_from(&[
            ("RAG_SIMILARITY_THRESHOLD", "0.72"),
            ("CHAT_MODEL", "gpt-4.1-mini"),
            ("CHAT_MAX_TOKENS", "900"),
            ("OPENAI_API_KEY", "sk-test"),
            ("MEDCHAT_BIND", "0.0.0.0:9000"),
            ("RETRIEVER_URL", "http://localhost:7000/search"),
        ]));
        assert!((config.similarity_threshold - 0.72).abs() < f32::EPSILON);
        assert_eq!(config.model, "gpt-4.1-mini");
        assert_eq!(config.max_output_tokens, 900);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.retriever_url.as_deref(), Some("http://localhost:7000/search"));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = ChatConfig::from_lookup(lookup_from(&[
            ("RAG_SIMILARITY_THRESHOLD", "1.7"),
            ("CHAT_MAX_TOKENS", "lots"),
            ("MEDCHAT_BIND", "not-an-addr"),
        ]));
        assert_eq!(config.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(config.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = ChatConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "   "),
            ("CHAT_MODEL", ""),
        ]));
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn template_overrides_are_independent() {
        let config = ChatConfig::from_lookup(lookup_from(&[(
            "FALLBACK_PROMPT_TEMPLATE",
            "Custom fallback {userAdvice}",
        )]));
        assert_eq!(config.prompt_templates.fallback, "Custom fallback {userAdvice}");
        assert_eq!(
            config.prompt_templates.grounded,
            crate::pipeline::rag::prompt::DEFAULT_GROUNDED_TEMPLATE
        );
    }

    #[test]
    fn default_bind_is_loopback_8080() {
        assert_eq!(DEFAULT_BIND_ADDR.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn app_name_is_medchat() {
        assert_eq!(APP_NAME, "medchat");
    }
}
