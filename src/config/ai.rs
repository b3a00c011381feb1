// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

use crate::analyze::verdict::ClassifyMode;

fn default_topic() -> String {
    "cryptocurrency, crypto assets, or blockchain".to_string()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    #[serde(alias = "anthropic")]
    Claude,
    #[serde(alias = "open_ai")]
    OpenAi,
}

impl ProviderKind {
    /// Env vars consulted when the key is `"ENV"` or absent, in order.
    fn key_env_vars(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Claude => &["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"],
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
        }
    }
}

/// `[classifier]` table of `config/monitor.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// "claude" | "openai" (case-sensitive, lowercase)
    pub provider: ProviderKind,
    pub model: Option<String>,
    /// Literal key, or "ENV" / absent to read the provider's env var.
    pub api_key: Option<String>,
    /// Overrides the provider's API origin, e.g. for a local proxy.
    pub base_url: Option<String>,
    pub mode: ClassifyMode,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Relevance mode only: store items the service could not judge.
    pub keep_unverified: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            api_key: None,
            base_url: None,
            mode: ClassifyMode::default(),
            topic: default_topic(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_timeout_secs(),
            keep_unverified: false,
        }
    }
}

impl ClassifierConfig {
    /// The credential to use, or `None` when classification should stay off.
    pub fn resolved_api_key(&self) -> Option<String> {
        let literal = self.api_key.as_deref().map(str::trim);
        let key = match literal {
            Some(k) if !k.eq_ignore_ascii_case("env") => k.to_string(),
            _ => self
                .provider
                .key_env_vars()
                .iter()
                .find_map(|name| env::var(name).ok())
                .unwrap_or_default(),
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_placeholder_reads_provider_variable() {
        env::remove_var("CLAUDE_API_KEY");
        env::set_var("ANTHROPIC_API_KEY", "  sk-ant-test ");
        let cfg = ClassifierConfig {
            api_key: Some("ENV".into()),
            ..ClassifierConfig::default()
        };
        assert_eq!(cfg.resolved_api_key().as_deref(), Some("sk-ant-test"));

        env::remove_var("ANTHROPIC_API_KEY");
        assert_eq!(cfg.resolved_api_key(), None);
    }

    #[test]
    fn literal_key_wins_and_blank_disables() {
        let cfg = ClassifierConfig {
            api_key: Some("sk-literal".into()),
            ..ClassifierConfig::default()
        };
        assert_eq!(cfg.resolved_api_key().as_deref(), Some("sk-literal"));

        let blank = ClassifierConfig {
            api_key: Some("   ".into()),
            ..ClassifierConfig::default()
        };
        assert_eq!(blank.resolved_api_key(), None);
    }

    #[test]
    fn provider_names_parse_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            classifier: ClassifierConfig,
        }
        let w: Wrap = toml::from_str(
            r#"
[classifier]
provider = "openai"
mode = "relevance"
keep_unverified = true
"#,
        )
        .unwrap();
        assert_eq!(w.classifier.provider, ProviderKind::OpenAi);
        assert_eq!(w.classifier.mode, ClassifyMode::Relevance);
        assert!(w.classifier.keep_unverified);
        assert_eq!(w.classifier.max_concurrency, 4);
    }
}
