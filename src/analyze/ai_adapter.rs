//! AI adapter: provider abstraction over the chat-style classification APIs.
//!
//! A provider only moves text: it sends the instruction prompt plus the item
//! text and hands back the raw reply. Interpreting that reply is the job of
//! [`crate::analyze::verdict::parse_reply`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ClassifyError;
use crate::config::ai::{ClassifierConfig, ProviderKind};

pub type ReplyFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ClassifyError>> + Send + 'a>>;

/// Low-level provider: does the remote call and returns the reply text.
pub trait Provider: Send + Sync + 'static {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> ReplyFuture<'a>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn Provider>;

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_REPLY_TOKENS: u32 = 200;

fn build_http(user_agent: &str, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .timeout(timeout)
        .build()
}

/// Builds the configured provider, or `None` when no credential is available.
pub fn build_provider(
    cfg: &ClassifierConfig,
    user_agent: &str,
) -> anyhow::Result<Option<DynProvider>> {
    let Some(api_key) = cfg.resolved_api_key() else {
        return Ok(None);
    };
    let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
    let http = build_http(user_agent, timeout)?;
    let provider: DynProvider = match cfg.provider {
        ProviderKind::Claude => Arc::new(ClaudeProvider {
            http,
            api_key,
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| CLAUDE_BASE_URL.to_string()),
        }),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider {
            http,
            api_key,
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        }),
    };
    Ok(Some(provider))
}

async fn read_success(resp: reqwest::Response) -> Result<reqwest::Response, ClassifyError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(ClassifyError::Status(status.as_u16()));
    }
    Ok(resp)
}

// ------------------------------------------------------------
// Anthropic Messages API
// ------------------------------------------------------------

pub struct ClaudeProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Provider for ClaudeProvider {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> ReplyFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                max_tokens: u32,
                system: &'a str,
                messages: Vec<Msg<'a>>,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                content: Vec<Block>,
            }
            #[derive(Deserialize)]
            struct Block {
                #[serde(rename = "type")]
                kind: String,
                #[serde(default)]
                text: String,
            }

            let req = Req {
                model: &self.model,
                max_tokens: MAX_REPLY_TOKENS,
                system,
                messages: vec![Msg {
                    role: "user",
                    content: user,
                }],
            };

            let resp = self
                .http
                .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&req)
                .send()
                .await?;
            let body: Resp = read_success(resp)
                .await?
                .json()
                .await
                .map_err(|e| ClassifyError::Malformed(format!("envelope: {e}")))?;

            let text: String = body
                .content
                .into_iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text)
                .collect();
            if text.trim().is_empty() {
                return Err(ClassifyError::EmptyReply);
            }
            Ok(text)
        })
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

// ------------------------------------------------------------
// OpenAI Chat Completions API
// ------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Provider for OpenAiProvider {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> ReplyFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                #[serde(default)]
                content: Option<String>,
            }

            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: 0.0,
                max_tokens: MAX_REPLY_TOKENS,
            };

            let resp = self
                .http
                .post(format!(
                    "{}/v1/chat/completions",
                    self.base_url.trim_end_matches('/')
                ))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await?;
            let body: Resp = read_success(resp)
                .await?
                .json()
                .await
                .map_err(|e| ClassifyError::Malformed(format!("envelope: {e}")))?;

            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|s| !s.trim().is_empty())
                .ok_or(ClassifyError::EmptyReply)
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Stub provider for tests and local runs
// ------------------------------------------------------------

/// Answers every request with the same canned outcome.
#[derive(Clone)]
pub struct StubProvider {
    reply: Result<String, u16>,
}

impl StubProvider {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
        }
    }

    /// Simulates a non-2xx answer from the service.
    pub fn failing(status: u16) -> Self {
        Self { reply: Err(status) }
    }
}

impl Provider for StubProvider {
    fn complete<'a>(&'a self, _system: &'a str, _user: &'a str) -> ReplyFuture<'a> {
        let out = self.reply.clone().map_err(ClassifyError::Status);
        Box::pin(async move { out })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_credential_means_no_provider() {
        let cfg = ClassifierConfig {
            api_key: Some(String::new()),
            ..ClassifierConfig::default()
        };
        let p = build_provider(&cfg, "sec-monitor/test").unwrap();
        assert!(p.is_none());
    }

    #[test]
    fn explicit_key_builds_selected_provider() {
        let cfg = ClassifierConfig {
            provider: ProviderKind::OpenAi,
            api_key: Some("sk-test".into()),
            ..ClassifierConfig::default()
        };
        let p = build_provider(&cfg, "sec-monitor/test").unwrap().unwrap();
        assert_eq!(p.name(), "openai");
    }

    #[tokio::test]
    async fn stub_failure_maps_to_status_error() {
        let p = StubProvider::failing(503);
        let err = p.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, ClassifyError::Status(503)));
    }
}
