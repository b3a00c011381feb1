// src/analyze/classifier.rs
use futures::stream::{self, StreamExt};
use metrics::counter;
use tracing::{debug, info, warn};

use super::ai_adapter::{build_provider, DynProvider};
use super::verdict::{parse_reply, ClassifyMode, Verdict};
use super::ClassifyError;
use crate::config::ai::ClassifierConfig;
use crate::ingest::types::Item;

const MAX_INPUT_CHARS: usize = 4000;

/// Scores or filters items through an external model.
///
/// Without a provider every call returns [`Verdict::Unscored`] immediately and
/// nothing is filtered.
pub struct Classifier {
    provider: Option<DynProvider>,
    mode: ClassifyMode,
    topic: String,
    max_concurrency: usize,
    keep_unverified: bool,
}

impl Classifier {
    pub fn disabled() -> Self {
        let defaults = ClassifierConfig::default();
        Self {
            provider: None,
            mode: defaults.mode,
            topic: defaults.topic,
            max_concurrency: defaults.max_concurrency,
            keep_unverified: defaults.keep_unverified,
        }
    }

    pub fn new(provider: DynProvider, mode: ClassifyMode) -> Self {
        Self {
            provider: Some(provider),
            mode,
            ..Self::disabled()
        }
    }

    pub fn from_config(cfg: &ClassifierConfig, user_agent: &str) -> anyhow::Result<Self> {
        let provider = build_provider(cfg, user_agent)?;
        match &provider {
            Some(p) => info!(provider = p.name(), mode = ?cfg.mode, "classification enabled"),
            None => info!("no classifier credential configured; classification disabled"),
        }
        Ok(Self {
            provider,
            mode: cfg.mode,
            topic: cfg.topic.clone(),
            max_concurrency: cfg.max_concurrency.max(1),
            keep_unverified: cfg.keep_unverified,
        })
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    /// Relevance mode: store items the service could not judge.
    pub fn keep_unverified(mut self, keep: bool) -> Self {
        self.keep_unverified = keep;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn mode(&self) -> ClassifyMode {
        self.mode
    }

    /// Whether the run reports off-topic rejections.
    pub fn filters(&self) -> bool {
        self.is_enabled() && self.mode == ClassifyMode::Relevance
    }

    fn system_prompt(&self) -> String {
        match self.mode {
            ClassifyMode::Graded => format!(
                "You review announcements published by the U.S. Securities and Exchange Commission. \
                 Rate how strongly the announcement concerns {topic} on a scale from 1 (unrelated) \
                 to 5 (central to it). Reply with JSON only, no prose: \
                 {{\"score\": <integer 1-5>, \"reason\": \"<one short sentence>\"}}",
                topic = self.topic
            ),
            ClassifyMode::Relevance => format!(
                "You review announcements published by the U.S. Securities and Exchange Commission. \
                 Decide whether the announcement concerns {topic}. Reply with JSON only, no prose: \
                 {{\"is_relevant\": true or false, \"reason\": \"<one short sentence>\"}}",
                topic = self.topic
            ),
        }
    }

    /// One request, strict parsing. `Ok(Verdict::Unscored)` only when disabled.
    pub async fn try_classify(&self, title: &str, summary: &str) -> Result<Verdict, ClassifyError> {
        let Some(provider) = &self.provider else {
            return Ok(Verdict::Unscored);
        };
        let summary: String = summary.chars().take(MAX_INPUT_CHARS).collect();
        let user = format!("Title: {title}\n\nSummary: {summary}");
        let reply = provider.complete(&self.system_prompt(), &user).await?;
        parse_reply(self.mode, &reply)
    }

    /// Never fails: any problem is logged and becomes `Verdict::Unscored`.
    pub async fn classify(&self, item: &Item) -> Verdict {
        match self.try_classify(&item.title, &item.summary).await {
            Ok(v) => {
                debug!(url = %item.url, verdict = ?v, "item classified");
                v
            }
            Err(e) => {
                warn!(url = %item.url, source = %item.source, error = %e, "classification failed; no verdict");
                counter!("classify_errors_total").increment(1);
                Verdict::Unscored
            }
        }
    }

    /// Classify a batch with at most `max_concurrency` requests in flight.
    /// Output order matches input order.
    pub async fn classify_all(&self, items: Vec<Item>) -> Vec<Item> {
        if !self.is_enabled() {
            return items;
        }
        stream::iter(items)
            .map(|mut item| async move {
                item.verdict = self.classify(&item).await;
                item
            })
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    /// Whether an item with this verdict may be stored.
    pub fn admits(&self, verdict: &Verdict) -> bool {
        if !self.filters() {
            return true;
        }
        verdict.is_relevant().unwrap_or(self.keep_unverified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::StubProvider;
    use crate::ingest::types::Source;
    use std::sync::Arc;

    fn item() -> Item {
        Item::new(Source::PressRelease, "SEC Charges Crypto Exchange", "https://sec.test/1", "", "")
    }

    #[tokio::test]
    async fn disabled_classifier_is_a_no_op() {
        let c = Classifier::disabled();
        assert!(!c.is_enabled());
        assert_eq!(c.classify(&item()).await, Verdict::Unscored);
        assert!(c.admits(&Verdict::Unscored));
    }

    #[tokio::test]
    async fn out_of_range_score_becomes_unscored() {
        let c = Classifier::new(
            Arc::new(StubProvider::replying(r#"{"score": 7, "reason": "n/a"}"#)),
            ClassifyMode::Graded,
        );
        assert!(matches!(
            c.try_classify("t", "s").await,
            Err(ClassifyError::OutOfRange(7))
        ));
        assert_eq!(c.classify(&item()).await, Verdict::Unscored);
    }

    #[tokio::test]
    async fn transport_failure_becomes_unscored() {
        let c = Classifier::new(Arc::new(StubProvider::failing(500)), ClassifyMode::Graded);
        let out = c.classify_all(vec![item()]).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].verdict.is_unscored());
    }

    #[tokio::test]
    async fn relevance_policy_for_missing_verdicts() {
        let strict = Classifier::new(Arc::new(StubProvider::replying("nope")), ClassifyMode::Relevance);
        let v = strict.classify(&item()).await;
        assert!(v.is_unscored());
        assert!(!strict.admits(&v), "no verdict counts as off-topic by default");

        let lenient = Classifier::new(Arc::new(StubProvider::replying("nope")), ClassifyMode::Relevance)
            .keep_unverified(true);
        assert!(lenient.admits(&Verdict::Unscored));
        assert!(!lenient.admits(&Verdict::relevance(false, "unrelated")));
    }

    #[tokio::test]
    async fn graded_mode_never_filters() {
        let c = Classifier::new(
            Arc::new(StubProvider::replying(r#"{"score": 1, "reason": "unrelated"}"#)),
            ClassifyMode::Graded,
        );
        let v = c.classify(&item()).await;
        assert_eq!(v.score(), Some(1));
        assert!(c.admits(&v));
    }
}
