// src/ingest/mod.rs
pub mod dedup;
pub mod http;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::{FetchError, Item, Source, SourceFetcher};
use futures::future::join_all;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags; block-level ones still separate words
    static RE_BLOCK: OnceCell<Regex> = OnceCell::new();
    let re_block = RE_BLOCK.get_or_init(|| {
        Regex::new(r"(?is)<\s*/?\s*(p|br|div|li|ul|ol|h[1-6]|tr|td|table)\b[^>]*>")
            .expect("block tag regex")
    });
    out = re_block.replace_all(&out, " ").to_string();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (including the non-breaking space entities decode to)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 4000 chars
    if out.chars().count() > 4000 {
        out = out.chars().take(4000).collect();
    }

    out
}

/// What one source contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceReport {
    pub source: Source,
    pub endpoint: String,
    pub fetched: usize,
    /// Failure reason; the source contributed nothing when set.
    pub error: Option<String>,
}

/// Fetch every source concurrently. A failing source is logged and contributes
/// an empty list; results are concatenated in source order.
pub async fn fetch_all(fetchers: &[Box<dyn SourceFetcher>]) -> (Vec<Item>, Vec<SourceReport>) {
    let results: Vec<Result<Vec<Item>, FetchError>> =
        join_all(fetchers.iter().map(|f| f.fetch())).await;

    let mut items = Vec::new();
    let mut reports = Vec::with_capacity(fetchers.len());
    for (fetcher, result) in fetchers.iter().zip(results) {
        let source = fetcher.source().clone();
        let endpoint = fetcher.endpoint().to_string();
        match result {
            Ok(mut batch) => {
                tracing::info!(source = %source, fetched = batch.len(), "source fetched");
                counter!("ingest_fetched_total", "source" => source.to_string())
                    .increment(batch.len() as u64);
                reports.push(SourceReport {
                    source,
                    endpoint,
                    fetched: batch.len(),
                    error: None,
                });
                items.append(&mut batch);
            }
            Err(e) => {
                tracing::warn!(source = %source, endpoint = %endpoint, error = %e, "source fetch failed");
                counter!("ingest_provider_errors_total", "source" => source.to_string())
                    .increment(1);
                reports.push(SourceReport {
                    source,
                    endpoint,
                    fetched: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    (items, reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_tags() {
        let s = "  <p>SEC&nbsp;&nbsp;Charges</p>\n<b>Founder</b> of “Crypto” Firm.  ";
        let out = normalize_text(s);
        assert_eq!(out, r#"SEC Charges Founder of "Crypto" Firm."#);
    }

    #[test]
    fn normalize_keeps_trailing_punctuation() {
        assert_eq!(normalize_text("Acme Corp, Inc."), "Acme Corp, Inc.");
    }

    struct Fixed(Source, Result<usize, ()>);

    #[async_trait::async_trait]
    impl SourceFetcher for Fixed {
        async fn fetch(&self) -> Result<Vec<Item>, FetchError> {
            match self.1 {
                Ok(n) => Ok((0..n)
                    .map(|i| Item::new(self.0.clone(), format!("t{i}"), format!("{}/{i}", self.0), "", ""))
                    .collect()),
                Err(()) => Err(FetchError::Timeout {
                    url: "https://down.test".into(),
                }),
            }
        }
        fn source(&self) -> &Source {
            &self.0
        }
        fn endpoint(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn failing_source_is_isolated() {
        let fetchers: Vec<Box<dyn SourceFetcher>> = vec![
            Box::new(Fixed(Source::PressRelease, Ok(2))),
            Box::new(Fixed(Source::OpenMeeting, Err(()))),
            Box::new(Fixed(Source::LitigationRelease, Ok(1))),
        ];
        let (items, reports) = fetch_all(&fetchers).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].source, Source::LitigationRelease);
        assert_eq!(reports[1].fetched, 0);
        assert!(reports[1].error.as_deref().unwrap().contains("timed out"));
    }
}
