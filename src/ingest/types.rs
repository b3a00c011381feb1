// src/ingest/types.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyze::verdict::Verdict;

/// Where an item came from. Used for labeling, never for identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    PressRelease,
    LitigationRelease,
    OpenMeeting,
    /// Unrecognized labels pass through untouched.
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::PressRelease => "press_release",
            Source::LitigationRelease => "litigation_release",
            Source::OpenMeeting => "open_meeting",
            Source::Other(s) => s.as_str(),
        }
    }

    /// Human-facing badge text.
    pub fn label(&self) -> &str {
        match self {
            Source::PressRelease => "Press Release",
            Source::LitigationRelease => "Litigation",
            Source::OpenMeeting => "Meeting",
            Source::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        match s.as_str() {
            "press_release" => Source::PressRelease,
            "litigation_release" => Source::LitigationRelease,
            "open_meeting" => Source::OpenMeeting,
            _ => Source::Other(s),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::from(s.to_string())
    }
}

impl From<Source> for String {
    fn from(s: Source) -> Self {
        match s {
            Source::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized announcement. `url` is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub source: Source,
    pub title: String,
    pub url: String,
    /// Source-reported date text, stored verbatim. Empty when unknown.
    #[serde(default)]
    pub published: String,
    pub summary: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Ingestion time; restamped by the store on acceptance.
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Builds an item, falling back to `title` when `summary` is blank.
    pub fn new(
        source: Source,
        title: impl Into<String>,
        url: impl Into<String>,
        published: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let summary = summary.into();
        let summary = if summary.trim().is_empty() {
            title.clone()
        } else {
            summary
        };
        Self {
            source,
            title,
            url: url.into(),
            published: published.into(),
            summary,
            verdict: Verdict::Unscored,
            created_at: Utc::now(),
        }
    }

    pub fn ai_score(&self) -> Option<u8> {
        self.verdict.score()
    }

    pub fn ai_reason(&self) -> Option<&str> {
        self.verdict.reason()
    }
}

/// Failure of one source for one run. Isolated by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not parse payload from {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

/// A configured origin of items: one feed or one page.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Zero items is a valid answer; errors are reserved for transport/parse failures.
    async fn fetch(&self) -> Result<Vec<Item>, FetchError>;
    fn source(&self) -> &Source;
    /// Endpoint for diagnostics.
    fn endpoint(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_labels_round_trip() {
        let s: Source = serde_json::from_str("\"speech\"").unwrap();
        assert_eq!(s, Source::Other("speech".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"speech\"");

        let known: Source = serde_json::from_str("\"open_meeting\"").unwrap();
        assert_eq!(known, Source::OpenMeeting);
        assert_eq!(known.label(), "Meeting");
    }

    #[test]
    fn summary_falls_back_to_title() {
        let it = Item::new(Source::PressRelease, "SEC Charges X", "https://x", "", "   ");
        assert_eq!(it.summary, "SEC Charges X");
        assert!(it.ai_score().is_none());
    }
}
