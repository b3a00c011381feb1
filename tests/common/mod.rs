// Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sec_monitor::{FetchError, Item, Source, SourceFetcher};

/// Serves a fixed list of `(url, title)` pairs, or fails every time.
pub struct StaticFetcher {
    pub source: Source,
    pub entries: Vec<(String, String)>,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticFetcher {
    pub fn new(source: Source, entries: &[(&str, &str)]) -> Self {
        Self {
            source,
            entries: entries
                .iter()
                .map(|(u, t)| (u.to_string(), t.to_string()))
                .collect(),
            fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(source: Source) -> Self {
        Self {
            fail: true,
            ..Self::new(source, &[])
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn boxed(self) -> Box<dyn SourceFetcher> {
        Box::new(self)
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self) -> Result<Vec<Item>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            return Err(FetchError::Timeout {
                url: format!("https://down.test/{}", self.source),
            });
        }
        Ok(self
            .entries
            .iter()
            .map(|(u, t)| Item::new(self.source.clone(), t.as_str(), u.as_str(), "", ""))
            .collect())
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn endpoint(&self) -> &str {
        "static"
    }
}

pub fn data_path(dir: &Path) -> std::path::PathBuf {
    dir.join("items.json")
}
