// src/ingest/providers/feed_rss.rs
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::ingest::http::get_text;
use crate::ingest::normalize_text;
use crate::ingest::types::{FetchError, Item, Source, SourceFetcher};

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    /// `rel="alternate"` (or no rel at all) is the human-facing link.
    fn alternate_href(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.link.first())
            .and_then(|l| l.href.as_deref())
    }
}

/// Feed fetcher: one syndication endpoint, one source label.
pub struct FeedFetcher {
    source: Source,
    mode: Mode,
}

enum Mode {
    Fixture { label: String, xml: String },
    Http { url: String, client: reqwest::Client },
}

impl FeedFetcher {
    pub fn from_url(source: Source, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            source,
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    /// Serves a fixed document; used by tests and offline runs.
    pub fn from_fixture_str(source: Source, xml: &str) -> Self {
        Self {
            mode: Mode::Fixture {
                label: format!("fixture:{source}"),
                xml: xml.to_string(),
            },
            source,
        }
    }

    /// Parse a feed document into items. Zero entries is a valid result.
    pub fn parse_items(source: &Source, endpoint: &str, xml: &str) -> Result<Vec<Item>, FetchError> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let parse_err = |reason: String| FetchError::Parse {
            url: endpoint.to_string(),
            reason,
        };

        let out = match root_name(&xml_clean).as_deref() {
            Some("rss") => {
                let rss: Rss = from_str(&xml_clean).map_err(|e| parse_err(e.to_string()))?;
                rss.channel
                    .item
                    .into_iter()
                    .filter_map(|it| {
                        build_item(
                            source,
                            it.title.as_deref(),
                            it.link.as_deref(),
                            it.pub_date.as_deref(),
                            it.description.as_deref(),
                        )
                    })
                    .collect::<Vec<_>>()
            }
            Some("feed") => {
                let feed: AtomFeed = from_str(&xml_clean).map_err(|e| parse_err(e.to_string()))?;
                feed.entry
                    .iter()
                    .filter_map(|e| {
                        build_item(
                            source,
                            e.title.as_ref().map(|t| t.value.as_str()),
                            e.alternate_href(),
                            e.published.as_deref().or(e.updated.as_deref()),
                            e.summary.as_ref().map(|t| t.value.as_str()),
                        )
                    })
                    .collect::<Vec<_>>()
            }
            Some(other) => return Err(parse_err(format!("unsupported feed root <{other}>"))),
            None => return Err(parse_err("document has no root element".into())),
        };

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(out)
    }
}

fn build_item(
    source: &Source,
    title: Option<&str>,
    link: Option<&str>,
    published: Option<&str>,
    description: Option<&str>,
) -> Option<Item> {
    let title = normalize_text(title.unwrap_or_default());
    let link = link.unwrap_or_default().trim();
    if title.is_empty() || link.is_empty() {
        return None;
    }
    let summary = normalize_text(description.unwrap_or_default());
    Some(Item::new(
        source.clone(),
        title,
        link,
        published.unwrap_or_default().trim(),
        summary,
    ))
}

/// Local name of the first element in the document.
fn root_name(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

#[async_trait]
impl SourceFetcher for FeedFetcher {
    async fn fetch(&self) -> Result<Vec<Item>, FetchError> {
        match &self.mode {
            Mode::Fixture { label, xml } => Self::parse_items(&self.source, label, xml),
            Mode::Http { url, client } => {
                let body = get_text(client, url).await?;
                Self::parse_items(&self.source, url, &body)
            }
        }
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn endpoint(&self) -> &str {
        match &self.mode {
            Mode::Fixture { label, .. } => label,
            Mode::Http { url, .. } => url,
        }
    }
}

/// HTML entities that feeds use but XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_without_items_is_an_empty_feed() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let items = FeedFetcher::parse_items(&Source::PressRelease, "t", xml).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn entries_without_link_or_title_are_skipped() {
        let xml = r#"<rss><channel>
            <item><title>Has both</title><link>https://x.test/a</link></item>
            <item><title>No link</title></item>
            <item><link>https://x.test/c</link></item>
        </channel></rss>"#;
        let items = FeedFetcher::parse_items(&Source::PressRelease, "t", xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://x.test/a");
        assert_eq!(items[0].summary, "Has both");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = FeedFetcher::parse_items(&Source::PressRelease, "t", "not xml at all").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
        let err = FeedFetcher::parse_items(&Source::PressRelease, "t", "<html><body/></html>").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }
}
