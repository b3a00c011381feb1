// src/ingest/providers/events_page.rs
//! Page fetcher for the SEC "upcoming events" listing.
//!
//! The page follows the USWDS collection convention: every event is an
//! `li.usa-collection__item` card with a heading link, an optional
//! description and an optional `<time datetime="...">`. Cards that lack a
//! heading link are skipped; the rest of the page still counts.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use metrics::histogram;
use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::ingest::http::get_text;
use crate::ingest::normalize_text;
use crate::ingest::types::{FetchError, Item, Source, SourceFetcher};

static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.usa-collection__item").expect("card selector"));
static HEADING_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".usa-collection__heading a[href]").expect("heading selector"));
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".usa-collection__description").expect("description selector"));
static TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("time selector"));

pub struct EventsPageFetcher {
    source: Source,
    url: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http(reqwest::Client),
}

impl EventsPageFetcher {
    pub fn from_url(source: Source, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            source,
            url: url.into(),
            mode: Mode::Http(client),
        }
    }

    /// `page_url` is still needed to resolve relative card links.
    pub fn from_fixture_str(source: Source, page_url: impl Into<String>, html: &str) -> Self {
        Self {
            source,
            url: page_url.into(),
            mode: Mode::Fixture(html.to_string()),
        }
    }

    /// Extract event cards from an HTML document.
    pub fn parse_items(source: &Source, page_url: &str, html: &str) -> Result<Vec<Item>, FetchError> {
        let t0 = std::time::Instant::now();
        let base = Url::parse(page_url).map_err(|e| FetchError::Parse {
            url: page_url.to_string(),
            reason: format!("invalid page url: {e}"),
        })?;

        let doc = Html::parse_document(html);
        let mut out = Vec::new();
        for card in doc.select(&CARD) {
            match parse_card(source, &base, card) {
                Some(item) => out.push(item),
                None => tracing::debug!(page = page_url, "skipping card without heading link"),
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(out)
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn parse_card(source: &Source, base: &Url, card: ElementRef<'_>) -> Option<Item> {
    let link = card.select(&HEADING_LINK).next()?;
    let title = element_text(link);
    let href = link.value().attr("href")?.trim();
    if title.is_empty() || href.is_empty() {
        return None;
    }
    let url = base.join(href).ok()?.to_string();

    let description = card
        .select(&DESCRIPTION)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let published = card
        .select(&TIME)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(format_event_time)
        .unwrap_or_default();

    let summary = if description.is_empty() {
        title.clone()
    } else {
        format!("{title}. {description}")
    };

    Some(Item::new(source.clone(), title, url, published, summary))
}

/// Renders a machine-readable `datetime` attribute; unknown shapes are kept verbatim.
pub fn format_event_time(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %I:%M %p %:z").to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return naive.format("%Y-%m-%d %I:%M %p").to_string();
    }
    raw.to_string()
}

#[async_trait]
impl SourceFetcher for EventsPageFetcher {
    async fn fetch(&self) -> Result<Vec<Item>, FetchError> {
        // `Html` is !Send, so parsing happens after the await completes.
        let body = match &self.mode {
            Mode::Fixture(html) => html.clone(),
            Mode::Http(client) => get_text(client, &self.url).await?,
        };
        Self::parse_items(&self.source, &self.url, &body)
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://www.sec.gov/news/upcoming-events";

    #[test]
    fn card_fields_are_extracted() {
        let html = r#"
        <ul class="usa-collection">
          <li class="usa-collection__item">
            <div class="usa-collection__body">
              <h3 class="usa-collection__heading"><a href="/news/open-meeting-2025-03-04">Open Meeting</a></h3>
              <div class="usa-collection__description"> Crypto custody rule proposal </div>
              <time datetime="2025-03-04T10:00:00-05:00">March 4, 2025</time>
            </div>
          </li>
        </ul>"#;
        let items = EventsPageFetcher::parse_items(&Source::OpenMeeting, PAGE, html).unwrap();
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.title, "Open Meeting");
        assert_eq!(it.url, "https://www.sec.gov/news/open-meeting-2025-03-04");
        assert_eq!(it.summary, "Open Meeting. Crypto custody rule proposal");
        assert_eq!(it.published, "2025-03-04 10:00 AM -05:00");
    }

    #[test]
    fn missing_pieces_degrade_per_card() {
        let html = r#"
        <ul>
          <li class="usa-collection__item"><h3 class="usa-collection__heading">No link here</h3></li>
          <li class="usa-collection__item">
            <h3 class="usa-collection__heading"><a href="https://other.test/roundtable">Roundtable</a></h3>
          </li>
        </ul>"#;
        let items = EventsPageFetcher::parse_items(&Source::OpenMeeting, PAGE, html).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://other.test/roundtable");
        assert_eq!(items[0].summary, "Roundtable");
        assert_eq!(items[0].published, "");
    }

    #[test]
    fn page_without_cards_is_empty_not_an_error() {
        let items =
            EventsPageFetcher::parse_items(&Source::OpenMeeting, PAGE, "<html><body><p>None scheduled</p></body></html>")
                .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn datetime_attribute_formats() {
        assert_eq!(format_event_time("2025-06-10T14:30:00"), "2025-06-10 02:30 PM");
        assert_eq!(format_event_time("next Tuesday"), "next Tuesday");
    }
}
