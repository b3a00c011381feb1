// tests/providers_events_page.rs
use sec_monitor::ingest::providers::EventsPageFetcher;
use sec_monitor::{Source, SourceFetcher};

const EVENTS_HTML: &str = include_str!("fixtures/upcoming_events.html");
const PAGE_URL: &str = "https://www.sec.gov/news/upcoming-events";

#[tokio::test]
async fn cards_become_open_meeting_items() {
    let fetcher = EventsPageFetcher::from_fixture_str(Source::OpenMeeting, PAGE_URL, EVENTS_HTML);
    let items = fetcher.fetch().await.expect("page parses");

    // the card without a heading link is skipped
    assert_eq!(items.len(), 2);

    let meeting = &items[0];
    assert_eq!(meeting.source, Source::OpenMeeting);
    assert_eq!(meeting.title, "Open Meeting");
    assert_eq!(
        meeting.url,
        "https://www.sec.gov/newsroom/meetings-events/open-meeting-030625"
    );
    assert_eq!(meeting.published, "2025-03-06 10:00 AM -05:00");
    assert_eq!(
        meeting.summary,
        "Open Meeting. The Commission will consider whether to propose amendments to custody rules for crypto assets."
    );

    let roundtable = &items[1];
    assert_eq!(roundtable.title, "Crypto Task Force Roundtable");
    assert_eq!(roundtable.summary, "Crypto Task Force Roundtable");
    assert!(roundtable.published.is_empty());
}
