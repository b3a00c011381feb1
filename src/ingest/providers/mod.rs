pub mod events_page;
pub mod feed_rss;

pub use events_page::EventsPageFetcher;
pub use feed_rss::FeedFetcher;
