// src/ingest/dedup.rs
use std::collections::HashSet;

use crate::ingest::types::Item;

/// A fetched batch split against what the store already holds.
#[derive(Debug, Default)]
pub struct Partition {
    /// Unseen items, in fetch order.
    pub fresh: Vec<Item>,
    pub seen: Vec<Item>,
}

/// Split `batch` into new and already-seen items by exact `url` match.
///
/// URLs are compared byte for byte: `https://a/x` and `https://a/x/` are two
/// different items. A URL repeated inside the batch is new only the first time.
pub fn partition_new(known_urls: &HashSet<String>, batch: Vec<Item>) -> Partition {
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Partition::default();
    for item in batch {
        if known_urls.contains(&item.url) || !taken.insert(item.url.clone()) {
            out.seen.push(item);
        } else {
            out.fresh.push(item);
        }
    }
    out
}
