// src/analyze/mod.rs
//! AI classification of freshly ingested items.

pub mod ai_adapter;
pub mod classifier;
pub mod verdict;

pub use classifier::Classifier;
pub use verdict::{ClassifyMode, Verdict};

/// Why one item ended up without a verdict. Never aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classification service answered with HTTP {0}")]
    Status(u16),
    #[error("classification service returned an empty reply")]
    EmptyReply,
    #[error("malformed classification reply: {0}")]
    Malformed(String),
    #[error("score {0} outside 1..=5")]
    OutOfRange(i64),
}
