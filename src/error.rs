use thiserror::Error;

/// Ranking failures. `InsufficientData` means the whole window held no ticks;
/// callers treat it as "no re-target this cycle", not as fatal.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("tick store has no data in the ranking window")]
    InsufficientData,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Connection-level feed failures. Decode problems on individual messages are
/// not represented here; those are handled (counted and skipped) by the ingest
/// session itself.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed connect failed: {0}")]
    Connect(String),
    #[error("feed connection closed: {0}")]
    Closed(String),
    #[error("feed transport error: {0}")]
    Transport(String),
}
