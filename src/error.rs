use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load configuration from {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("failed to fetch video feed from {url}: {reason}")]
    FeedFetch { url: String, reason: String },

    #[error("invalid video feed: {0}")]
    FeedInvalid(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
