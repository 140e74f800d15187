use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Upper bound on configured retry counts, for feeds and the language model alike.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("corrupt stored record: {0}")]
    CorruptRecord(String),
    #[error("failed to fetch feed {url}: {source}")]
    FeedFetch {
        url: String,
        #[source]
        source: FeedError,
    },
    #[error("all {0} feeds failed to fetch")]
    AllFeedsFailed(usize),
    #[error("summary generation failed: {0}")]
    SummaryGeneration(#[from] LlmError),
    #[error("summary for {0} conflicts with existing data")]
    SummaryConflict(NaiveDate),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single feed could not be ingested.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("feed parsing error: {0}")]
    Parse(String),
}

impl FeedError {
    /// Transport failures and server errors may clear up on a second try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Network(_) => true,
            FeedError::Status(status) => status.is_server_error(),
            FeedError::Parse(_) => false,
        }
    }
}

/// Failure talking to the language-model API.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Exponential backoff for retry `attempt` (0-based). Saturates instead of overflowing.
pub(crate) fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}
