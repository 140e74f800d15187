// Public modules
pub mod config;
pub mod daily;
pub mod error;
pub mod feeds;
pub mod fetcher;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod parser;
pub mod prompt;
pub mod store;

// Re-export commonly used types
pub use config::{Config, LlmSettings};
pub use daily::{default_target_day, preview_prompt, run_daily_summary, DailyOutcome};
pub use error::{Error, FeedError, LlmError, Result};
pub use feeds::{FeedSource, FeedsFile, IngestSettings};
pub use fetcher::FeedFetcher;
pub use ingest::{run_ingest, IngestReport};
pub use llm::ClaudeClient;
pub use models::{Article, FeedStatus, StructuredDigest, Summary};
pub use store::{Store, StoreStats};

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber on stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
