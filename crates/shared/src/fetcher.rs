use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{retry_delay, Error, FeedError, Result};
use crate::feeds::{FeedSource, IngestSettings};
use crate::parser::{parse_feed, ParsedEntry};

pub struct FeedFetcher {
    client: Client,
    concurrency: usize,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl FeedFetcher {
    pub fn new(settings: &IngestSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self {
            client,
            concurrency: settings.concurrency.max(1),
            retry_attempts: settings.retry_attempts,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    /// Fetches and parses one feed, retrying transient failures a bounded number of times.
    pub async fn fetch(&self, url: &str) -> Result<Vec<ParsedEntry>, FeedError> {
        let mut attempt = 0;
        loop {
            match self.try_fetch(url).await {
                Ok(entries) => return Ok(entries),
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    let backoff = retry_delay(self.retry_backoff, attempt);
                    warn!(feed = %url, error = %e, ?backoff, "feed fetch failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Vec<ParsedEntry>, FeedError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }

        let bytes = response.bytes().await?;
        let entries = parse_feed(&bytes)?;
        debug!(feed = %url, entries = entries.len(), "parsed feed");
        Ok(entries)
    }

    /// Fetches every feed with bounded parallelism. Results come back in completion order.
    pub async fn fetch_all(
        &self,
        feeds: Vec<FeedSource>,
    ) -> Vec<(FeedSource, Result<Vec<ParsedEntry>, FeedError>)> {
        stream::iter(feeds)
            .map(|feed| async move {
                let result = self.fetch(&feed.url).await;
                (feed, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
