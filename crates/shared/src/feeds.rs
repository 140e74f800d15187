use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result, MAX_RETRIES};

/// A configured feed source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: None,
            country: None,
            language: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_articles")]
    pub max_articles_per_feed: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_articles_per_feed: default_max_articles(),
            user_agent: default_user_agent(),
        }
    }
}

/// Contents of `feeds.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedsFile {
    #[serde(default)]
    pub settings: IngestSettings,
    #[serde(default)]
    pub feeds: Vec<FeedSource>,
}

impl FeedsFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "feeds file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: FeedsFile = serde_json::from_str(content)
            .map_err(|e| Error::Configuration(format!("invalid feeds file: {e}")))?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        if self.settings.concurrency == 0 {
            return Err(Error::Configuration(
                "settings.concurrency must be at least 1".to_string(),
            ));
        }

        if self.settings.retry_attempts > MAX_RETRIES {
            return Err(Error::Configuration(format!(
                "settings.retry_attempts must be at most {MAX_RETRIES}, got {}",
                self.settings.retry_attempts
            )));
        }

        for feed in &self.feeds {
            let parsed = Url::parse(&feed.url).map_err(|e| {
                Error::Configuration(format!("feed {:?} has invalid URL {}: {e}", feed.name, feed.url))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::Configuration(format!(
                    "feed {:?} must use http or https, got {}",
                    feed.name, feed.url
                )));
            }
        }

        Ok(())
    }

    pub fn enabled_feeds(&self) -> Vec<FeedSource> {
        self.feeds.iter().filter(|f| f.enabled).cloned().collect()
    }

    pub fn feeds_in_category(&self, category: &str) -> Vec<FeedSource> {
        self.feeds
            .iter()
            .filter(|f| {
                f.enabled
                    && f.category
                        .as_deref()
                        .is_some_and(|c| c.eq_ignore_ascii_case(category))
            })
            .cloned()
            .collect()
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_articles() -> usize {
    100
}

fn default_user_agent() -> String {
    format!("news-digest/{}", env!("CARGO_PKG_VERSION"))
}
