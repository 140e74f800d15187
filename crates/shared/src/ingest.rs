use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::feeds::{FeedSource, IngestSettings};
use crate::fetcher::FeedFetcher;
use crate::models::Article;
use crate::parser::ParsedEntry;
use crate::store::Store;

/// What one ingest run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub feeds_attempted: usize,
    pub feeds_succeeded: usize,
    pub feeds_failed: usize,
    pub articles_inserted: usize,
    pub duplicates: usize,
    /// `(feed url, error)` for every feed that could not be ingested.
    pub failures: Vec<(String, String)>,
}

/// Fetches every feed and stores the entries not seen before.
///
/// A failing feed is logged and recorded in its status row; the run only
/// errors when every attempted feed failed. Storage errors abort immediately.
pub async fn run_ingest(
    store: &mut Store,
    feeds: Vec<FeedSource>,
    settings: &IngestSettings,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        feeds_attempted: feeds.len(),
        ..Default::default()
    };
    if feeds.is_empty() {
        info!("no feeds configured, nothing to ingest");
        return Ok(report);
    }

    let fetcher = FeedFetcher::new(settings)?;
    let results = fetcher.fetch_all(feeds).await;

    for (feed, result) in results {
        let fetched_at = Utc::now();
        match result {
            Ok(entries) => {
                let articles: Vec<Article> = entries
                    .into_iter()
                    .take(settings.max_articles_per_feed)
                    .map(|entry| to_article(&feed, entry, fetched_at))
                    .collect();

                let inserted = store.insert_articles(&articles)?;
                store.record_feed_success(&feed.url, &feed.name, fetched_at, inserted)?;

                report.feeds_succeeded += 1;
                report.articles_inserted += inserted;
                report.duplicates += articles.len() - inserted;
                info!(
                    feed = %feed.name,
                    entries = articles.len(),
                    inserted,
                    "ingested feed"
                );
            }
            Err(source) => {
                let err = Error::FeedFetch {
                    url: feed.url.clone(),
                    source,
                };
                warn!(feed = %feed.name, error = %err, "skipping feed");
                store.record_feed_failure(&feed.url, &feed.name, fetched_at, &err.to_string())?;
                report.feeds_failed += 1;
                report.failures.push((feed.url, err.to_string()));
            }
        }
    }

    if report.feeds_succeeded == 0 {
        return Err(Error::AllFeedsFailed(report.feeds_failed));
    }

    Ok(report)
}

fn to_article(feed: &FeedSource, entry: ParsedEntry, ingested_at: chrono::DateTime<Utc>) -> Article {
    let key = entry.key(&feed.url);
    let title = if entry.title.is_empty() {
        "No title".to_string()
    } else {
        entry.title
    };

    Article {
        key,
        title,
        body: entry.body,
        link: entry.link,
        published_at: entry.published_at,
        source: feed.url.clone(),
        category: feed.category.clone(),
        ingested_at,
        summarized: false,
        // the document's own declaration wins over the configured default
        language: entry.language.or_else(|| feed.language.clone()),
        country: feed.country.clone(),
    }
}
