use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{format_timestamp, parse_timestamp, Article, FeedStatus, Summary};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS articles (
    key          TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    body         TEXT NOT NULL,
    link         TEXT,
    published_at TEXT,
    source       TEXT NOT NULL,
    category     TEXT,
    ingested_at  TEXT NOT NULL,
    summarized   INTEGER NOT NULL DEFAULT 0,
    language     TEXT,
    country      TEXT
);
CREATE INDEX IF NOT EXISTS idx_articles_ingested ON articles (ingested_at, summarized);

CREATE TABLE IF NOT EXISTS summaries (
    day          TEXT PRIMARY KEY,
    text         TEXT NOT NULL,
    article_keys TEXT NOT NULL,
    model        TEXT NOT NULL,
    generated_at TEXT NOT NULL,
    raw_json     TEXT
);

CREATE TABLE IF NOT EXISTS feeds (
    url             TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    last_fetched_at TEXT,
    last_success_at TEXT,
    last_error      TEXT,
    articles_count  INTEGER NOT NULL DEFAULT 0
);
";

const FEED_COLUMNS: &str =
    "url, name, last_fetched_at, last_success_at, last_error, articles_count";

const ARTICLE_COLUMNS: &str = "key, title, body, link, published_at, source, category, \
     ingested_at, summarized, language, country";

/// Totals printed after an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub articles: usize,
    pub categories: usize,
    pub countries: usize,
}

/// SQLite-backed storage shared by the ingestor and the summarizer.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (and if needed creates) the database named by `DATABASE_URL`.
    pub fn open(database_url: &str) -> Result<Self> {
        let path = database_path(database_url)?;
        if path == ":memory:" {
            return Self::open_in_memory();
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Inserts articles in one transaction, skipping keys already stored.
    /// Returns how many rows were actually added.
    pub fn insert_articles(&mut self, articles: &[Article]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO articles ({ARTICLE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ))?;
            for article in articles {
                inserted += stmt.execute(params![
                    article.key,
                    article.title,
                    article.body,
                    article.link,
                    article.published_at.as_ref().map(format_timestamp),
                    article.source,
                    article.category,
                    format_timestamp(&article.ingested_at),
                    article.summarized,
                    article.language,
                    article.country,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn article(&self, key: &str) -> Result<Option<Article>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE key = ?1"))?;
        stmt.query_row([key], article_from_row)
            .optional()?
            .transpose()
    }

    pub fn count_articles(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let (articles, categories, countries): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT category), COUNT(DISTINCT country) FROM articles",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(StoreStats {
            articles: articles as usize,
            categories: categories as usize,
            countries: countries as usize,
        })
    }

    /// Article counts per category, largest first. Uncategorized articles are left out.
    pub fn category_counts(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) AS n FROM articles
             WHERE category IS NOT NULL
             GROUP BY category
             ORDER BY n DESC, category",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Articles ingested in `[start, end)` that no summary has consumed yet.
    pub fn unsummarized_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE ingested_at >= ?1 AND ingested_at < ?2 AND summarized = 0
             ORDER BY ingested_at, key"
        ))?;
        let rows = stmt.query_map(
            params![format_timestamp(&start), format_timestamp(&end)],
            article_from_row,
        )?;

        let mut articles = Vec::new();
        for row in rows {
            articles.push(row??);
        }
        Ok(articles)
    }

    pub fn record_feed_success(
        &self,
        url: &str,
        name: &str,
        at: DateTime<Utc>,
        new_articles: usize,
    ) -> Result<()> {
        let at = format_timestamp(&at);
        self.conn.execute(
            "INSERT INTO feeds (url, name, last_fetched_at, last_success_at, last_error, articles_count)
             VALUES (?1, ?2, ?3, ?3, NULL, ?4)
             ON CONFLICT(url) DO UPDATE SET
                 name = excluded.name,
                 last_fetched_at = excluded.last_fetched_at,
                 last_success_at = excluded.last_success_at,
                 last_error = NULL,
                 articles_count = feeds.articles_count + excluded.articles_count",
            params![url, name, at, new_articles as i64],
        )?;
        Ok(())
    }

    pub fn record_feed_failure(
        &self,
        url: &str,
        name: &str,
        at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO feeds (url, name, last_fetched_at, last_error)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                 name = excluded.name,
                 last_fetched_at = excluded.last_fetched_at,
                 last_error = excluded.last_error",
            params![url, name, format_timestamp(&at), error],
        )?;
        Ok(())
    }

    pub fn feed_status(&self, url: &str) -> Result<Option<FeedStatus>> {
        let status = self
            .conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?1"),
                [url],
                feed_status_from_row,
            )
            .optional()?;
        Ok(status)
    }

    /// Every feed seen so far, by name.
    pub fn feed_statuses(&self) -> Result<Vec<FeedStatus>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY name, url"))?;
        let rows = stmt.query_map([], feed_status_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn summary_for_day(&self, day: NaiveDate) -> Result<Option<Summary>> {
        let raw = self
            .conn
            .query_row(
                "SELECT day, text, article_keys, model, generated_at, raw_json
                 FROM summaries WHERE day = ?1",
                [day.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((day_raw, text, keys_raw, model, generated_raw, raw_json)) = raw else {
            return Ok(None);
        };

        let day = day_raw
            .parse::<NaiveDate>()
            .map_err(|e| Error::CorruptRecord(format!("summary day {day_raw:?}: {e}")))?;
        let article_keys: Vec<String> = serde_json::from_str(&keys_raw)
            .map_err(|e| Error::CorruptRecord(format!("article keys for {day}: {e}")))?;
        let generated_at = parse_timestamp(&generated_raw).ok_or_else(|| {
            Error::CorruptRecord(format!("generated_at for {day}: {generated_raw:?}"))
        })?;

        Ok(Some(Summary {
            day,
            text,
            article_keys,
            model,
            generated_at,
            raw_json,
        }))
    }

    /// Writes the summary and flags every article it consumed, all or nothing.
    ///
    /// Fails with [`Error::SummaryConflict`] if the day already has a summary or
    /// any listed article is missing or already summarized; nothing is written then.
    pub fn commit_summary(&mut self, summary: &Summary) -> Result<()> {
        let keys = serde_json::to_string(&summary.article_keys)
            .map_err(|e| Error::CorruptRecord(format!("article keys for {}: {e}", summary.day)))?;

        // take the write lock up front so a concurrent ingest makes us wait, not fail
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM summaries WHERE day = ?1)",
            [summary.day.to_string()],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::SummaryConflict(summary.day));
        }

        tx.execute(
            "INSERT INTO summaries (day, text, article_keys, model, generated_at, raw_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                summary.day.to_string(),
                summary.text,
                keys,
                summary.model,
                format_timestamp(&summary.generated_at),
                summary.raw_json,
            ],
        )?;

        {
            let mut mark =
                tx.prepare("UPDATE articles SET summarized = 1 WHERE key = ?1 AND summarized = 0")?;
            for key in &summary.article_keys {
                if mark.execute([key])? == 0 {
                    debug!(%key, day = %summary.day, "article missing or already summarized");
                    return Err(Error::SummaryConflict(summary.day));
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

/// Half-open UTC window covering one calendar day.
pub fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    (start, start + chrono::Duration::days(1))
}

/// Accepts `sqlite://path`, `sqlite:path`, or a bare path. URLs for any
/// other database (`postgresql://...`) are rejected.
pub fn database_path(database_url: &str) -> Result<&str> {
    if let Some(path) = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
    {
        return Ok(path);
    }

    if let Some((scheme, _)) = database_url.split_once("://") {
        return Err(Error::Configuration(format!(
            "DATABASE_URL uses unsupported scheme {scheme:?}; only SQLite paths are supported"
        )));
    }

    Ok(database_url)
}

fn feed_status_from_row(row: &Row<'_>) -> rusqlite::Result<FeedStatus> {
    Ok(FeedStatus {
        url: row.get(0)?,
        name: row.get(1)?,
        last_fetched_at: row
            .get::<_, Option<String>>(2)?
            .as_deref()
            .and_then(parse_timestamp),
        last_success_at: row
            .get::<_, Option<String>>(3)?
            .as_deref()
            .and_then(parse_timestamp),
        last_error: row.get(4)?,
        articles_count: row.get(5)?,
    })
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Article>> {
    let key: String = row.get(0)?;
    let published_raw: Option<String> = row.get(4)?;
    let ingested_raw: String = row.get(7)?;

    let Some(ingested_at) = parse_timestamp(&ingested_raw) else {
        return Ok(Err(Error::CorruptRecord(format!(
            "ingested_at for {key}: {ingested_raw:?}"
        ))));
    };

    Ok(Ok(Article {
        title: row.get(1)?,
        body: row.get(2)?,
        link: row.get(3)?,
        published_at: published_raw.as_deref().and_then(parse_timestamp),
        source: row.get(5)?,
        category: row.get(6)?,
        ingested_at,
        summarized: row.get(8)?,
        language: row.get(9)?,
        country: row.get(10)?,
        key,
    }))
}
