use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::llm::ClaudeClient;
use crate::models::{StructuredDigest, Summary};
use crate::prompt::build_daily_prompt;
use crate::store::{day_window, Store};

#[derive(Debug, Clone, PartialEq)]
pub enum DailyOutcome {
    /// No unsummarized articles were ingested that day.
    NothingToSummarize,
    /// The day was summarized by an earlier run.
    AlreadySummarized(Summary),
    Created(Summary),
}

/// The day a scheduled run covers: yesterday, in UTC.
pub fn default_target_day() -> NaiveDate {
    (Utc::now() - chrono::Duration::days(1)).date_naive()
}

/// Summarizes the articles ingested on `day`.
///
/// The API is called before anything is written; if it fails the store is
/// left untouched. The summary insert and the article marking commit together.
pub async fn run_daily_summary(
    store: &mut Store,
    llm: &ClaudeClient,
    day: NaiveDate,
) -> Result<DailyOutcome> {
    if let Some(existing) = store.summary_for_day(day)? {
        info!(%day, "summary already exists");
        return Ok(DailyOutcome::AlreadySummarized(existing));
    }

    let (start, end) = day_window(day);
    let articles = store.unsummarized_between(start, end)?;
    if articles.is_empty() {
        info!(%day, "no unsummarized articles");
        return Ok(DailyOutcome::NothingToSummarize);
    }

    info!(%day, articles = articles.len(), model = llm.model(), "requesting summary");
    let prompt = build_daily_prompt(day, &articles);
    let reply = llm.complete(&prompt).await?;

    // fall back to the plain reply when the model ignored the JSON shape
    let (text, raw_json) = match StructuredDigest::from_reply(&reply) {
        Some((digest, json)) => (digest.render(), Some(json.to_string())),
        None => {
            warn!(%day, "reply was not structured JSON, storing it as plain text");
            (reply.clone(), None)
        }
    };

    let summary = Summary {
        day,
        text,
        article_keys: articles.into_iter().map(|a| a.key).collect(),
        model: llm.model().to_string(),
        generated_at: Utc::now(),
        raw_json,
    };
    store.commit_summary(&summary)?;

    info!(%day, articles = summary.article_keys.len(), "summary stored");
    Ok(DailyOutcome::Created(summary))
}

/// The prompt a run for `day` would send, or `None` when there is nothing to summarize.
pub fn preview_prompt(store: &Store, day: NaiveDate) -> Result<Option<(usize, String)>> {
    let (start, end) = day_window(day);
    let articles = store.unsummarized_between(start, end)?;
    if articles.is_empty() {
        return Ok(None);
    }
    Ok(Some((articles.len(), build_daily_prompt(day, &articles))))
}
