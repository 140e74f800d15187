use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// An article as stored, keyed by its stable identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub key: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    pub category: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub summarized: bool,
    pub language: Option<String>,
    pub country: Option<String>,
}

impl Article {
    /// Host name the article came from: its own link's host, else the feed's.
    pub fn website(&self) -> String {
        self.link
            .as_deref()
            .and_then(host_of)
            .or_else(|| host_of(&self.source))
            .unwrap_or_else(|| self.source.clone())
    }
}

fn host_of(raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

/// One generated summary per UTC calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub day: NaiveDate,
    pub text: String,
    pub article_keys: Vec<String>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    /// The model's JSON reply, kept verbatim when it answered in the requested shape.
    pub raw_json: Option<String>,
}

/// The JSON shape the daily prompt asks the model to answer in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StructuredDigest {
    pub text_summary: String,
    pub detailed_summary: String,
    pub main_events: BTreeMap<String, String>,
    pub key_themes: BTreeMap<String, String>,
    pub impacted_regions: BTreeMap<String, String>,
    pub timeline: BTreeMap<String, String>,
}

impl StructuredDigest {
    /// Pulls the JSON object out of a reply, tolerating code fences and
    /// surrounding prose. Returns the digest and the JSON text it came from.
    pub fn from_reply(reply: &str) -> Option<(Self, &str)> {
        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        if end < start {
            return None;
        }
        let json = &reply[start..=end];
        let digest: StructuredDigest = serde_json::from_str(json).ok()?;
        if digest.text_summary.trim().is_empty() && digest.detailed_summary.trim().is_empty() {
            return None;
        }
        Some((digest, json))
    }

    /// Readable rendering stored as the summary text.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = [&self.text_summary, &self.detailed_summary]
            .into_iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        for (heading, section) in [
            ("Main events", &self.main_events),
            ("Key themes", &self.key_themes),
            ("Impacted regions", &self.impacted_regions),
            ("Timeline", &self.timeline),
        ] {
            if section.is_empty() {
                continue;
            }
            let lines: Vec<String> = section
                .iter()
                .map(|(name, detail)| format!("- {name}: {detail}"))
                .collect();
            parts.push(format!("{heading}:\n{}", lines.join("\n")));
        }

        parts.join("\n\n")
    }
}

/// Fetch bookkeeping for a configured feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedStatus {
    pub url: String,
    pub name: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub articles_count: i64,
}

/// Second precision, `Z` suffix: string order matches time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
