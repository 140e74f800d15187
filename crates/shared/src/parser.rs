use chrono::{DateTime, Utc};
use scraper::Html;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::FeedError;

/// Longest body kept per article, in chars.
pub const MAX_BODY_CHARS: usize = 10_000;

/// An entry pulled out of an RSS or Atom document, not yet tied to a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub guid: Option<String>,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Language declared by the document (`<language>` or `xml:lang`).
    pub language: Option<String>,
}

impl ParsedEntry {
    /// Stable identity: GUID, then link, then a digest of what is left.
    ///
    /// A GUID that is not an absolute URI (`1`, `post-42`) is only unique
    /// within its feed, so it is prefixed with the feed URL.
    pub fn key(&self, source: &str) -> String {
        if let Some(guid) = non_empty(self.guid.as_deref()) {
            let guid = guid.trim();
            return match Url::parse(guid) {
                Ok(_) => guid.to_string(),
                Err(_) => format!("{source}#{guid}"),
            };
        }
        if let Some(link) = non_empty(self.link.as_deref()) {
            return link.to_string();
        }

        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.title.as_bytes());
        hasher.update(b"\n");
        if let Some(published) = self.published_at {
            hasher.update(published.to_rfc3339().as_bytes());
        }
        format!("sha256:{:x}", hasher.finalize())
    }
}

/// Parses an RSS 2.0 document, falling back to Atom.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ParsedEntry>, FeedError> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => {
            let language = non_empty(channel.language()).map(str::to_owned);
            Ok(channel
                .items()
                .iter()
                .map(|item| from_rss_item(item, language.clone()))
                .collect())
        }
        Err(rss_err) => match atom_syndication::Feed::read_from(bytes) {
            Ok(feed) => {
                let language = non_empty(feed.lang()).map(str::to_owned);
                Ok(feed
                    .entries()
                    .iter()
                    .map(|entry| from_atom_entry(entry, language.clone()))
                    .collect())
            }
            Err(atom_err) => Err(FeedError::Parse(format!(
                "not RSS ({rss_err}) and not Atom ({atom_err})"
            ))),
        },
    }
}

fn from_rss_item(item: &rss::Item, language: Option<String>) -> ParsedEntry {
    let published_at = item.pub_date().and_then(parse_date);

    // content:encoded is usually the full article, description the teaser
    let raw_body = item.content().or(item.description()).unwrap_or_default();

    ParsedEntry {
        guid: item.guid().map(|guid| guid.value().trim().to_owned()),
        title: clean_text(item.title().unwrap_or_default()),
        body: truncate_body(clean_text(raw_body)),
        link: non_empty(item.link()).map(|l| l.trim().to_owned()),
        published_at,
        language,
    }
}

fn from_atom_entry(
    entry: &atom_syndication::Entry,
    language: Option<String>,
) -> ParsedEntry {
    let link = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .map(|l| l.href().trim().to_owned());

    let raw_body = entry
        .content()
        .and_then(|c| c.value())
        .or_else(|| entry.summary().map(|s| s.value.as_str()))
        .unwrap_or_default();

    let published_at = entry
        .published()
        .unwrap_or_else(|| entry.updated())
        .with_timezone(&Utc);

    ParsedEntry {
        guid: Some(entry.id().trim().to_owned()),
        title: clean_text(&entry.title().value),
        body: truncate_body(clean_text(raw_body)),
        link,
        published_at: Some(published_at),
        language,
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(raw.trim()))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Strips markup and collapses whitespace.
pub fn clean_text(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return raw.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    let fragment = Html::parse_fragment(raw);
    let text: Vec<&str> = fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect();
    text.join(" ")
}

fn truncate_body(body: String) -> String {
    truncate_chars(&body, MAX_BODY_CHARS)
}

/// Cuts to at most `max` chars on a char boundary, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
