use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::models::Article;
use crate::parser::truncate_chars;

/// Body chars each article contributes to the prompt.
pub const PROMPT_BODY_CHARS: usize = 1_500;

/// Articles from one website, newest first.
#[derive(Debug, Clone)]
pub struct SourceGroup<'a> {
    pub website: String,
    pub articles: Vec<&'a Article>,
}

/// Groups by website, busiest source first, ties broken by name.
pub fn group_by_source(articles: &[Article]) -> Vec<SourceGroup<'_>> {
    let mut by_site: BTreeMap<String, Vec<&Article>> = BTreeMap::new();
    for article in articles {
        by_site.entry(article.website()).or_default().push(article);
    }

    let mut groups: Vec<SourceGroup<'_>> = by_site
        .into_iter()
        .map(|(website, mut articles)| {
            articles.sort_by(|a, b| {
                let a_time = a.published_at.unwrap_or(a.ingested_at);
                let b_time = b.published_at.unwrap_or(b.ingested_at);
                b_time.cmp(&a_time).then_with(|| a.key.cmp(&b.key))
            });
            SourceGroup { website, articles }
        })
        .collect();

    // stable sort keeps the BTreeMap's name order among equal counts
    groups.sort_by(|a, b| b.articles.len().cmp(&a.articles.len()));
    groups
}

pub fn build_daily_prompt(day: NaiveDate, articles: &[Article]) -> String {
    let mut prompt = format!(
        r#"You are a news analyst. Below are {count} news articles collected on {day}, grouped by source.

Think through this step by step:
1. Identify the main events of the day, most important first
2. Point out common themes or patterns across sources
3. Note which countries or regions are affected
4. Put the key developments in chronological order

Use only information from the articles. Be concise.

Answer with a single JSON object and nothing else, in this shape:
{{
  "text_summary": "one sentence covering the key points",
  "detailed_summary": "a multi-paragraph analysis",
  "main_events": {{ "event": "why it matters" }},
  "key_themes": {{ "theme": "how it shows up across sources" }},
  "impacted_regions": {{ "country or region": "how it is affected" }},
  "timeline": {{ "time or date": "what happened" }}
}}
List at most 5 main events and 3 key themes.

Articles:
"#,
        count = articles.len(),
        day = day.format("%Y-%m-%d"),
    );

    for group in group_by_source(articles) {
        let _ = writeln!(prompt, "\n## Source: {}", group.website);
        for article in group.articles {
            let _ = writeln!(prompt, "\nTitle: {}", article.title);
            if let Some(link) = &article.link {
                let _ = writeln!(prompt, "Link: {link}");
            }
            if let Some(published) = article.published_at {
                let _ = writeln!(prompt, "Published: {}", published.format("%Y-%m-%d %H:%M UTC"));
            }
            let body = if article.body.is_empty() {
                "No content".to_string()
            } else {
                truncate_chars(&article.body, PROMPT_BODY_CHARS)
            };
            let _ = writeln!(prompt, "Content: {body}");
        }
    }

    prompt
}
