// Hacker News story search via the Algolia HN API.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::Value;
use threadscout_common::config::{HackerNewsSettings, PageLimits};
use threadscout_common::{DiscussionRecord, Platform};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::http::read_json;
use crate::text::{epoch_to_utc, strip_html};
use crate::types::{PageCursor, SearchPage};

const HN_API_URL: &str = "https://hn.algolia.com/api/v1";
const HN_ITEM_URL: &str = "https://news.ycombinator.com/item?id=";

pub struct HackerNewsClient {
    http: reqwest::Client,
    base_url: String,
    settings: HackerNewsSettings,
}

impl HackerNewsClient {
    pub fn new(http: reqwest::Client, settings: HackerNewsSettings) -> Self {
        Self {
            http,
            base_url: HN_API_URL.to_string(),
            settings,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn limits(&self) -> PageLimits {
        self.settings.limits
    }

    pub async fn fetch_page(&self, keyword: &str, cursor: &PageCursor) -> Result<SearchPage> {
        // Algolia pages are 0-based.
        let page_num = match cursor {
            PageCursor::Page(n) => *n,
            _ => 0,
        };
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.settings.lookback_days));

        let req = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("query", keyword.to_string()),
                ("tags", "story".to_string()),
                ("numericFilters", format!("created_at_i>{}", cutoff.timestamp())),
            ])
            .query(&[
                ("hitsPerPage", self.settings.limits.page_size),
                ("page", page_num),
            ]);

        let body = read_json(req.send().await?).await?;
        let page = parse_search(&body)?;

        debug!(
            keyword,
            page = page_num,
            records = page.records.len(),
            skipped = page.skipped,
            "hackernews: page fetched"
        );
        Ok(page)
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    story_text: Option<String>,
    url: Option<String>,
    author: Option<String>,
    created_at_i: Option<i64>,
    points: Option<i64>,
    num_comments: Option<i64>,
}

impl Hit {
    fn into_record(self) -> Option<DiscussionRecord> {
        // Link posts have no text; the linked URL stands in for the body.
        let body = match self.story_text.as_deref().map(strip_html) {
            Some(text) if !text.is_empty() => text,
            _ => self.url.unwrap_or_default(),
        };
        let url = format!("{HN_ITEM_URL}{}", self.object_id);
        DiscussionRecord::new(
            Platform::HackerNews,
            self.object_id,
            self.title.unwrap_or_default(),
            body,
            url,
        )
        .map(|r| {
            r.with_author(self.author)
                .with_created_at(self.created_at_i.and_then(epoch_to_utc))
                .with_engagement(self.points, self.num_comments)
        })
    }
}

/// Parse an Algolia response. Missing `hits` is a page-level parse error.
pub fn parse_search(body: &Value) -> Result<SearchPage> {
    let hits = body["hits"]
        .as_array()
        .ok_or_else(|| ClientError::Parse("hackernews response has no hits".to_string()))?;

    let mut page = SearchPage::default();
    for hit in hits {
        match serde_json::from_value::<Hit>(hit.clone()) {
            Ok(h) => match h.into_record() {
                Some(record) => page.records.push(record),
                None => page.skipped += 1,
            },
            Err(e) => {
                debug!(error = %e, "hackernews: skipping malformed hit");
                page.skipped += 1;
            }
        }
    }

    let current = body["page"].as_u64().unwrap_or(0);
    let total = body["nbPages"].as_u64().unwrap_or(0);
    if current + 1 < total {
        page.next = Some(PageCursor::Page(current as u32 + 1));
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str) -> Value {
        json!({
            "objectID": id,
            "title": "Show HN: An open agent registry",
            "story_text": null,
            "url": "https://example.com/registry",
            "author": "pg",
            "created_at_i": 1714564800,
            "points": 120,
            "num_comments": 45
        })
    }

    #[test]
    fn link_posts_use_url_as_body() {
        let page = parse_search(&json!({"hits": [hit("1")], "page": 0, "nbPages": 3})).unwrap();

        let r = &page.records[0];
        assert_eq!(r.url, "https://news.ycombinator.com/item?id=1");
        assert_eq!(r.body, "https://example.com/registry");
        assert_eq!(r.score, Some(120));
        assert_eq!(page.next, Some(PageCursor::Page(1)));
    }

    #[test]
    fn story_text_is_stripped() {
        let mut h = hit("2");
        h["story_text"] = json!("<p>Ask HN: how do your agents find each other?</p>");
        let page = parse_search(&json!({"hits": [h], "page": 0, "nbPages": 1})).unwrap();
        assert_eq!(page.records[0].body, "Ask HN: how do your agents find each other?");
        assert!(page.is_last());
    }

    #[test]
    fn last_page_has_no_next() {
        let page = parse_search(&json!({"hits": [hit("3")], "page": 2, "nbPages": 3})).unwrap();
        assert!(page.is_last());
    }

    #[test]
    fn hit_without_title_or_text_is_skipped() {
        let empty = json!({"objectID": "4", "title": null, "story_text": null, "url": null});
        let page = parse_search(&json!({"hits": [empty, hit("5")], "page": 0, "nbPages": 1})).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.skipped, 1);
    }
}
