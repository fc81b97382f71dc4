// Reddit search via the public JSON listing endpoints.
// Unauthenticated; Reddit only asks for a descriptive User-Agent.

use serde::Deserialize;
use serde_json::Value;
use threadscout_common::config::{PageLimits, RedditSettings};
use threadscout_common::{DiscussionRecord, Platform};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::http::read_json;
use crate::text::epoch_to_utc;
use crate::types::{PageCursor, SearchPage};

const REDDIT_API_URL: &str = "https://www.reddit.com";
/// Permalinks are always rendered against the public site.
const REDDIT_WEB_URL: &str = "https://www.reddit.com";

pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
    settings: RedditSettings,
}

impl RedditClient {
    pub fn new(http: reqwest::Client, settings: RedditSettings) -> Self {
        Self {
            http,
            base_url: REDDIT_API_URL.to_string(),
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

    /// `/search.json` for site-wide search, `/r/a+b/search.json` when restricted.
    fn search_url(&self) -> String {
        if self.settings.subreddits.is_empty() {
            format!("{}/search.json", self.base_url)
        } else {
            format!(
                "{}/r/{}/search.json",
                self.base_url,
                self.settings.subreddits.join("+")
            )
        }
    }

    pub async fn fetch_page(&self, keyword: &str, cursor: &PageCursor) -> Result<SearchPage> {
        let mut req = self
            .http
            .get(self.search_url())
            .query(&[
                ("q", keyword),
                ("sort", "relevance"),
                ("t", self.settings.time_window.as_str()),
                ("raw_json", "1"),
            ])
            .query(&[("limit", self.settings.limits.page_size)]);

        if !self.settings.subreddits.is_empty() {
            req = req.query(&[("restrict_sr", "on")]);
        }
        if let PageCursor::Token(after) = cursor {
            req = req.query(&[("after", after.as_str())]);
        }

        let body = read_json(req.send().await?).await?;
        let page = parse_listing(&body)?;

        debug!(
            keyword,
            records = page.records.len(),
            skipped = page.skipped,
            "reddit: page fetched"
        );
        Ok(page)
    }
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    id: String,
    name: Option<String>,
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    permalink: String,
    created_utc: f64,
    score: Option<i64>,
    num_comments: Option<i64>,
}

impl RedditPost {
    fn into_record(self) -> Option<DiscussionRecord> {
        let url = format!("{}{}", REDDIT_WEB_URL, self.permalink);
        let id = self.name.unwrap_or(self.id);
        DiscussionRecord::new(Platform::Reddit, id, self.title, self.selftext, url).map(|r| {
            r.with_author(self.author)
                .with_created_at(epoch_to_utc(self.created_utc as i64))
                .with_engagement(self.score, self.num_comments)
        })
    }
}

/// Parse a Reddit listing. A listing without `data.children` is a page-level
/// parse error; individual malformed children are skipped.
pub fn parse_listing(body: &Value) -> Result<SearchPage> {
    let children = body["data"]["children"]
        .as_array()
        .ok_or_else(|| ClientError::Parse("reddit listing has no data.children".to_string()))?;

    let mut page = SearchPage::default();
    for child in children {
        let post = match serde_json::from_value::<RedditPost>(child["data"].clone()) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "reddit: skipping malformed post");
                page.skipped += 1;
                continue;
            }
        };
        match post.into_record() {
            Some(record) => page.records.push(record),
            None => page.skipped += 1,
        }
    }

    page.next = body["data"]["after"]
        .as_str()
        .filter(|a| !a.is_empty())
        .map(|a| PageCursor::Token(a.to_string()));

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(id: &str, title: &str) -> Value {
        json!({
            "kind": "t3",
            "data": {
                "id": id,
                "name": format!("t3_{id}"),
                "title": title,
                "selftext": "How are people wiring agent to agent calls?",
                "author": "someuser",
                "permalink": format!("/r/LocalLLaMA/comments/{id}/slug/"),
                "created_utc": 1714564800.0,
                "score": 42,
                "num_comments": 7
            }
        })
    }

    #[test]
    fn parses_posts_into_records() {
        let body = json!({"data": {"children": [post("abc", "A2A protocol thoughts")], "after": "t3_abc"}});
        let page = parse_listing(&body).unwrap();

        assert_eq!(page.records.len(), 1);
        let r = &page.records[0];
        assert_eq!(r.original_id, "t3_abc");
        assert_eq!(r.url, "https://www.reddit.com/r/LocalLLaMA/comments/abc/slug/");
        assert_eq!(r.author.as_deref(), Some("someuser"));
        assert_eq!(r.score, Some(42));
        assert_eq!(r.created_at.unwrap().timestamp(), 1_714_564_800);
        assert_eq!(page.next, Some(PageCursor::Token("t3_abc".to_string())));
    }

    #[test]
    fn malformed_children_are_skipped_not_fatal() {
        let body = json!({"data": {"children": [
            post("a", "one"),
            {"kind": "t3", "data": {"title": 5}},
            post("b", "two"),
            post("c", "three"),
        ], "after": null}});
        let page = parse_listing(&body).unwrap();

        assert_eq!(page.records.len(), 3);
        assert_eq!(page.skipped, 1);
        assert!(page.is_last());
    }

    #[test]
    fn post_without_text_is_dropped() {
        let mut p = post("d", "");
        p["data"]["selftext"] = json!("");
        let page = parse_listing(&json!({"data": {"children": [p]}})).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.skipped, 1);
    }

    #[test]
    fn missing_listing_is_a_page_error() {
        let err = parse_listing(&json!({"error": 500})).unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[test]
    fn restricted_search_joins_subreddits() {
        let settings = RedditSettings {
            subreddits: vec!["LocalLLaMA".into(), "programming".into()],
            ..RedditSettings::default()
        };
        let client = RedditClient::new(reqwest::Client::new(), settings).with_base_url("http://x/");
        assert_eq!(client.search_url(), "http://x/r/LocalLLaMA+programming/search.json");
    }
}
