// Stack Exchange search (`/2.3/search/advanced`), Stack Overflow by default.
// Responses are always gzip-compressed; the reqwest `gzip` feature handles that.
// The API reports throttling as HTTP 400 with `error_id` 502, and may attach a
// `backoff` field to successful responses that must be honoured. The daily
// request quota resets at midnight UTC; once a response reports it spent, the
// client refuses further calls until then.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use threadscout_common::config::{PageLimits, StackExchangeSettings};
use threadscout_common::{DiscussionRecord, Platform};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::http::classify;
use crate::text::{epoch_to_utc, strip_html};
use crate::types::{PageCursor, SearchPage};

const STACKEXCHANGE_API_URL: &str = "https://api.stackexchange.com/2.3";
const THROTTLE_ERROR_ID: i64 = 502;

static WAIT_SECS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+seconds?").expect("valid regex"));

pub struct StackExchangeClient {
    http: reqwest::Client,
    base_url: String,
    settings: StackExchangeSettings,
    /// Unix seconds of the next quota reset; zero while quota remains.
    quota_resets_at: AtomicI64,
}

impl StackExchangeClient {
    pub fn new(http: reqwest::Client, settings: StackExchangeSettings) -> Self {
        Self {
            http,
            base_url: STACKEXCHANGE_API_URL.to_string(),
            settings,
            quota_resets_at: AtomicI64::new(0),
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
        if let Some(resets_at) = self.quota_exhausted_until(Utc::now()) {
            return Err(ClientError::QuotaExhausted { resets_at });
        }

        let page_num = match cursor {
            PageCursor::Page(n) => *n,
            _ => 1,
        };

        let mut req = self
            .http
            .get(format!("{}/search/advanced", self.base_url))
            .query(&[
                ("q", keyword),
                ("site", self.settings.site.as_str()),
                ("order", "desc"),
                ("sort", "relevance"),
                ("filter", "withbody"),
            ])
            .query(&[("pagesize", self.settings.limits.page_size), ("page", page_num)]);

        if let Some(key) = &self.settings.key {
            req = req.query(&[("key", key.as_str())]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let headers = resp.headers().clone();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_error(status, &headers, &text));
        }

        let body: Value = resp.json().await?;
        let page = parse_search(&body, page_num)?;

        if body["quota_remaining"].as_i64() == Some(0) {
            let resets_at = next_quota_reset(Utc::now());
            warn!(
                keyword,
                page = page_num,
                more_pages = !page.is_last(),
                %resets_at,
                "stackexchange: daily quota exhausted"
            );
            self.quota_resets_at
                .store(resets_at.timestamp(), Ordering::Relaxed);
        }

        debug!(
            keyword,
            page = page_num,
            records = page.records.len(),
            skipped = page.skipped,
            quota_remaining = body["quota_remaining"].as_i64(),
            "stackexchange: page fetched"
        );
        Ok(page)
    }

    fn quota_exhausted_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let resets_at = self.quota_resets_at.load(Ordering::Relaxed);
        if resets_at > now.timestamp() {
            DateTime::from_timestamp(resets_at, 0)
        } else {
            None
        }
    }
}

fn next_quota_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now + chrono::Duration::days(1))
}

/// Map a Stack Exchange error wrapper to a `ClientError`. Throttle violations
/// become `RateLimited`, using the wait the message names when present.
pub fn classify_error(status: StatusCode, headers: &HeaderMap, text: &str) -> ClientError {
    let wrapper: Value = serde_json::from_str(text).unwrap_or(Value::Null);
    if wrapper["error_id"].as_i64() == Some(THROTTLE_ERROR_ID) {
        let message = wrapper["error_message"].as_str().unwrap_or_default();
        let retry_after = WAIT_SECS_RE
            .captures(message)
            .and_then(|c| c[1].parse::<u64>().ok())
            .map(Duration::from_secs);
        return ClientError::RateLimited { retry_after };
    }
    classify(status, headers, text)
}

#[derive(Debug, Deserialize)]
struct Owner {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Question {
    question_id: u64,
    title: String,
    #[serde(default)]
    body: String,
    link: String,
    owner: Option<Owner>,
    creation_date: i64,
    score: Option<i64>,
    answer_count: Option<i64>,
}

impl Question {
    fn into_record(self) -> Option<DiscussionRecord> {
        DiscussionRecord::new(
            Platform::StackOverflow,
            self.question_id.to_string(),
            strip_html(&self.title),
            strip_html(&self.body),
            self.link,
        )
        .map(|r| {
            r.with_author(self.owner.and_then(|o| o.display_name).map(|n| strip_html(&n)))
                .with_created_at(epoch_to_utc(self.creation_date))
                .with_engagement(self.score, self.answer_count)
        })
    }
}

/// Parse a search wrapper. Missing `items` is a page-level parse error.
pub fn parse_search(body: &Value, page_num: u32) -> Result<SearchPage> {
    let items = body["items"]
        .as_array()
        .ok_or_else(|| ClientError::Parse("stackexchange response has no items".to_string()))?;

    let mut page = SearchPage::default();
    for item in items {
        match serde_json::from_value::<Question>(item.clone()) {
            Ok(q) => match q.into_record() {
                Some(record) => page.records.push(record),
                None => page.skipped += 1,
            },
            Err(e) => {
                debug!(error = %e, "stackexchange: skipping malformed question");
                page.skipped += 1;
            }
        }
    }

    if body["has_more"].as_bool().unwrap_or(false) {
        page.next = Some(PageCursor::Page(page_num + 1));
    }
    page.backoff = body["backoff"].as_u64().map(Duration::from_secs);

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(id: u64) -> Value {
        json!({
            "question_id": id,
            "title": "How to pass context between agents &amp; tools?",
            "body": "<p>I&#39;m building an <code>agent mesh</code>.</p>",
            "link": format!("https://stackoverflow.com/questions/{id}"),
            "owner": {"display_name": "dev"},
            "creation_date": 1714564800,
            "score": 5,
            "answer_count": 2
        })
    }

    #[test]
    fn cleans_title_and_body() {
        let body = json!({"items": [question(1)], "has_more": true, "quota_remaining": 290});
        let page = parse_search(&body, 1).unwrap();

        let r = &page.records[0];
        assert_eq!(r.title, "How to pass context between agents & tools?");
        assert!(r.body.starts_with("I'm building an"), "{}", r.body);
        assert!(r.body.contains("agent mesh"));
        assert_eq!(r.comments_count, Some(2));
        assert_eq!(page.next, Some(PageCursor::Page(2)));
        assert!(page.backoff.is_none());
    }

    #[test]
    fn backoff_field_is_surfaced() {
        let body = json!({"items": [question(2)], "has_more": true, "backoff": 10});
        let page = parse_search(&body, 3).unwrap();
        assert_eq!(page.backoff, Some(Duration::from_secs(10)));
        assert_eq!(page.next, Some(PageCursor::Page(4)));
    }

    #[test]
    fn exhausted_quota_still_reports_more_pages() {
        let body = json!({"items": [question(3)], "has_more": true, "quota_remaining": 0});
        let page = parse_search(&body, 1).unwrap();
        assert_eq!(page.next, Some(PageCursor::Page(2)));
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn quota_resets_at_next_utc_midnight() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T22:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(next_quota_reset(now).to_rfc3339(), "2024-05-02T00:00:00+00:00");
    }

    #[test]
    fn throttle_violation_is_rate_limited() {
        let text = r#"{"error_id":502,"error_name":"throttle_violation","error_message":"too many requests from this IP, more requests available in 42 seconds"}"#;
        let err = classify_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), text);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
        assert!(err.is_transient());
    }

    #[test]
    fn other_errors_fall_through() {
        let text = r#"{"error_id":400,"error_name":"bad_parameter","error_message":"site is required"}"#;
        let err = classify_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), text);
        assert!(matches!(err, ClientError::Api { status: 400, .. }));
    }

    #[test]
    fn malformed_question_is_skipped() {
        let body = json!({"items": [question(4), {"question_id": "x"}], "has_more": false});
        let page = parse_search(&body, 1).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.skipped, 1);
        assert!(page.is_last());
    }
}
