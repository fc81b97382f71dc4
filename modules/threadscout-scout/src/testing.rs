// Test mocks for the scout.
//
// Two mocks matching the two trait boundaries:
// - MockSearcher (PlatformSearcher): queued pages/errors per (platform, keyword)
// - MockSummarizer (Summarizer): queued completions/errors, records prompts
//
// Plus helpers for constructing records and keywords.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ai_client::{AiError, ChatCompletion, Usage};
use async_trait::async_trait;
use platform_clients::{ClientError, PageCursor, SearchPage};
use threadscout_common::config::PageLimits;
use threadscout_common::{DiscussionRecord, Keyword, Platform};
use tokio_util::sync::CancellationToken;

use crate::traits::{PlatformSearcher, Summarizer};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A valid record with a predictable url and text.
pub fn record(platform: Platform, id: &str) -> DiscussionRecord {
    DiscussionRecord::new(
        platform,
        id,
        format!("Thread {id}"),
        format!("Discussion body for {id}"),
        format!("https://{}.test/{id}", platform.slug()),
    )
    .expect("test record is valid")
}

pub fn keywords(terms: &[&str]) -> Vec<Keyword> {
    terms.iter().map(|t| Keyword::new(*t)).collect()
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

type PairKey = (Platform, String);

/// Queue-based searcher. Each `fetch_page` pops the next queued response for
/// its (platform, keyword); an exhausted or unregistered pair returns an
/// empty final page. Builder pattern: `.on_page()`, `.on_error()`, `.not_ready()`.
pub struct MockSearcher {
    responses: Mutex<HashMap<PairKey, VecDeque<Result<SearchPage, ClientError>>>>,
    calls: Mutex<HashMap<PairKey, usize>>,
    not_ready: HashMap<Platform, String>,
    limits: PageLimits,
    total_calls: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
    latency: Duration,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            not_ready: HashMap::new(),
            limits: PageLimits::new(10, 5, Duration::ZERO),
            total_calls: AtomicUsize::new(0),
            cancel_after: None,
            latency: Duration::ZERO,
        }
    }

    fn push(&self, platform: Platform, keyword: &str, response: Result<SearchPage, ClientError>) {
        let mut responses = self.responses.lock().unwrap();
        responses
            .entry((platform, keyword.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Queue a page of records. `has_more` decides whether a next cursor is returned.
    pub fn on_page(
        self,
        platform: Platform,
        keyword: &str,
        records: Vec<DiscussionRecord>,
        has_more: bool,
    ) -> Self {
        let queued = self
            .responses
            .lock()
            .unwrap()
            .get(&(platform, keyword.to_string()))
            .map_or(0, |q| q.len());
        let page = SearchPage {
            records,
            next: has_more.then_some(PageCursor::Page(queued as u32 + 2)),
            ..SearchPage::default()
        };
        self.push(platform, keyword, Ok(page));
        self
    }

    /// Queue a fully specified page (skipped counts, backoff, cursor).
    pub fn on_search_page(self, platform: Platform, keyword: &str, page: SearchPage) -> Self {
        self.push(platform, keyword, Ok(page));
        self
    }

    pub fn on_error(self, platform: Platform, keyword: &str, error: ClientError) -> Self {
        self.push(platform, keyword, Err(error));
        self
    }

    /// Make `check_ready` fail for a platform with a configuration error.
    pub fn not_ready(mut self, platform: Platform, reason: &str) -> Self {
        self.not_ready.insert(platform, reason.to_string());
        self
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Cancel `token` once `n` fetches have completed, simulating an operator cancel.
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Delay every fetch, so tests can observe a session while it runs.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self, platform: Platform, keyword: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(platform, keyword.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformSearcher for MockSearcher {
    fn limits(&self, _platform: Platform) -> PageLimits {
        self.limits
    }

    fn check_ready(&self, platform: Platform) -> Result<(), ClientError> {
        match self.not_ready.get(&platform) {
            Some(reason) => Err(ClientError::Config(reason.clone())),
            None => Ok(()),
        }
    }

    async fn fetch_page(
        &self,
        platform: Platform,
        keyword: &str,
        _cursor: &PageCursor,
    ) -> Result<SearchPage, ClientError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let key = (platform, keyword.to_string());
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;

        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(SearchPage::default()));

        let total = self.total_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if total >= *n {
                token.cancel();
            }
        }

        response
    }
}

// ---------------------------------------------------------------------------
// MockSummarizer
// ---------------------------------------------------------------------------

/// Queue-based summarizer. Unqueued calls succeed with "summary N".
pub struct MockSummarizer {
    responses: Mutex<VecDeque<Result<ChatCompletion, AiError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on_summary(self, content: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(completion(content)));
        self
    }

    pub fn on_error(self, error: AiError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// User prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn completion(content: &str) -> ChatCompletion {
    ChatCompletion {
        content: content.to_string(),
        model: "mock-model".to_string(),
        usage: Some(Usage {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        }),
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn model(&self) -> &str {
        "mock-model"
    }

    async fn summarize(&self, _system: &str, user: &str) -> Result<ChatCompletion, AiError> {
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(user.to_string());
            prompts.len()
        };
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(completion(&format!("summary {n}"))))
    }
}
