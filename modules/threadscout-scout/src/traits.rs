// Trait seams for the scout's outbound dependencies.
//
// PlatformSearcher: one page of search results from any platform.
// Summarizer: one chat completion from the analysis model.
//
// Production wiring uses PlatformClients and ai_client::OpenAi; tests use
// MockSearcher and MockSummarizer from `testing`: no network, deterministic.

use ai_client::{AiError, ChatCompletion, OpenAi};
use async_trait::async_trait;
use platform_clients::{ClientError, PageCursor, PlatformClients, SearchPage};
use threadscout_common::config::PageLimits;
use threadscout_common::Platform;

/// Used when no client is registered; `check_ready` fails those pairs first.
const FALLBACK_LIMITS: PageLimits = PageLimits::new(1, 1, std::time::Duration::ZERO);

// ---------------------------------------------------------------------------
// PlatformSearcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PlatformSearcher: Send + Sync {
    /// Page size, page count and politeness delay for a platform.
    fn limits(&self, platform: Platform) -> PageLimits;

    /// Configuration problems that would fail every request to this platform.
    fn check_ready(&self, platform: Platform) -> Result<(), ClientError>;

    /// Fetch one page of results for `keyword` starting at `cursor`.
    async fn fetch_page(
        &self,
        platform: Platform,
        keyword: &str,
        cursor: &PageCursor,
    ) -> Result<SearchPage, ClientError>;
}

#[async_trait]
impl PlatformSearcher for PlatformClients {
    fn limits(&self, platform: Platform) -> PageLimits {
        self.get(platform)
            .map(|c| c.limits())
            .unwrap_or(FALLBACK_LIMITS)
    }

    fn check_ready(&self, platform: Platform) -> Result<(), ClientError> {
        self.client(platform)?.check_ready()
    }

    async fn fetch_page(
        &self,
        platform: Platform,
        keyword: &str,
        cursor: &PageCursor,
    ) -> Result<SearchPage, ClientError> {
        self.client(platform)?.fetch_page(keyword, cursor).await
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Model name recorded on analysis results.
    fn model(&self) -> &str;

    async fn summarize(&self, system: &str, user: &str) -> Result<ChatCompletion, AiError>;
}

#[async_trait]
impl Summarizer for OpenAi {
    fn model(&self) -> &str {
        OpenAi::model(self)
    }

    async fn summarize(&self, system: &str, user: &str) -> Result<ChatCompletion, AiError> {
        self.chat_completion(system, user).await
    }
}
