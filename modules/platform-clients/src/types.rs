use std::time::Duration;

use threadscout_common::DiscussionRecord;

/// Where the next page starts. Each platform uses one convention.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageCursor {
    #[default]
    Start,
    /// Opaque continuation token (Reddit `after`).
    Token(String),
    /// Page number in the platform's own numbering.
    Page(u32),
    /// Result offset (arXiv `start`).
    Offset(u32),
    /// Page within one of several searches run back to back (GitHub kinds).
    Section { section: usize, page: u32 },
}

/// One page of normalized results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub records: Vec<DiscussionRecord>,
    /// Items present in the response but malformed or lacking url/text.
    pub skipped: u32,
    /// Cursor for the following page; `None` when the result set is exhausted.
    pub next: Option<PageCursor>,
    /// Provider-requested wait before the next call (Stack Exchange `backoff`).
    pub backoff: Option<Duration>,
}

impl SearchPage {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}
