use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ThreadScoutError;

// --- Platforms ---

/// A public platform the scout can search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Forum / Q&A threads.
    Reddit,
    /// Code-hosting search (issues, repositories, code).
    Github,
    /// Stack-style Q&A.
    StackOverflow,
    /// News aggregator (Algolia search over Hacker News).
    HackerNews,
    /// Preprint repository.
    Arxiv,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Reddit,
        Platform::Github,
        Platform::StackOverflow,
        Platform::HackerNews,
        Platform::Arxiv,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::Github => "github",
            Platform::StackOverflow => "stackoverflow",
            Platform::HackerNews => "hackernews",
            Platform::Arxiv => "arxiv",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Reddit => "Reddit",
            Platform::Github => "GitHub",
            Platform::StackOverflow => "Stack Overflow",
            Platform::HackerNews => "Hacker News",
            Platform::Arxiv => "arXiv",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for Platform {
    type Err = ThreadScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(Platform::Reddit),
            "github" => Ok(Platform::Github),
            "stackoverflow" | "stack_overflow" | "stack-overflow" => Ok(Platform::StackOverflow),
            "hackernews" | "hacker_news" | "hacker-news" | "hn" => Ok(Platform::HackerNews),
            "arxiv" => Ok(Platform::Arxiv),
            other => Err(ThreadScoutError::Validation(format!(
                "unknown platform: {other}"
            ))),
        }
    }
}

// --- Keywords ---

/// A search term, optionally grouped under a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Keyword {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            topic: None,
        }
    }

    pub fn in_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

// --- Records ---

/// Identity of a record within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub platform: Platform,
    pub original_id: String,
}

/// One normalized discussion item collected from a platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionRecord {
    pub platform: Platform,
    pub original_id: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub score: Option<i64>,
    pub comments_count: Option<i64>,
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub relevance: f64,
}

impl DiscussionRecord {
    /// Build a record, returning `None` when it has no url, no id, or no text at all.
    pub fn new(
        platform: Platform,
        original_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
    ) -> Option<Self> {
        let original_id = original_id.into().trim().to_string();
        let title = title.into().trim().to_string();
        let body = body.into().trim().to_string();
        let url = url.into().trim().to_string();

        if original_id.is_empty() || url.is_empty() {
            return None;
        }
        if title.is_empty() && body.is_empty() {
            return None;
        }

        Some(Self {
            platform,
            original_id,
            title,
            body,
            author: None,
            url,
            created_at: None,
            score: None,
            comments_count: None,
            matched_keywords: Vec::new(),
            relevance: 0.0,
        })
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_engagement(mut self, score: Option<i64>, comments: Option<i64>) -> Self {
        self.score = score;
        self.comments_count = comments;
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            platform: self.platform,
            original_id: self.original_id.clone(),
        }
    }

    /// Add a keyword to the matched set, keeping first-seen order.
    pub fn add_keyword(&mut self, keyword: &str) {
        if !self.matched_keywords.iter().any(|k| k == keyword) {
            self.matched_keywords.push(keyword.to_string());
        }
    }

    /// Title and body joined for scoring and rendering.
    pub fn text(&self) -> String {
        match (self.title.is_empty(), self.body.is_empty()) {
            (false, false) => format!("{}\n\n{}", self.title, self.body),
            (false, true) => self.title.clone(),
            _ => self.body.clone(),
        }
    }
}

// --- Session state ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScrapeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScrapeStatus::Completed | ScrapeStatus::Failed | ScrapeStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeStatus::Pending => write!(f, "pending"),
            ScrapeStatus::Running => write!(f, "running"),
            ScrapeStatus::Completed => write!(f, "completed"),
            ScrapeStatus::Failed => write!(f, "failed"),
            ScrapeStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of one (platform, keyword) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    NotAttempted,
    Running,
    Succeeded,
    /// Some pages were fetched before the pair failed.
    Partial,
    Failed,
    /// Stopped between pages because cancellation was requested.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    RateLimited,
    Timeout,
    Network,
    Http,
    Parse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairProgress {
    pub platform: Platform,
    pub keyword: String,
    pub state: PairState,
    pub pages_fetched: u32,
    pub records_found: u32,
    pub records_added: u32,
    pub items_skipped: u32,
    pub retries: u32,
    pub failure: Option<PairFailure>,
}

impl PairProgress {
    pub fn new(platform: Platform, keyword: impl Into<String>) -> Self {
        Self {
            platform,
            keyword: keyword.into(),
            state: PairState::NotAttempted,
            pages_fetched: 0,
            records_found: 0,
            records_added: 0,
            items_skipped: 0,
            retries: 0,
            failure: None,
        }
    }

    /// Whether the pair ended with an error, even if it produced some pages.
    pub fn has_failed(&self) -> bool {
        matches!(self.state, PairState::Failed | PairState::Partial)
    }
}

/// A pair that failed, with the reason, as shown in status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPair {
    pub platform: Platform,
    pub keyword: String,
    pub partial: bool,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRef {
    pub platform: Platform,
    pub keyword: String,
}

/// Read-only copy of a session's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: ScrapeStatus,
    pub cancel_requested: bool,
    pub keywords: Vec<Keyword>,
    pub platforms: Vec<Platform>,
    pub pairs: Vec<PairProgress>,
    pub failed_pairs: Vec<FailedPair>,
    pub current_pair: Option<PairRef>,
    pub progress_percent: u8,
    pub total_records: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_secs: Option<i64>,
    #[serde(default)]
    pub analysis_available: bool,
}

// --- Analysis ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub session_id: Uuid,
    pub summary: String,
    pub model: String,
    pub batches: usize,
    pub records_analyzed: usize,
    /// Records whose text was cut to fit the model's input budget.
    pub truncated_records: usize,
    pub usage: Option<TokenUsage>,
    pub created_at: DateTime<Utc>,
}
