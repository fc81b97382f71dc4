// GitHub search over one or more kinds: issues, repositories, code.
// Kinds are searched one after another within a pair, each with its own page
// budget, and record ids carry the kind so they cannot collide. Token is
// optional for issues/repositories and required for code search.

use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use threadscout_common::config::{GithubSearchKind, GithubSettings, PageLimits};
use threadscout_common::{DiscussionRecord, Platform};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::http::read_json;
use crate::text::parse_rfc3339;
use crate::types::{PageCursor, SearchPage};

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
/// The search API never returns results beyond the first 1000.
const GITHUB_SEARCH_CAP: u64 = 1000;

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    settings: GithubSettings,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, settings: GithubSettings) -> Self {
        Self {
            http,
            base_url: GITHUB_API_URL.to_string(),
            settings,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Page budget for a whole pair: `max_pages` for every configured kind.
    pub fn limits(&self) -> PageLimits {
        let kinds = self.settings.search_kinds.len().max(1) as u32;
        PageLimits {
            max_pages: self.settings.limits.max_pages.saturating_mul(kinds),
            ..self.settings.limits
        }
    }

    /// Fails without network access when a configured kind needs a token we don't have.
    pub fn check_ready(&self) -> Result<()> {
        if self.settings.search_kinds.is_empty() {
            return Err(ClientError::Config("no GitHub search kind configured".to_string()));
        }
        if self.settings.token.is_none() {
            if let Some(kind) = self.settings.search_kinds.iter().find(|k| k.requires_token()) {
                return Err(ClientError::Config(format!(
                    "GitHub {} search requires GITHUB_TOKEN",
                    kind.path()
                )));
            }
        }
        Ok(())
    }

    fn query_for(kind: GithubSearchKind, keyword: &str) -> String {
        let term = if keyword.contains(char::is_whitespace) {
            format!("\"{keyword}\"")
        } else {
            keyword.to_string()
        };
        match kind {
            GithubSearchKind::Issues => format!("{term} type:issue"),
            GithubSearchKind::Repositories | GithubSearchKind::Code => term,
        }
    }

    pub async fn fetch_page(&self, keyword: &str, cursor: &PageCursor) -> Result<SearchPage> {
        self.check_ready()?;

        let (section, page_num) = match cursor {
            PageCursor::Section { section, page } => (*section, *page),
            PageCursor::Page(n) => (0, *n),
            _ => (0, 1),
        };
        let Some(&kind) = self.settings.search_kinds.get(section) else {
            return Ok(SearchPage::default());
        };
        let per_page = self.settings.limits.page_size.min(100);

        let accept = match kind {
            GithubSearchKind::Code => "application/vnd.github.text-match+json",
            _ => "application/vnd.github+json",
        };

        let mut req = self
            .http
            .get(format!("{}/search/{}", self.base_url, kind.path()))
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .query(&[("q", Self::query_for(kind, keyword))])
            .query(&[("per_page", per_page), ("page", page_num)]);

        if kind != GithubSearchKind::Code {
            req = req.query(&[("sort", "updated"), ("order", "desc")]);
        }
        if let Some(token) = &self.settings.token {
            req = req.bearer_auth(token);
        }

        let body = read_json(req.send().await?).await?;
        let mut page = parse_search(kind, &body, page_num, per_page)?;
        page.next = self.advance(section, page_num, !page.is_last());

        debug!(
            keyword,
            kind = kind.path(),
            page = page_num,
            records = page.records.len(),
            skipped = page.skipped,
            "github: page fetched"
        );
        Ok(page)
    }

    /// Next page of the current kind while it has more and budget remains,
    /// otherwise the first page of the next kind.
    fn advance(&self, section: usize, page_num: u32, has_more: bool) -> Option<PageCursor> {
        if has_more && page_num < self.settings.limits.max_pages {
            return Some(PageCursor::Section {
                section,
                page: page_num + 1,
            });
        }
        (section + 1 < self.settings.search_kinds.len()).then_some(PageCursor::Section {
            section: section + 1,
            page: 1,
        })
    }
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Reactions {
    total_count: i64,
}

#[derive(Debug, Deserialize)]
struct Issue {
    id: u64,
    title: String,
    body: Option<String>,
    html_url: String,
    user: Option<User>,
    created_at: String,
    comments: Option<i64>,
    reactions: Option<Reactions>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    id: u64,
    full_name: String,
    description: Option<String>,
    html_url: String,
    owner: Option<User>,
    created_at: String,
    stargazers_count: Option<i64>,
    open_issues_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CodeRepository {
    full_name: String,
    owner: Option<User>,
}

#[derive(Debug, Deserialize)]
struct TextMatch {
    fragment: String,
}

#[derive(Debug, Deserialize)]
struct CodeHit {
    sha: String,
    path: String,
    html_url: String,
    repository: CodeRepository,
    #[serde(default)]
    text_matches: Vec<TextMatch>,
}

fn parse_item(kind: GithubSearchKind, item: &Value) -> std::result::Result<Option<DiscussionRecord>, serde_json::Error> {
    let record = match kind {
        GithubSearchKind::Issues => {
            let issue: Issue = serde_json::from_value(item.clone())?;
            DiscussionRecord::new(
                Platform::Github,
                format!("{}:{}", kind.id_prefix(), issue.id),
                issue.title,
                issue.body.unwrap_or_default(),
                issue.html_url,
            )
            .map(|r| {
                r.with_author(issue.user.map(|u| u.login))
                    .with_created_at(parse_rfc3339(&issue.created_at))
                    .with_engagement(issue.reactions.map(|r| r.total_count), issue.comments)
            })
        }
        GithubSearchKind::Repositories => {
            let repo: Repository = serde_json::from_value(item.clone())?;
            DiscussionRecord::new(
                Platform::Github,
                format!("{}:{}", kind.id_prefix(), repo.id),
                repo.full_name,
                repo.description.unwrap_or_default(),
                repo.html_url,
            )
            .map(|r| {
                r.with_author(repo.owner.map(|u| u.login))
                    .with_created_at(parse_rfc3339(&repo.created_at))
                    .with_engagement(repo.stargazers_count, repo.open_issues_count)
            })
        }
        GithubSearchKind::Code => {
            let hit: CodeHit = serde_json::from_value(item.clone())?;
            let fragments: Vec<&str> = hit.text_matches.iter().map(|m| m.fragment.as_str()).collect();
            DiscussionRecord::new(
                Platform::Github,
                format!(
                    "{}:{}/{}@{}",
                    kind.id_prefix(),
                    hit.repository.full_name,
                    hit.path,
                    hit.sha
                ),
                format!("{}/{}", hit.repository.full_name, hit.path),
                fragments.join("\n…\n"),
                hit.html_url,
            )
            .map(|r| r.with_author(hit.repository.owner.map(|u| u.login)))
        }
    };
    Ok(record)
}

/// Parse a search response. Missing `items` is a page-level parse error.
pub fn parse_search(
    kind: GithubSearchKind,
    body: &Value,
    page_num: u32,
    per_page: u32,
) -> Result<SearchPage> {
    let items = body["items"]
        .as_array()
        .ok_or_else(|| ClientError::Parse("github search response has no items".to_string()))?;

    let mut page = SearchPage::default();
    for item in items {
        match parse_item(kind, item) {
            Ok(Some(record)) => page.records.push(record),
            Ok(None) => page.skipped += 1,
            Err(e) => {
                debug!(error = %e, "github: skipping malformed item");
                page.skipped += 1;
            }
        }
    }

    let total = body["total_count"].as_u64().unwrap_or(0).min(GITHUB_SEARCH_CAP);
    let seen = u64::from(page_num) * u64::from(per_page);
    if items.len() as u32 >= per_page && seen < total {
        page.next = Some(PageCursor::Page(page_num + 1));
    }

    Ok(page)
}
