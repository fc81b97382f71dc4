use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ThreadScoutError;

/// Application configuration loaded from environment variables once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Outbound HTTP
    pub user_agent: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,

    // Aggregation
    pub min_relevance: Option<f64>,

    // Platforms
    pub reddit: RedditSettings,
    pub github: GithubSettings,
    pub stackoverflow: StackExchangeSettings,
    pub hackernews: HackerNewsSettings,
    pub arxiv: ArxivSettings,

    // LLM analysis
    pub analysis: AnalysisSettings,
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// No retries and no waiting. Useful for tests and one-shot probes.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based). A provider-supplied
    /// hint replaces the exponential schedule; both are capped.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let computed = hint.unwrap_or_else(|| {
            self.base_backoff
                .checked_mul(2u32.saturating_pow(attempt))
                .unwrap_or(self.max_backoff)
        });
        computed.min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Page size, page count and politeness delay for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub page_size: u32,
    pub max_pages: u32,
    pub page_delay: Duration,
}

impl PageLimits {
    pub const fn new(page_size: u32, max_pages: u32, page_delay: Duration) -> Self {
        Self {
            page_size,
            max_pages,
            page_delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditSettings {
    pub limits: PageLimits,
    /// Subreddits to restrict the search to. Empty searches all of Reddit.
    pub subreddits: Vec<String>,
    /// Reddit `t` parameter: hour, day, week, month, year, all.
    pub time_window: String,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            limits: PageLimits::new(25, 2, Duration::from_secs(1)),
            subreddits: Vec::new(),
            time_window: "year".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GithubSearchKind {
    Issues,
    Repositories,
    Code,
}

impl GithubSearchKind {
    /// GitHub only serves code search to authenticated callers.
    pub fn requires_token(&self) -> bool {
        matches!(self, GithubSearchKind::Code)
    }

    pub fn path(&self) -> &'static str {
        match self {
            GithubSearchKind::Issues => "issues",
            GithubSearchKind::Repositories => "repositories",
            GithubSearchKind::Code => "code",
        }
    }

    /// Prefix for record ids, keeping ids of different kinds apart.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            GithubSearchKind::Issues => "issue",
            GithubSearchKind::Repositories => "repo",
            GithubSearchKind::Code => "code",
        }
    }

    /// Parse a comma-separated list, keeping first occurrences in order.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, ThreadScoutError> {
        let mut kinds = Vec::new();
        for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind: GithubSearchKind = part.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Err(ThreadScoutError::Config(
                "GITHUB_SEARCH_KINDS names no search kind".to_string(),
            ));
        }
        Ok(kinds)
    }
}

impl FromStr for GithubSearchKind {
    type Err = ThreadScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "issues" | "issue" => Ok(GithubSearchKind::Issues),
            "repositories" | "repos" | "repo" => Ok(GithubSearchKind::Repositories),
            "code" => Ok(GithubSearchKind::Code),
            other => Err(ThreadScoutError::Config(format!(
                "GitHub search kind must be issues, repositories or code (got {other})"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub limits: PageLimits,
    pub token: Option<String>,
    /// Searched in order within each pair; `limits.max_pages` applies per kind.
    pub search_kinds: Vec<GithubSearchKind>,
}

impl GithubSettings {
    pub fn requires_token(&self) -> bool {
        self.search_kinds.iter().any(GithubSearchKind::requires_token)
    }

    pub fn describe_kinds(&self) -> String {
        self.search_kinds
            .iter()
            .map(GithubSearchKind::path)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            limits: PageLimits::new(30, 2, Duration::from_secs(1)),
            token: None,
            search_kinds: vec![GithubSearchKind::Issues, GithubSearchKind::Repositories],
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackExchangeSettings {
    pub limits: PageLimits,
    /// App key. Optional; raises the daily quota.
    pub key: Option<String>,
    pub site: String,
}

impl Default for StackExchangeSettings {
    fn default() -> Self {
        Self {
            limits: PageLimits::new(15, 2, Duration::from_secs(1)),
            key: None,
            site: "stackoverflow".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HackerNewsSettings {
    pub limits: PageLimits,
    pub lookback_days: u32,
}

impl Default for HackerNewsSettings {
    fn default() -> Self {
        Self {
            limits: PageLimits::new(15, 2, Duration::from_secs(1)),
            lookback_days: 365,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArxivSettings {
    pub limits: PageLimits,
}

impl Default for ArxivSettings {
    fn default() -> Self {
        // arXiv asks API clients to wait 3 seconds between calls.
        Self {
            limits: PageLimits::new(10, 2, Duration::from_secs(3)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub max_input_chars: usize,
    pub max_record_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub retry: RetryPolicy,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_input_chars: 80_000,
            max_record_chars: 500,
            max_tokens: 4000,
            temperature: 0.7,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_host: "127.0.0.1".to_string(),
            web_port: 5001,
            user_agent: "threadscout/0.1".to_string(),
            http_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            min_relevance: None,
            reddit: RedditSettings::default(),
            github: GithubSettings::default(),
            stackoverflow: StackExchangeSettings::default(),
            hackernews: HackerNewsSettings::default(),
            arxiv: ArxivSettings::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ThreadScoutError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Unset keys take defaults;
    /// set-but-malformed keys are a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ThreadScoutError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let d = Config::default();

        let retry = RetryPolicy {
            max_retries: parse_or(&get, "SCRAPE_MAX_RETRIES", d.retry.max_retries)?,
            base_backoff: millis_or(&get, "SCRAPE_BACKOFF_MS", d.retry.base_backoff)?,
            max_backoff: millis_or(&get, "SCRAPE_MAX_BACKOFF_MS", d.retry.max_backoff)?,
        };

        let reddit = RedditSettings {
            limits: limits_or(&get, "REDDIT", d.reddit.limits)?,
            subreddits: get("REDDIT_SUBREDDITS")
                .map(|v| split_list(&v))
                .unwrap_or(d.reddit.subreddits),
            time_window: get("REDDIT_TIME_WINDOW").unwrap_or(d.reddit.time_window),
        };

        let github = GithubSettings {
            limits: limits_or(&get, "GITHUB", d.github.limits)?,
            token: get("GITHUB_TOKEN"),
            search_kinds: match get("GITHUB_SEARCH_KINDS").or_else(|| get("GITHUB_SEARCH_KIND")) {
                Some(v) => GithubSearchKind::parse_list(&v)?,
                None => d.github.search_kinds,
            },
        };

        let stackoverflow = StackExchangeSettings {
            limits: limits_or(&get, "STACKOVERFLOW", d.stackoverflow.limits)?,
            key: get("STACKEXCHANGE_KEY"),
            site: get("STACKEXCHANGE_SITE").unwrap_or(d.stackoverflow.site),
        };

        let hackernews = HackerNewsSettings {
            limits: limits_or(&get, "HACKERNEWS", d.hackernews.limits)?,
            lookback_days: parse_or(&get, "HACKERNEWS_LOOKBACK_DAYS", d.hackernews.lookback_days)?,
        };

        let arxiv = ArxivSettings {
            limits: limits_or(&get, "ARXIV", d.arxiv.limits)?,
        };

        let analysis = AnalysisSettings {
            api_key: get("OPENAI_API_KEY"),
            model: get("OPENAI_MODEL").unwrap_or(d.analysis.model),
            base_url: get("OPENAI_BASE_URL"),
            max_input_chars: parse_or(&get, "ANALYSIS_MAX_INPUT_CHARS", d.analysis.max_input_chars)?,
            max_record_chars: parse_or(
                &get,
                "ANALYSIS_MAX_RECORD_CHARS",
                d.analysis.max_record_chars,
            )?,
            max_tokens: parse_or(&get, "ANALYSIS_MAX_TOKENS", d.analysis.max_tokens)?,
            temperature: parse_or(&get, "ANALYSIS_TEMPERATURE", d.analysis.temperature)?,
            retry,
        };

        if analysis.max_input_chars < 1000 {
            return Err(ThreadScoutError::Config(
                "ANALYSIS_MAX_INPUT_CHARS must be at least 1000".to_string(),
            ));
        }

        Ok(Self {
            web_host: get("WEB_HOST").unwrap_or(d.web_host),
            web_port: parse_or(&get, "WEB_PORT", d.web_port)?,
            user_agent: get("SCRAPE_USER_AGENT").unwrap_or(d.user_agent),
            http_timeout: Duration::from_secs(parse_or(
                &get,
                "HTTP_TIMEOUT_SECS",
                d.http_timeout.as_secs(),
            )?),
            retry,
            min_relevance: get("RELEVANCE_THRESHOLD")
                .map(|v| parse_value::<f64>("RELEVANCE_THRESHOLD", &v))
                .transpose()?,
            reddit,
            github,
            stackoverflow,
            hackernews,
            arxiv,
            analysis,
        })
    }

    /// Log the loaded configuration with secrets replaced by set/unset markers.
    pub fn log_redacted(&self) {
        info!(
            web_host = self.web_host.as_str(),
            web_port = self.web_port,
            http_timeout_secs = self.http_timeout.as_secs(),
            max_retries = self.retry.max_retries,
            github_token = redact(&self.github.token),
            github_search = self.github.describe_kinds().as_str(),
            stackexchange_key = redact(&self.stackoverflow.key),
            openai_api_key = redact(&self.analysis.api_key),
            openai_model = self.analysis.model.as_str(),
            subreddits = self.reddit.subreddits.len(),
            "Config loaded"
        );
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "set"
    } else {
        "unset"
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_start_matches("r/").to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ThreadScoutError> {
    value
        .parse()
        .map_err(|_| ThreadScoutError::Config(format!("{key} has an invalid value: {value}")))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ThreadScoutError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, ThreadScoutError>
where
    G: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse_or(get, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

fn limits_or<G>(get: &G, prefix: &str, default: PageLimits) -> Result<PageLimits, ThreadScoutError>
where
    G: Fn(&str) -> Option<String>,
{
    let limits = PageLimits {
        page_size: parse_or(get, &format!("{prefix}_PAGE_SIZE"), default.page_size)?,
        max_pages: parse_or(get, &format!("{prefix}_MAX_PAGES"), default.max_pages)?,
        page_delay: millis_or(get, &format!("{prefix}_PAGE_DELAY_MS"), default.page_delay)?,
    };
    if limits.page_size == 0 {
        return Err(ThreadScoutError::Config(format!(
            "{prefix}_PAGE_SIZE must be greater than zero"
        )));
    }
    Ok(limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ThreadScoutError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.web_port, 5001);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(
            config.github.search_kinds,
            vec![GithubSearchKind::Issues, GithubSearchKind::Repositories]
        );
        assert!(config.analysis.api_key.is_none());
        assert_eq!(config.arxiv.limits.page_delay, Duration::from_secs(3));
    }

    #[test]
    fn platform_limits_are_read_per_prefix() {
        let config = config_from(&[
            ("REDDIT_PAGE_SIZE", "50"),
            ("REDDIT_MAX_PAGES", "4"),
            ("ARXIV_PAGE_DELAY_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.reddit.limits.page_size, 50);
        assert_eq!(config.reddit.limits.max_pages, 4);
        assert_eq!(config.arxiv.limits.page_delay, Duration::ZERO);
        assert_eq!(config.github.limits, GithubSettings::default().limits);
    }

    #[test]
    fn subreddits_are_split_and_normalized() {
        let config = config_from(&[("REDDIT_SUBREDDITS", "r/LocalLLaMA, programming,,")]).unwrap();
        assert_eq!(config.reddit.subreddits, vec!["LocalLLaMA", "programming"]);
    }

    #[test]
    fn malformed_number_is_a_config_error() {
        let err = config_from(&[("WEB_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ThreadScoutError::Config(_)));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(config_from(&[("GITHUB_PAGE_SIZE", "0")]).is_err());
    }

    #[test]
    fn blank_secret_counts_as_unset() {
        let config = config_from(&[("GITHUB_TOKEN", "   ")]).unwrap();
        assert!(config.github.token.is_none());
    }

    #[test]
    fn github_code_search_requires_token() {
        let config = config_from(&[("GITHUB_SEARCH_KIND", "code")]).unwrap();
        assert_eq!(config.github.search_kinds, vec![GithubSearchKind::Code]);
        assert!(config.github.requires_token());
        assert!(!GithubSettings::default().requires_token());
        assert!(config_from(&[("GITHUB_SEARCH_KIND", "gists")]).is_err());
    }

    #[test]
    fn github_search_kinds_are_listed_in_order() {
        let config =
            config_from(&[("GITHUB_SEARCH_KINDS", "repos, issues,repositories, code")]).unwrap();
        assert_eq!(
            config.github.search_kinds,
            vec![
                GithubSearchKind::Repositories,
                GithubSearchKind::Issues,
                GithubSearchKind::Code
            ]
        );
        assert_eq!(config.github.describe_kinds(), "repositories,issues,code");
        assert!(config_from(&[("GITHUB_SEARCH_KINDS", " , ")]).is_err());
    }

    #[test]
    fn retry_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(0, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(5));
    }

    #[test]
    fn retry_delay_prefers_provider_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(600))),
            policy.max_backoff
        );
    }
}
