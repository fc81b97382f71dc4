// One client per platform behind a single dispatch type.

use std::collections::HashMap;

use threadscout_common::config::PageLimits;
use threadscout_common::{Config, Platform};

use crate::arxiv::ArxivClient;
use crate::error::{ClientError, Result};
use crate::github::GithubClient;
use crate::hackernews::HackerNewsClient;
use crate::http::build_http_client;
use crate::reddit::RedditClient;
use crate::stackexchange::StackExchangeClient;
use crate::types::{PageCursor, SearchPage};

pub enum PlatformClient {
    Reddit(RedditClient),
    Github(GithubClient),
    StackOverflow(StackExchangeClient),
    HackerNews(HackerNewsClient),
    Arxiv(ArxivClient),
}

impl PlatformClient {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformClient::Reddit(_) => Platform::Reddit,
            PlatformClient::Github(_) => Platform::Github,
            PlatformClient::StackOverflow(_) => Platform::StackOverflow,
            PlatformClient::HackerNews(_) => Platform::HackerNews,
            PlatformClient::Arxiv(_) => Platform::Arxiv,
        }
    }

    pub fn limits(&self) -> PageLimits {
        match self {
            PlatformClient::Reddit(c) => c.limits(),
            PlatformClient::Github(c) => c.limits(),
            PlatformClient::StackOverflow(c) => c.limits(),
            PlatformClient::HackerNews(c) => c.limits(),
            PlatformClient::Arxiv(c) => c.limits(),
        }
    }

    /// Configuration problems that would fail every request for this platform.
    pub fn check_ready(&self) -> Result<()> {
        match self {
            PlatformClient::Github(c) => c.check_ready(),
            _ => Ok(()),
        }
    }

    pub async fn fetch_page(&self, keyword: &str, cursor: &PageCursor) -> Result<SearchPage> {
        match self {
            PlatformClient::Reddit(c) => c.fetch_page(keyword, cursor).await,
            PlatformClient::Github(c) => c.fetch_page(keyword, cursor).await,
            PlatformClient::StackOverflow(c) => c.fetch_page(keyword, cursor).await,
            PlatformClient::HackerNews(c) => c.fetch_page(keyword, cursor).await,
            PlatformClient::Arxiv(c) => c.fetch_page(keyword, cursor).await,
        }
    }
}

/// The set of configured platform clients, sharing one HTTP connection pool.
pub struct PlatformClients {
    http: reqwest::Client,
    clients: HashMap<Platform, PlatformClient>,
}

impl PlatformClients {
    /// Build a client for every supported platform from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = build_http_client(&config.user_agent, config.http_timeout)?;

        let clients = [
            PlatformClient::Reddit(RedditClient::new(http.clone(), config.reddit.clone())),
            PlatformClient::Github(GithubClient::new(http.clone(), config.github.clone())),
            PlatformClient::StackOverflow(StackExchangeClient::new(
                http.clone(),
                config.stackoverflow.clone(),
            )),
            PlatformClient::HackerNews(HackerNewsClient::new(
                http.clone(),
                config.hackernews.clone(),
            )),
            PlatformClient::Arxiv(ArxivClient::new(http.clone(), config.arxiv.clone())),
        ]
        .into_iter()
        .map(|c| (c.platform(), c))
        .collect();

        Ok(Self { http, clients })
    }

    /// The shared HTTP client, for building replacement clients.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Replace the client for its platform.
    pub fn with_client(mut self, client: PlatformClient) -> Self {
        self.clients.insert(client.platform(), client);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<&PlatformClient> {
        self.clients.get(&platform)
    }

    pub fn client(&self, platform: Platform) -> Result<&PlatformClient> {
        self.get(platform)
            .ok_or_else(|| ClientError::Config(format!("no client configured for {platform}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadscout_common::config::{GithubSearchKind, GithubSettings};

    #[test]
    fn from_config_builds_every_platform() {
        let clients = PlatformClients::from_config(&Config::default()).unwrap();
        for p in Platform::ALL {
            assert_eq!(clients.client(p).unwrap().platform(), p);
        }
    }

    #[test]
    fn limits_come_from_settings() {
        let clients = PlatformClients::from_config(&Config::default()).unwrap();
        assert_eq!(clients.client(Platform::Arxiv).unwrap().limits().page_delay.as_secs(), 3);
    }

    #[test]
    fn with_client_replaces_platform_entry() {
        let clients = PlatformClients::from_config(&Config::default()).unwrap();
        let github = GithubClient::new(
            clients.http().clone(),
            GithubSettings {
                search_kinds: vec![GithubSearchKind::Code],
                ..GithubSettings::default()
            },
        );
        let clients = clients.with_client(PlatformClient::Github(github));
        assert!(clients.client(Platform::Github).unwrap().check_ready().is_err());
        assert!(clients.client(Platform::Reddit).unwrap().check_ready().is_ok());
    }
}
