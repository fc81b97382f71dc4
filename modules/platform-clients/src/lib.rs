pub mod arxiv;
mod client;
pub mod error;
pub mod github;
pub mod hackernews;
mod http;
pub mod reddit;
pub mod stackexchange;
pub mod text;
pub mod types;

pub use arxiv::ArxivClient;
pub use client::{PlatformClient, PlatformClients};
pub use error::{ClientError, Result};
pub use github::GithubClient;
pub use hackernews::HackerNewsClient;
pub use reddit::RedditClient;
pub use stackexchange::StackExchangeClient;
pub use types::{PageCursor, SearchPage};
