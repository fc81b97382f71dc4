pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{default_topics, topic_weight, Topic};
pub use config::Config;
pub use error::{AnalysisError, ThreadScoutError};
pub use types::*;
