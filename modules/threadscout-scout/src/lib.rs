pub mod aggregator;
pub mod analysis;
pub mod relevance;
pub mod search;
pub mod session;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;


pub use aggregator::Aggregator;
pub use analysis::Analyzer;
pub use session::{ScrapeSession, SessionHandle, SessionRegistry};
pub use stats::ScrapeStats;
pub use traits::{PlatformSearcher, Summarizer};

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Log filter shared by the binaries: `RUST_LOG` plus info for every
/// workspace crate.
pub fn log_filter() -> Result<EnvFilter, ParseError> {
    Ok(EnvFilter::from_default_env()
        .add_directive("threadscout=info".parse()?)
        .add_directive("platform_clients=info".parse()?)
        .add_directive("ai_client=info".parse()?))
}
