// Lazy, retrying page stream for one (platform, keyword) pair.
//
// Each poll fetches at most one page. Transient failures (rate limits,
// timeouts, connection errors, 5xx) are retried with backoff; a failure that
// survives the retry budget ends the stream. Dropping the stream stops fetching.
// Every wait races the session's cancel token; a cancelled wait ends the
// stream without fetching again.

use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use platform_clients::{ClientError, PageCursor, SearchPage};
use threadscout_common::config::{PageLimits, RetryPolicy};
use threadscout_common::Platform;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::traits::PlatformSearcher;

/// A page plus the retries it took to get it.
#[derive(Debug)]
pub struct FetchedPage {
    pub page: SearchPage,
    pub retries: u32,
}

/// The error that ended a pair's stream.
#[derive(Debug)]
pub struct SearchFailure {
    pub error: ClientError,
    pub retries: u32,
}

/// Sleep for `wait` unless `cancel` fires first. Returns false if cancelled.
async fn pause(cancel: &CancellationToken, wait: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

/// Stream pages for `keyword` on `platform`, up to `limits.max_pages`.
pub fn search_pages<'a>(
    searcher: &'a dyn PlatformSearcher,
    platform: Platform,
    keyword: &'a str,
    limits: PageLimits,
    retry: RetryPolicy,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Result<FetchedPage, SearchFailure>> + Send + 'a {
    stream! {
        let mut cursor = PageCursor::Start;
        let mut delay = Duration::ZERO;

        for page_index in 0..limits.max_pages {
            if page_index > 0 && !delay.is_zero() {
                debug!(platform = %platform, keyword, delay_ms = delay.as_millis() as u64, "Waiting before next page");
                if !pause(cancel, delay).await {
                    info!(platform = %platform, keyword, "Cancelled during page delay");
                    return;
                }
            }

            let mut attempt = 0;
            let outcome = loop {
                match searcher.fetch_page(platform, keyword, &cursor).await {
                    Ok(page) => break Ok(page),
                    Err(e) if e.is_transient() && attempt < retry.max_retries => {
                        let wait = retry.delay_for(attempt, e.retry_after());
                        warn!(
                            platform = %platform,
                            keyword,
                            attempt = attempt + 1,
                            wait_ms = wait.as_millis() as u64,
                            error = %e,
                            "Transient failure, retrying"
                        );
                        attempt += 1;
                        if !pause(cancel, wait).await {
                            info!(platform = %platform, keyword, attempt, "Cancelled during retry backoff");
                            return;
                        }
                    }
                    Err(e) => break Err(e),
                }
            };

            match outcome {
                Ok(page) => {
                    // A provider-requested backoff can only lengthen the politeness delay.
                    delay = page
                        .backoff
                        .map_or(limits.page_delay, |b| b.max(limits.page_delay));
                    let next = page.next.clone();
                    yield Ok(FetchedPage { page, retries: attempt });
                    match next {
                        Some(c) => cursor = c,
                        None => break,
                    }
                }
                Err(error) => {
                    yield Err(SearchFailure { error, retries: attempt });
                    break;
                }
            }
        }
    }
}
