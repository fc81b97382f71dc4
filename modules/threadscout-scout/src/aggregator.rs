// Aggregator: runs every (platform, keyword) pair of a session in order,
// streaming pages into the session and publishing progress after each one.

use std::pin::pin;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use platform_clients::ClientError;
use threadscout_common::config::RetryPolicy;
use threadscout_common::{PairFailure, PairState, ScrapeStatus, SessionSnapshot};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::relevance::{self, Term};
use crate::search::search_pages;
use crate::session::ScrapeSession;
use crate::stats::ScrapeStats;
use crate::traits::PlatformSearcher;

pub struct Aggregator {
    searcher: Arc<dyn PlatformSearcher>,
    retry: RetryPolicy,
    min_relevance: Option<f64>,
}

impl Aggregator {
    pub fn new(searcher: Arc<dyn PlatformSearcher>, retry: RetryPolicy) -> Self {
        Self {
            searcher,
            retry,
            min_relevance: None,
        }
    }

    /// Drop new records scoring below `threshold`.
    pub fn with_min_relevance(mut self, threshold: Option<f64>) -> Self {
        self.min_relevance = threshold;
        self
    }

    /// Run `session` until it reaches a terminal status, publishing a snapshot
    /// after every state change. The terminal snapshot is left to the caller,
    /// which publishes it once the records have been handed off.
    pub async fn run(
        &self,
        session: &mut ScrapeSession,
        progress: &watch::Sender<SessionSnapshot>,
    ) -> ScrapeStats {
        session.status = ScrapeStatus::Running;
        session.started_at = Some(Utc::now());
        publish(session, progress);

        self.fail_unready_platforms(session);
        publish(session, progress);

        let terms = session.terms();
        let mut cancelled = false;

        for idx in 0..session.pairs.len() {
            if session.cancel_requested() {
                cancelled = true;
                break;
            }
            if session.pairs[idx].state != PairState::NotAttempted {
                continue;
            }
            if !self.run_pair(session, idx, &terms, progress).await {
                cancelled = true;
                break;
            }
        }

        session.current = None;
        session.status = final_status(session, cancelled);
        session.finished_at = Some(Utc::now());

        let stats = ScrapeStats::from_snapshot(&session.snapshot());
        info!(
            session_id = %session.id(),
            status = %session.status,
            records = session.records.len(),
            "Scrape session finished"
        );
        stats
    }

    /// Mark every pair of a not-ready platform as failed before any network call.
    fn fail_unready_platforms(&self, session: &mut ScrapeSession) {
        for platform in session.platforms.clone() {
            let Err(e) = self.searcher.check_ready(platform) else {
                continue;
            };
            warn!(platform = %platform, error = %e, "Platform not ready, skipping its pairs");
            for pair in session.pairs.iter_mut().filter(|p| p.platform == platform) {
                pair.state = PairState::Failed;
                pair.failure = Some(failure_of(&e));
            }
        }
    }

    /// Run one pair. Returns false if the pair stopped because of cancellation.
    async fn run_pair(
        &self,
        session: &mut ScrapeSession,
        idx: usize,
        terms: &[Term],
        progress: &watch::Sender<SessionSnapshot>,
    ) -> bool {
        let platform = session.pairs[idx].platform;
        let keyword = session.pairs[idx].keyword.clone();
        let limits = self.searcher.limits(platform);
        let cancel = session.cancel_token().clone();

        session.current = Some(idx);
        session.pairs[idx].state = PairState::Running;
        publish(session, progress);

        let mut pages = pin!(search_pages(
            self.searcher.as_ref(),
            platform,
            &keyword,
            limits,
            self.retry,
            &cancel,
        ));

        loop {
            match pages.next().await {
                Some(Ok(fetched)) => {
                    let is_last = fetched.page.is_last();
                    let pair = &mut session.pairs[idx];
                    pair.pages_fetched += 1;
                    pair.retries += fetched.retries;
                    pair.items_skipped += fetched.page.skipped;
                    pair.records_found += fetched.page.records.len() as u32;

                    let (added, filtered) = self.absorb(session, fetched.page.records, &keyword, terms);
                    let pair = &mut session.pairs[idx];
                    pair.records_added += added;
                    pair.items_skipped += filtered;
                    publish(session, progress);

                    if is_last {
                        session.pairs[idx].state = PairState::Succeeded;
                        break;
                    }
                    if session.cancel_requested() {
                        session.pairs[idx].state = PairState::Interrupted;
                        info!(platform = %platform, keyword, "Pair interrupted by cancellation");
                        publish(session, progress);
                        return false;
                    }
                }
                Some(Err(failure)) => {
                    let pair = &mut session.pairs[idx];
                    pair.retries += failure.retries;
                    pair.state = if pair.pages_fetched > 0 {
                        PairState::Partial
                    } else {
                        PairState::Failed
                    };
                    pair.failure = Some(failure_of(&failure.error));
                    warn!(
                        platform = %platform,
                        keyword,
                        pages = pair.pages_fetched,
                        error = %failure.error,
                        "Pair failed"
                    );
                    break;
                }
                // The stream only ends early when a wait was cut short by cancellation.
                None if cancel.is_cancelled() => {
                    session.pairs[idx].state = PairState::Interrupted;
                    info!(platform = %platform, keyword, "Pair interrupted while waiting to retry");
                    publish(session, progress);
                    return false;
                }
                None => {
                    session.pairs[idx].state = PairState::Succeeded;
                    break;
                }
            }
        }

        let pair = &session.pairs[idx];
        info!(
            platform = %platform,
            keyword,
            state = ?pair.state,
            pages = pair.pages_fetched,
            added = pair.records_added,
            "Pair complete"
        );
        publish(session, progress);
        true
    }

    /// Merge a page into the session. Returns (records added, records filtered out).
    fn absorb(
        &self,
        session: &mut ScrapeSession,
        records: Vec<threadscout_common::DiscussionRecord>,
        keyword: &str,
        terms: &[Term],
    ) -> (u32, u32) {
        let mut added = 0;
        let mut filtered = 0;
        for mut record in records {
            let key = record.key();
            if session.contains(&key) {
                session.add_keyword_to(&key, keyword);
                continue;
            }
            record.relevance = relevance::score(&record, terms);
            if self.min_relevance.is_some_and(|min| record.relevance < min) {
                filtered += 1;
                continue;
            }
            if session.merge(record, keyword) {
                added += 1;
            }
        }
        (added, filtered)
    }
}

fn publish(session: &ScrapeSession, progress: &watch::Sender<SessionSnapshot>) {
    progress.send_replace(session.snapshot());
}

fn failure_of(error: &ClientError) -> PairFailure {
    PairFailure {
        kind: error.kind(),
        message: error.to_string(),
    }
}

/// Cancelled if cancellation was observed; failed iff there are pairs and all
/// of them failed outright; completed otherwise.
fn final_status(session: &ScrapeSession, cancelled: bool) -> ScrapeStatus {
    if cancelled {
        return ScrapeStatus::Cancelled;
    }
    let all_failed = !session.pairs.is_empty()
        && session.pairs.iter().all(|p| p.state == PairState::Failed);
    if all_failed {
        ScrapeStatus::Failed
    } else {
        ScrapeStatus::Completed
    }
}
