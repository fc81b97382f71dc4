// Scrape sessions and the registry that owns them.
//
// A ScrapeSession is owned by the aggregator task that runs it. Readers see
// immutable snapshots through a watch channel, and the collected records
// through a write-once cell filled when the run ends.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use platform_clients::PlatformClients;
use threadscout_common::{
    AnalysisError, AnalysisResult, DiscussionRecord, FailedPair, Keyword, PairProgress, PairRef,
    Config, PairState, Platform, RecordKey, ScrapeStatus, SessionSnapshot, ThreadScoutError,
};
use tokio::sync::{watch, OnceCell};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::analysis::Analyzer;
use crate::relevance::Term;

/// Chat calls for large batches can take well over the platform HTTP timeout.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Input normalization
// ---------------------------------------------------------------------------

/// Trim terms, reject blanks, and collapse case-insensitive duplicates keeping the first.
pub fn normalize_keywords(keywords: Vec<Keyword>) -> Result<Vec<Keyword>, ThreadScoutError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(keywords.len());
    for mut kw in keywords {
        kw.term = kw.term.trim().to_string();
        if kw.term.is_empty() {
            return Err(ThreadScoutError::Validation(
                "keywords must not be blank".to_string(),
            ));
        }
        if seen.insert(kw.term.to_lowercase()) {
            out.push(kw);
        }
    }
    Ok(out)
}

/// Collapse duplicate platforms keeping first-seen order.
pub fn normalize_platforms(platforms: Vec<Platform>) -> Vec<Platform> {
    let mut seen = HashSet::new();
    platforms.into_iter().filter(|p| seen.insert(*p)).collect()
}

// ---------------------------------------------------------------------------
// ScrapeSession
// ---------------------------------------------------------------------------

/// Mutable state of one run. Only the aggregator touches it.
pub struct ScrapeSession {
    pub(crate) id: Uuid,
    pub(crate) keywords: Vec<Keyword>,
    pub(crate) platforms: Vec<Platform>,
    pub(crate) status: ScrapeStatus,
    pub(crate) pairs: Vec<PairProgress>,
    pub(crate) records: Vec<DiscussionRecord>,
    index: HashMap<RecordKey, usize>,
    pub(crate) current: Option<usize>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl ScrapeSession {
    /// Pairs are enumerated platform-major, keywords in the given order.
    pub fn new(
        id: Uuid,
        keywords: Vec<Keyword>,
        platforms: Vec<Platform>,
        cancel: CancellationToken,
    ) -> Self {
        let pairs = platforms
            .iter()
            .flat_map(|p| keywords.iter().map(move |k| PairProgress::new(*p, &k.term)))
            .collect();

        Self {
            id,
            keywords,
            platforms,
            status: ScrapeStatus::Pending,
            pairs,
            records: Vec::new(),
            index: HashMap::new(),
            current: None,
            started_at: None,
            finished_at: None,
            cancel,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fires when the operator cancels; waits race against it.
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn terms(&self) -> Vec<Term> {
        self.keywords.iter().map(Term::from).collect()
    }

    pub fn records(&self) -> &[DiscussionRecord] {
        &self.records
    }

    /// Insert a record or, if its key is already present, union its keyword
    /// into the existing record. Returns true when the record was new.
    pub(crate) fn merge(&mut self, mut record: DiscussionRecord, keyword: &str) -> bool {
        let key = record.key();
        if let Some(&i) = self.index.get(&key) {
            self.records[i].add_keyword(keyword);
            return false;
        }
        record.add_keyword(keyword);
        self.index.insert(key, self.records.len());
        self.records.push(record);
        true
    }

    pub(crate) fn contains(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn add_keyword_to(&mut self, key: &RecordKey, keyword: &str) {
        if let Some(&i) = self.index.get(key) {
            self.records[i].add_keyword(keyword);
        }
    }

    fn failed_pairs(&self) -> Vec<FailedPair> {
        self.pairs
            .iter()
            .filter(|p| p.has_failed())
            .filter_map(|p| {
                p.failure.as_ref().map(|f| FailedPair {
                    platform: p.platform,
                    keyword: p.keyword.clone(),
                    partial: p.state == PairState::Partial,
                    kind: f.kind,
                    message: f.message.clone(),
                })
            })
            .collect()
    }

    fn progress_percent(&self) -> u8 {
        if self.status.is_terminal() || self.pairs.is_empty() {
            return if self.status.is_terminal() { 100 } else { 0 };
        }
        let done = self
            .pairs
            .iter()
            .filter(|p| !matches!(p.state, PairState::NotAttempted | PairState::Running))
            .count();
        (done * 100 / self.pairs.len()) as u8
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let elapsed_secs = self.started_at.map(|start| {
            let end = self.finished_at.unwrap_or_else(Utc::now);
            (end - start).num_seconds()
        });

        SessionSnapshot {
            id: self.id,
            status: self.status,
            cancel_requested: self.cancel_requested(),
            keywords: self.keywords.clone(),
            platforms: self.platforms.clone(),
            pairs: self.pairs.clone(),
            failed_pairs: self.failed_pairs(),
            current_pair: self.current.and_then(|i| self.pairs.get(i)).map(|p| PairRef {
                platform: p.platform,
                keyword: p.keyword.clone(),
            }),
            progress_percent: self.progress_percent(),
            total_records: self.records.len(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            elapsed_secs,
            analysis_available: false,
        }
    }

    /// Snapshot after the records have moved out to the handle's cell.
    fn snapshot_with_total(&self, total_records: usize) -> SessionSnapshot {
        let mut snap = self.snapshot();
        snap.total_records = total_records;
        snap
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Read side of a running or finished session.
pub struct SessionHandle {
    id: Uuid,
    snapshots: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    records: Arc<OnceCell<Arc<Vec<DiscussionRecord>>>>,
    analysis: OnceCell<AnalysisResult>,
    task: AbortHandle,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published snapshot. Pure and idempotent.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snap = self.snapshots.borrow().clone();
        snap.cancel_requested = self.cancel.is_cancelled();
        snap.analysis_available = self.analysis.initialized();
        snap
    }

    /// Ask the aggregator to stop at the next pair or page boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Records, available once the session is terminal.
    pub fn records(&self) -> Option<Arc<Vec<DiscussionRecord>>> {
        self.records.get().cloned()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.get()
    }

    /// Wait until the session reaches a terminal status and return the final snapshot.
    pub async fn wait(&self) -> SessionSnapshot {
        let mut rx = self.snapshots.clone();
        // The sender lives as long as the run task; an error means it ended.
        let _ = rx.wait_for(|s| s.status.is_terminal()).await;
        self.snapshot()
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Process-wide map of sessions. Entries are added on start and removed only
/// on explicit request.
pub struct SessionRegistry {
    aggregator: Arc<Aggregator>,
    analyzer: Option<Arc<Analyzer>>,
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(aggregator: Aggregator, analyzer: Option<Analyzer>) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            analyzer: analyzer.map(Arc::new),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Wire HTTP platform clients and, when an API key is set, the OpenAI analyzer.
    pub fn from_config(config: &Config) -> Result<Self, ThreadScoutError> {
        let clients = PlatformClients::from_config(config)
            .map_err(|e| ThreadScoutError::Config(e.to_string()))?;
        let aggregator =
            Aggregator::new(Arc::new(clients), config.retry).with_min_relevance(config.min_relevance);

        let analyzer = Analyzer::from_settings(&config.analysis, ANALYSIS_TIMEOUT);
        if analyzer.is_none() {
            info!("OPENAI_API_KEY not set, analysis disabled");
        }
        Ok(Self::new(aggregator, analyzer))
    }

    pub fn analysis_configured(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Validate the selection, register a session and spawn its run.
    pub fn start(
        &self,
        keywords: Vec<Keyword>,
        platforms: Vec<Platform>,
    ) -> Result<Arc<SessionHandle>, ThreadScoutError> {
        let keywords = normalize_keywords(keywords)?;
        let platforms = normalize_platforms(platforms);

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let mut session = ScrapeSession::new(id, keywords, platforms, cancel.clone());
        let (tx, rx) = watch::channel(session.snapshot());
        let records = Arc::new(OnceCell::new());

        info!(
            session_id = %id,
            keywords = session.keywords.len(),
            platforms = session.platforms.len(),
            pairs = session.pairs.len(),
            "Starting scrape session"
        );

        let aggregator = self.aggregator.clone();
        let cell = records.clone();
        let task = tokio::spawn(async move {
            let stats = aggregator.run(&mut session, &tx).await;
            info!(session_id = %id, status = %session.status, "{stats}");
            let total = session.records.len();
            let _ = cell.set(Arc::new(std::mem::take(&mut session.records)));
            // Terminal status becomes visible only once the records are readable.
            tx.send_replace(session.snapshot_with_total(total));
        });

        let handle = Arc::new(SessionHandle {
            id,
            snapshots: rx,
            cancel,
            records,
            analysis: OnceCell::new(),
            task: task.abort_handle(),
        });

        self.write().insert(id, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>, ThreadScoutError> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or(ThreadScoutError::SessionNotFound(id))
    }

    pub fn status(&self, id: Uuid) -> Result<SessionSnapshot, ThreadScoutError> {
        Ok(self.get(id)?.snapshot())
    }

    /// Snapshots of every retained session, oldest first.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let mut snaps: Vec<SessionSnapshot> = self.read().values().map(|h| h.snapshot()).collect();
        snaps.sort_by_key(|s| s.started_at);
        snaps
    }

    pub fn cancel(&self, id: Uuid) -> Result<SessionSnapshot, ThreadScoutError> {
        let handle = self.get(id)?;
        handle.cancel();
        info!(session_id = %id, "Cancellation requested");
        Ok(handle.snapshot())
    }

    /// Collected records. Fails until the session is terminal.
    pub fn results(&self, id: Uuid) -> Result<Arc<Vec<DiscussionRecord>>, ThreadScoutError> {
        self.get(id)?
            .records()
            .ok_or(ThreadScoutError::SessionNotFinished(id))
    }

    /// Analyze a finished session's records. The first successful result is
    /// stored; later requests return it unchanged.
    pub async fn analyze(
        &self,
        id: Uuid,
        focus: Option<&str>,
    ) -> Result<AnalysisResult, ThreadScoutError> {
        let handle = self.get(id)?;
        let records = handle
            .records()
            .ok_or(ThreadScoutError::SessionNotFinished(id))?;

        let analyzer = self.analyzer.clone().ok_or_else(|| {
            AnalysisError::NotConfigured("OPENAI_API_KEY is not set".to_string())
        })?;

        let result = handle
            .analysis
            .get_or_try_init(|| async { analyzer.analyze(id, &records, focus).await })
            .await
            .map_err(|e| {
                warn!(session_id = %id, error = %e, "Analysis failed");
                e
            })?;
        Ok(result.clone())
    }

    pub fn analysis(&self, id: Uuid) -> Result<Option<AnalysisResult>, ThreadScoutError> {
        Ok(self.get(id)?.analysis().cloned())
    }

    /// Drop a session. A still-running session is cancelled and its task aborted.
    pub fn remove(&self, id: Uuid) -> Result<(), ThreadScoutError> {
        let handle = self
            .write()
            .remove(&id)
            .ok_or(ThreadScoutError::SessionNotFound(id))?;
        handle.cancel();
        handle.task.abort();
        info!(session_id = %id, "Session removed");
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Arc<SessionHandle>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Arc<SessionHandle>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}
