use crate::core::history::HistoryStack;
use crate::core::session::{AuctionRules, Session};
use crate::domain::model::{Item, ItemId};
use crate::domain::ports::{LocalStore, RemoteBackup};
use crate::domain::snapshot::{RemoteEnvelope, StateDocument};
use crate::utils::error::{AuctionError, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const STATE_KEY: &str = "auctionState";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    Plain,
    /// Pool empty, unsold list non-empty, session never ended: resuming goes
    /// straight into the carried-over round.
    CarriedOverRound,
}

/// A saved session that passed validation and may be resumed.
#[derive(Debug, Clone)]
pub struct ResumeCandidate {
    pub source: ResumeSource,
    pub mode: ResumeMode,
    pub saved_at: Option<DateTime<Utc>>,
    pub session: Session,
    pub history: HistoryStack,
}

#[derive(Debug, Clone)]
pub enum ResumeDecision {
    /// Nothing usable was saved.
    Fresh,
    /// Local candidate first when present. The operator picks one or starts
    /// fresh.
    Offer(Vec<ResumeCandidate>),
}

impl ResumeDecision {
    pub fn candidates(&self) -> &[ResumeCandidate] {
        match self {
            ResumeDecision::Fresh => &[],
            ResumeDecision::Offer(candidates) => candidates,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub at: DateTime<Utc>,
    pub error: String,
}

/// Remote backup failures, kept for inspection instead of being dropped.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterLog {
    entries: Arc<Mutex<Vec<DeadLetter>>>,
}

impl DeadLetterLog {
    pub fn record(&self, error: &AuctionError) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(DeadLetter {
            at: Utc::now(),
            error: error.to_string(),
        });
    }

    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background task that pushes documents to the remote backup. Queued
/// documents are coalesced so only the newest is sent.
pub struct RemoteBackupWorker {
    remote: Arc<dyn RemoteBackup>,
    timeout: Duration,
    tx: mpsc::UnboundedSender<StateDocument>,
    handle: JoinHandle<()>,
    dead_letters: DeadLetterLog,
}

impl RemoteBackupWorker {
    /// Must be called from within a tokio runtime.
    pub fn spawn(remote: Arc<dyn RemoteBackup>, timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StateDocument>();
        let dead_letters = DeadLetterLog::default();

        let task_remote = remote.clone();
        let task_dead_letters = dead_letters.clone();
        let handle = tokio::spawn(async move {
            while let Some(mut document) = rx.recv().await {
                while let Ok(newer) = rx.try_recv() {
                    document = newer;
                }

                let outcome = match tokio::time::timeout(timeout, task_remote.save_state(&document)).await {
                    Ok(result) => result,
                    Err(_) => Err(AuctionError::RemoteTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };

                match outcome {
                    Ok(()) => tracing::debug!("Remote backup saved"),
                    Err(e) => {
                        tracing::warn!(error = %e, "Remote backup failed; continuing with local state only");
                        task_dead_letters.record(&e);
                    }
                }
            }
        });

        Self {
            remote,
            timeout,
            tx,
            handle,
            dead_letters,
        }
    }

    pub fn enqueue(&self, document: StateDocument) {
        if self.tx.send(document).is_err() {
            tracing::warn!("Remote backup worker has stopped; backup skipped");
        }
    }

    /// Bounded read of the remote copy. Failures are logged and reported as
    /// "nothing saved".
    pub async fn load(&self) -> Option<RemoteEnvelope> {
        match tokio::time::timeout(self.timeout, self.remote.load_state()).await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Could not read remote backup");
                self.dead_letters.record(&e);
                None
            }
            Err(_) => {
                let e = AuctionError::RemoteTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                tracing::warn!(error = %e, "Could not read remote backup");
                self.dead_letters.record(&e);
                None
            }
        }
    }

    pub fn dead_letters(&self) -> &DeadLetterLog {
        &self.dead_letters
    }

    /// Lets queued backups finish, waiting at most one timeout period.
    pub async fn shutdown(self) {
        let Self {
            tx, handle, timeout, ..
        } = self;
        drop(tx);
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!("Remote backup still pending at shutdown; abandoning it");
        }
    }
}

/// Writes the session to the local store on every flush and mirrors it to
/// the remote backup without waiting for it.
pub struct PersistenceReconciler<L: LocalStore> {
    store: L,
    key: String,
    history_limit: Option<usize>,
    remote: Option<RemoteBackupWorker>,
}

impl<L: LocalStore> PersistenceReconciler<L> {
    pub fn new(store: L) -> Self {
        Self {
            store,
            key: STATE_KEY.to_string(),
            history_limit: None,
            remote: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Persist at most `limit` undo steps. The in-memory stack is unbounded.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn with_remote(mut self, worker: RemoteBackupWorker) -> Self {
        self.remote = Some(worker);
        self
    }

    pub fn store(&self) -> &L {
        &self.store
    }

    pub fn dead_letters(&self) -> Option<&DeadLetterLog> {
        self.remote.as_ref().map(RemoteBackupWorker::dead_letters)
    }

    pub async fn flush(&self, session: &Session, history: &HistoryStack) -> Result<()> {
        let document = StateDocument {
            session: session.to_snapshot(),
            history: history.recent_snapshots(self.history_limit),
        };
        let json = serde_json::to_string(&document)?;
        self.store.save(&self.key, &json).await?;
        tracing::debug!(bytes = json.len(), key = %self.key, "Session saved locally");

        if let Some(remote) = &self.remote {
            remote.enqueue(document.without_history());
        }
        Ok(())
    }

    /// Local store first, then the remote backup. Documents that fail to
    /// parse, break a session invariant or hold different items than
    /// `catalog` are logged and skipped.
    pub async fn load_on_startup(
        &self,
        rules: &AuctionRules,
        catalog: &[Arc<Item>],
    ) -> Result<ResumeDecision> {
        let catalog = CatalogIndex::new(catalog);
        let mut candidates = Vec::new();

        if let Some(raw) = self.store.load(&self.key).await? {
            match parse_candidate(&raw, ResumeSource::Local, None, rules, &catalog) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => tracing::error!(error = %e, "Ignoring unreadable local state"),
            }
        }

        if let Some(remote) = &self.remote {
            if let Some(envelope) = remote.load().await {
                match candidate_from_document(
                    envelope.state,
                    ResumeSource::Remote,
                    envelope.saved_at,
                    rules,
                    &catalog,
                ) {
                    Ok(candidate) => candidates.push(candidate),
                    Err(e) => tracing::error!(error = %e, "Ignoring unreadable remote backup"),
                }
            }
        }

        if candidates.is_empty() {
            tracing::info!("No saved auction found");
            Ok(ResumeDecision::Fresh)
        } else {
            tracing::info!(count = candidates.len(), "Saved auction available for resume");
            Ok(ResumeDecision::Offer(candidates))
        }
    }

    /// Removes the local copy. The remote backup is kept.
    pub async fn discard_local(&self) -> Result<()> {
        self.store.remove(&self.key).await
    }

    pub async fn shutdown(self) {
        if let Some(remote) = self.remote {
            remote.shutdown().await;
        }
    }
}

struct CatalogIndex {
    ids: HashSet<ItemId>,
    items: HashMap<ItemId, Arc<Item>>,
}

impl CatalogIndex {
    fn new(catalog: &[Arc<Item>]) -> Self {
        let items: HashMap<ItemId, Arc<Item>> = catalog
            .iter()
            .map(|item| (item.id.clone(), item.clone()))
            .collect();
        Self {
            ids: items.keys().cloned().collect(),
            items,
        }
    }

    fn adopt(&self, session: &mut Session) -> Result<()> {
        session.check_catalog(&self.ids)?;
        session.share_items(&self.items);
        Ok(())
    }
}

fn parse_candidate(
    raw: &str,
    source: ResumeSource,
    saved_at: Option<DateTime<Utc>>,
    rules: &AuctionRules,
    catalog: &CatalogIndex,
) -> Result<ResumeCandidate> {
    let document: StateDocument = serde_json::from_str(raw)?;
    candidate_from_document(document, source, saved_at, rules, catalog)
}

fn candidate_from_document(
    document: StateDocument,
    source: ResumeSource,
    saved_at: Option<DateTime<Utc>>,
    rules: &AuctionRules,
    catalog: &CatalogIndex,
) -> Result<ResumeCandidate> {
    let mode = if document.session.is_awaiting_carry_over() {
        ResumeMode::CarriedOverRound
    } else {
        ResumeMode::Plain
    };
    let mut session = Session::from_snapshot(document.session, rules)?;
    catalog.adopt(&mut session)?;
    let mut history = HistoryStack::from_snapshots(document.history, rules)?;
    for entry in history.entries_mut() {
        catalog.adopt(entry)?;
    }

    Ok(ResumeCandidate {
        source,
        mode,
        saved_at,
        session,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local_store::MemoryStore;
    use crate::core::ladder::BidLadder;
    use crate::core::ledger::BudgetLedger;
    use crate::domain::model::Decision;

    fn rules() -> AuctionRules {
        AuctionRules {
            initial_budget: 300,
            final_picks_threshold: 5,
            ledger: BudgetLedger::new(3, 0),
            ladder: BidLadder::flat(50, 50).unwrap(),
        }
    }

    fn items(ids: &[&str]) -> Vec<Arc<Item>> {
        ids.iter().map(|id| Arc::new(Item::new(*id, *id))).collect()
    }

    fn session(ids: &[&str]) -> Session {
        Session::fresh(items(ids), &["Reds".to_string()], &rules())
    }

    #[tokio::test]
    async fn test_nothing_saved_means_fresh() {
        let reconciler = PersistenceReconciler::new(MemoryStore::new());
        let decision = reconciler.load_on_startup(&rules(), &items(&["a", "b"])).await.unwrap();
        assert!(matches!(decision, ResumeDecision::Fresh));
    }

    #[tokio::test]
    async fn test_flush_then_load_offers_local_resume() {
        let reconciler = PersistenceReconciler::new(MemoryStore::new());
        let live = session(&["a", "b"]);
        let mut history = HistoryStack::new();
        history.push(live.clone());

        reconciler.flush(&live, &history).await.unwrap();
        let decision = reconciler.load_on_startup(&rules(), &items(&["a", "b"])).await.unwrap();

        let candidates = decision.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, ResumeSource::Local);
        assert_eq!(candidates[0].mode, ResumeMode::Plain);
        assert_eq!(candidates[0].session, live);
        assert_eq!(candidates[0].history.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_round_with_unsold_offers_carry_over() {
        let rules = rules();
        let reconciler = PersistenceReconciler::new(MemoryStore::new());
        let mut live = session(&["a"]);
        live.draw(0, &rules).unwrap();
        live.resolve(Decision::Unsold, &rules).unwrap();

        reconciler.flush(&live, &HistoryStack::new()).await.unwrap();
        let decision = reconciler.load_on_startup(&rules, &items(&["a"])).await.unwrap();
        assert_eq!(decision.candidates()[0].mode, ResumeMode::CarriedOverRound);
    }

    #[tokio::test]
    async fn test_corrupt_local_state_is_ignored() {
        let store = MemoryStore::new();
        store.save(STATE_KEY, "{not json").await.unwrap();
        let reconciler = PersistenceReconciler::new(store);

        let decision = reconciler.load_on_startup(&rules(), &items(&["a", "b"])).await.unwrap();
        assert!(matches!(decision, ResumeDecision::Fresh));
    }

    #[tokio::test]
    async fn test_discard_local_removes_key() {
        let reconciler = PersistenceReconciler::new(MemoryStore::new());
        reconciler
            .flush(&session(&["a"]), &HistoryStack::new())
            .await
            .unwrap();
        reconciler.discard_local().await.unwrap();
        assert!(reconciler.store().load(STATE_KEY).await.unwrap().is_none());
    }

    #[test]
    fn test_dead_letter_log_records_errors() {
        let log = DeadLetterLog::default();
        assert!(log.is_empty());
        log.record(&AuctionError::RemoteStatus { status: 503 });
        assert_eq!(log.len(), 1);
        assert!(log.entries()[0].error.contains("503"));
    }

    #[tokio::test]
    async fn test_state_from_another_catalog_is_ignored() {
        let reconciler = PersistenceReconciler::new(MemoryStore::new());
        reconciler
            .flush(&session(&["a", "b"]), &HistoryStack::new())
            .await
            .unwrap();

        let decision = reconciler
            .load_on_startup(&rules(), &items(&["a", "b", "c"]))
            .await
            .unwrap();
        assert!(matches!(decision, ResumeDecision::Fresh));
    }

    #[tokio::test]
    async fn test_history_entry_outside_catalog_rejects_document() {
        let reconciler = PersistenceReconciler::new(MemoryStore::new());
        let mut history = HistoryStack::new();
        history.push(session(&["a", "x"]));

        reconciler.flush(&session(&["a", "b"]), &history).await.unwrap();
        let decision = reconciler
            .load_on_startup(&rules(), &items(&["a", "b"]))
            .await
            .unwrap();
        assert!(matches!(decision, ResumeDecision::Fresh));
    }

    #[tokio::test]
    async fn test_history_limit_and_shared_items_on_load() {
        let rules = rules();
        let catalog = items(&["a", "b"]);
        let reconciler = PersistenceReconciler::new(MemoryStore::new()).with_history_limit(1);

        let mut live = Session::fresh(catalog.clone(), &["Reds".to_string()], &rules);
        let mut history = HistoryStack::new();
        history.push(live.clone());
        live.draw(0, &rules).unwrap();
        history.push(live.clone());
        live.select_team(crate::domain::model::TeamId(1)).unwrap();

        reconciler.flush(&live, &history).await.unwrap();
        let decision = reconciler.load_on_startup(&rules, &catalog).await.unwrap();
        let candidate = &decision.candidates()[0];

        assert_eq!(candidate.history.len(), 1);
        let drawn = &candidate.session.active_draw().unwrap().item;
        assert!(Arc::ptr_eq(drawn, &catalog[0]));
    }
}

