use crate::core::session::{AuctionRules, Session};
use crate::domain::snapshot::SessionSnapshot;
use crate::utils::error::{AuctionError, Result};

/// Undo stack of whole-session snapshots. Items are reference counted, so a
/// snapshot copies the containers but shares the item payloads.
#[derive(Debug, Clone, Default)]
pub struct HistoryStack {
    entries: Vec<Session>,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: Session) {
        self.entries.push(snapshot);
    }

    pub fn pop(&mut self) -> Result<Session> {
        self.entries.pop().ok_or(AuctionError::EmptyHistory)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first, for persistence.
    pub fn to_snapshots(&self) -> Vec<SessionSnapshot> {
        self.recent_snapshots(None)
    }

    /// The newest `limit` entries, oldest first.
    pub fn recent_snapshots(&self, limit: Option<usize>) -> Vec<SessionSnapshot> {
        let skip = limit.map_or(0, |limit| self.entries.len().saturating_sub(limit));
        self.entries[skip..].iter().map(Session::to_snapshot).collect()
    }

    pub fn entries_mut(&mut self) -> std::slice::IterMut<'_, Session> {
        self.entries.iter_mut()
    }

    pub fn from_snapshots(snapshots: Vec<SessionSnapshot>, rules: &AuctionRules) -> Result<Self> {
        let entries = snapshots
            .into_iter()
            .map(|snapshot| Session::from_snapshot(snapshot, rules))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}
