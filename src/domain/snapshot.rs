use crate::domain::model::{Item, Round, Team, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Wire shape of a session, shared by the local store and the remote backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub pool: Vec<Arc<Item>>,
    #[serde(default)]
    pub unsold: Vec<Arc<Item>>,
    pub teams: Vec<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_draw: Option<Arc<Item>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_bid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_team_id: Option<TeamId>,
    #[serde(default)]
    pub round: Round,
}

impl SessionSnapshot {
    /// The round is over but the session was never ended and some items
    /// went unsold.
    pub fn is_awaiting_carry_over(&self) -> bool {
        self.pool.is_empty() && !self.unsold.is_empty() && self.active_draw.is_none()
    }
}

/// Everything written under the local store key. `history` holds undo
/// snapshots, oldest first, and is omitted from remote backups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(flatten)]
    pub session: SessionSnapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<SessionSnapshot>,
}

impl StateDocument {
    pub fn without_history(&self) -> Self {
        Self {
            session: self.session.clone(),
            history: Vec::new(),
        }
    }
}

/// Response body of `GET /load-state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnvelope {
    pub state: StateDocument,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}
