use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;

/// Catalog identity of an item. Catalogs use either numeric or string ids;
/// both are normalised to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => ItemId(n.to_string()),
            RawId::Text(s) => ItemId(s),
        })
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An auctionable entity. The card and video references are opaque to the
/// auction core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(alias = "card", default)]
    pub card_ref: String,
    #[serde(alias = "video", default, skip_serializing_if = "Option::is_none")]
    pub video_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ItemId(id.into()),
            name: name.into(),
            card_ref: String::new(),
            video_ref: None,
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub item: Arc<Item>,
    pub price: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub budget: u32,
    #[serde(default)]
    pub roster: Vec<RosterEntry>,
}

impl Team {
    pub fn new(id: TeamId, name: impl Into<String>, budget: u32) -> Self {
        Self {
            id,
            name: name.into(),
            budget,
            roster: Vec::new(),
        }
    }

    pub fn spent(&self) -> u64 {
        self.roster.iter().map(|entry| u64::from(entry.price)).sum()
    }
}

/// The item currently on the block.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDraw {
    pub item: Arc<Item>,
    pub current_bid: u32,
    pub selected_team_id: Option<TeamId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Round {
    #[default]
    Main,
    CarriedOver,
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Round::Main => f.write_str("main round"),
            Round::CarriedOver => f.write_str("unsold round"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    RoundActive,
    Drawing,
    RoundExhausted,
    Ended,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::RoundActive => "round active",
            Phase::Drawing => "drawing",
            Phase::RoundExhausted => "round exhausted",
            Phase::Ended => "ended",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Sold,
    Unsold,
}
