pub mod controller;
pub mod history;
pub mod ladder;
pub mod ledger;
pub mod pool;
pub mod reconciler;
pub mod report;
pub mod session;

pub use crate::domain::model::{Item, Phase, Team, TeamId};
pub use crate::domain::ports::{LocalStore, RemoteBackup, Selector};
pub use crate::utils::error::Result;
