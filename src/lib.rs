pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{
    catalog::Catalog,
    http_backup::HttpBackup,
    local_store::{FileStateStore, MemoryStore},
    selector::RandomSelector,
};
pub use config::toml_config::AuctionConfig;
pub use core::{
    controller::AuctionController,
    reconciler::{PersistenceReconciler, RemoteBackupWorker, ResumeDecision, ResumeMode, ResumeSource},
    report::RoundSummary,
    session::{AuctionRules, Session},
};
pub use utils::error::{AuctionError, Result};
