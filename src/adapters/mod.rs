// Adapters layer: concrete implementations for external systems (catalog
// files, local state storage, remote backup over HTTP, random selection).

pub mod catalog;
pub mod http_backup;
pub mod local_store;
pub mod selector;
