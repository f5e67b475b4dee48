use crate::domain::snapshot::{RemoteEnvelope, StateDocument};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Durable key-value slot holding the serialized session.
pub trait LocalStore: Send + Sync {
    fn load(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
    fn save(&self, key: &str, data: &str) -> impl std::future::Future<Output = Result<()>> + Send;
    fn remove(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Best-effort remote copy of the session state.
#[async_trait]
pub trait RemoteBackup: Send + Sync {
    async fn save_state(&self, document: &StateDocument) -> Result<()>;
    /// `Ok(None)` when the backup service has nothing saved.
    async fn load_state(&self) -> Result<Option<RemoteEnvelope>>;
}

/// Picks the index of the next item to draw from a pool of `pool_len` items.
pub trait Selector {
    fn pick(&mut self, pool_len: usize) -> usize;
}
