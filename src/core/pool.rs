use crate::domain::model::Item;
use crate::utils::error::{AuctionError, Result};
use std::sync::Arc;

/// Owns the items still to be drawn and the items passed over this round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolManager {
    pool: Vec<Arc<Item>>,
    unsold: Vec<Arc<Item>>,
}

impl PoolManager {
    pub fn new(pool: Vec<Arc<Item>>) -> Self {
        Self {
            pool,
            unsold: Vec::new(),
        }
    }

    pub fn with_unsold(pool: Vec<Arc<Item>>, unsold: Vec<Arc<Item>>) -> Self {
        Self { pool, unsold }
    }

    pub fn pool(&self) -> &[Arc<Item>] {
        &self.pool
    }

    pub fn unsold(&self) -> &[Arc<Item>] {
        &self.unsold
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut Arc<Item>> {
        self.pool.iter_mut().chain(self.unsold.iter_mut())
    }

    pub fn draw(&mut self, index: usize) -> Result<Arc<Item>> {
        if self.pool.is_empty() {
            return Err(AuctionError::EmptyPool);
        }
        if index >= self.pool.len() {
            return Err(AuctionError::IndexOutOfRange {
                index,
                len: self.pool.len(),
            });
        }
        Ok(self.pool.remove(index))
    }

    pub fn mark_unsold(&mut self, item: Arc<Item>) {
        self.unsold.push(item);
    }

    /// Starts a carried-over round: the unsold items, in the order they were
    /// passed over, become the new pool.
    pub fn requeue_unsold(&mut self) -> Result<&[Arc<Item>]> {
        if self.unsold.is_empty() {
            return Err(AuctionError::NothingToRequeue);
        }
        self.pool = std::mem::take(&mut self.unsold);
        Ok(&self.pool)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pool.is_empty()
    }

    /// True while the last few items of a round are on the wheel.
    pub fn is_final_picks(&self, threshold: usize) -> bool {
        !self.pool.is_empty() && self.pool.len() <= threshold
    }
}
