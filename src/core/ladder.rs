use crate::core::ledger::BudgetLedger;
use crate::domain::model::Team;
use crate::utils::error::{AuctionError, Result};
use serde::{Deserialize, Serialize};

/// Bids strictly below `below` move by `increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderTier {
    pub below: u32,
    pub increment: u32,
}

/// Increment/decrement rules for bids. Tiers are checked in ascending order;
/// bids above the last tier use `default_increment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidLadder {
    base_price: u32,
    tiers: Vec<LadderTier>,
    default_increment: u32,
}

impl BidLadder {
    pub fn new(base_price: u32, tiers: Vec<LadderTier>, default_increment: u32) -> Result<Self> {
        if default_increment == 0 {
            return Err(AuctionError::InvalidConfigValueError {
                field: "ladder.default_increment".to_string(),
                value: default_increment.to_string(),
                reason: "Increment must be positive".to_string(),
            });
        }

        let mut previous: Option<LadderTier> = None;
        for tier in &tiers {
            if tier.increment == 0 {
                return Err(AuctionError::InvalidConfigValueError {
                    field: "ladder.tiers.increment".to_string(),
                    value: tier.increment.to_string(),
                    reason: "Increment must be positive".to_string(),
                });
            }
            if let Some(prev) = previous {
                if tier.below <= prev.below {
                    return Err(AuctionError::InvalidConfigValueError {
                        field: "ladder.tiers.below".to_string(),
                        value: tier.below.to_string(),
                        reason: format!("Tier bounds must ascend (previous was {})", prev.below),
                    });
                }
                if tier.increment < prev.increment {
                    return Err(AuctionError::InvalidConfigValueError {
                        field: "ladder.tiers.increment".to_string(),
                        value: tier.increment.to_string(),
                        reason: "Increments must not shrink as bids grow".to_string(),
                    });
                }
            }
            previous = Some(*tier);
        }
        if let Some(last) = previous {
            if default_increment < last.increment {
                return Err(AuctionError::InvalidConfigValueError {
                    field: "ladder.default_increment".to_string(),
                    value: default_increment.to_string(),
                    reason: format!("Must be at least the last tier increment {}", last.increment),
                });
            }
        }

        Ok(Self {
            base_price,
            tiers,
            default_increment,
        })
    }

    /// Single-step ladder with no tiers.
    pub fn flat(base_price: u32, increment: u32) -> Result<Self> {
        Self::new(base_price, Vec::new(), increment)
    }

    pub fn base_price(&self) -> u32 {
        self.base_price
    }

    pub fn step(&self, current_bid: u32) -> u32 {
        self.tiers
            .iter()
            .find(|tier| current_bid < tier.below)
            .map(|tier| tier.increment)
            .unwrap_or(self.default_increment)
    }

    /// Next bid for `team`, or `None` when the team could not pay it.
    pub fn increase(&self, ledger: &BudgetLedger, team: &Team, current_bid: u32) -> Option<u32> {
        if ledger.is_roster_full(team) {
            return None;
        }
        let next = current_bid.checked_add(self.step(current_bid))?;
        ledger.can_afford(team, next).then_some(next)
    }

    pub fn decrease(&self, current_bid: u32) -> u32 {
        current_bid
            .saturating_sub(self.step(current_bid))
            .max(self.base_price)
    }
}
