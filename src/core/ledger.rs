use crate::domain::model::{Item, RosterEntry, Team};
use crate::utils::error::{AuctionError, Result};
use std::sync::Arc;

/// Budget and roster rules shared by every team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLedger {
    pub max_roster_size: usize,
    pub minimum_reserve_price: u32,
}

impl BudgetLedger {
    pub fn new(max_roster_size: usize, minimum_reserve_price: u32) -> Self {
        Self {
            max_roster_size,
            minimum_reserve_price,
        }
    }

    /// Amount a team must keep back to fill its remaining slots at the
    /// minimum price, not counting the slot being bid on.
    pub fn reserve(&self, team: &Team) -> u64 {
        let open_after_this = self
            .max_roster_size
            .saturating_sub(team.roster.len())
            .saturating_sub(1);
        open_after_this as u64 * u64::from(self.minimum_reserve_price)
    }

    pub fn can_afford(&self, team: &Team, price: u32) -> bool {
        match team.budget.checked_sub(price) {
            Some(left) => u64::from(left) >= self.reserve(team),
            None => false,
        }
    }

    pub fn is_roster_full(&self, team: &Team) -> bool {
        team.roster.len() >= self.max_roster_size
    }

    /// Debits `price` and appends the item to the roster. Nothing is changed
    /// when the purchase is rejected.
    pub fn commit(&self, team: &mut Team, item: Arc<Item>, price: u32) -> Result<()> {
        if self.is_roster_full(team) {
            return Err(AuctionError::RosterFull {
                team_id: team.id,
                max: self.max_roster_size,
            });
        }
        if !self.can_afford(team, price) {
            return Err(AuctionError::InsufficientBudget {
                team_id: team.id,
                price,
                budget: team.budget,
                reserve: u32::try_from(self.reserve(team)).unwrap_or(u32::MAX),
            });
        }

        team.budget -= price;
        team.roster.push(RosterEntry { item, price });
        Ok(())
    }
}
