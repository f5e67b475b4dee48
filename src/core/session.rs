use crate::core::ladder::BidLadder;
use crate::core::ledger::BudgetLedger;
use crate::core::pool::PoolManager;
use crate::domain::model::{
    ActiveDraw, BidDirection, Decision, Item, ItemId, Phase, Round, Team, TeamId,
};
use crate::domain::snapshot::SessionSnapshot;
use crate::utils::error::{AuctionError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fixed rules of one auction.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionRules {
    pub initial_budget: u32,
    pub final_picks_threshold: usize,
    pub ledger: BudgetLedger,
    pub ladder: BidLadder,
}

/// The session aggregate. All mutation goes through the transition methods
/// below; `AuctionController` wraps them with undo and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pool: PoolManager,
    teams: Vec<Team>,
    active_draw: Option<ActiveDraw>,
    round: Round,
}

impl Session {
    /// Full pool, empty rosters, every team at the initial budget. Team ids
    /// are assigned from 1 in the order given.
    pub fn fresh(items: Vec<Arc<Item>>, team_names: &[String], rules: &AuctionRules) -> Self {
        let teams = team_names
            .iter()
            .enumerate()
            .map(|(i, name)| Team::new(TeamId(i as u32 + 1), name.clone(), rules.initial_budget))
            .collect();

        Self {
            pool: PoolManager::new(items),
            teams,
            active_draw: None,
            round: Round::Main,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.active_draw.is_some() {
            Phase::Drawing
        } else if self.pool.is_exhausted() {
            Phase::RoundExhausted
        } else {
            Phase::RoundActive
        }
    }

    pub fn pool(&self) -> &[Arc<Item>] {
        self.pool.pool()
    }

    pub fn unsold(&self) -> &[Arc<Item>] {
        self.pool.unsold()
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, team_id: TeamId) -> Option<&Team> {
        self.teams.iter().find(|team| team.id == team_id)
    }

    pub fn active_draw(&self) -> Option<&ActiveDraw> {
        self.active_draw.as_ref()
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn is_final_picks(&self, rules: &AuctionRules) -> bool {
        self.pool.is_final_picks(rules.final_picks_threshold)
    }

    /// Ids of every item the session holds, wherever it currently sits.
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.pool
            .pool()
            .iter()
            .chain(self.pool.unsold())
            .chain(self.teams.iter().flat_map(|t| t.roster.iter().map(|e| &e.item)))
            .chain(self.active_draw.iter().map(|d| &d.item))
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn draw(&mut self, index: usize, rules: &AuctionRules) -> Result<Arc<Item>> {
        if self.active_draw.is_some() {
            return Err(AuctionError::AlreadyDrawing);
        }
        let item = self.pool.draw(index)?;
        self.active_draw = Some(ActiveDraw {
            item: item.clone(),
            current_bid: rules.ladder.base_price(),
            selected_team_id: None,
        });
        Ok(item)
    }

    /// Selection is non-committal: budgets are checked when bidding and
    /// again when the item is sold.
    pub fn select_team(&mut self, team_id: TeamId) -> Result<()> {
        if self.team(team_id).is_none() {
            return Err(AuctionError::UnknownTeam { team_id });
        }
        let draw = self.active_draw.as_mut().ok_or(AuctionError::NoActiveDraw)?;
        draw.selected_team_id = Some(team_id);
        Ok(())
    }

    /// Moves the current bid one rung. Returns the new bid, or `None` when
    /// the ladder refused to move (no team selected, team cannot afford the
    /// next rung, or already at the base price).
    pub fn adjust_bid(&mut self, direction: BidDirection, rules: &AuctionRules) -> Result<Option<u32>> {
        let draw = self.active_draw.as_ref().ok_or(AuctionError::NoActiveDraw)?;
        let Some(team_id) = draw.selected_team_id else {
            return Ok(None);
        };
        let team = self
            .team(team_id)
            .ok_or(AuctionError::UnknownTeam { team_id })?;

        let current = draw.current_bid;
        let next = match direction {
            BidDirection::Up => rules.ladder.increase(&rules.ledger, team, current),
            BidDirection::Down => Some(rules.ladder.decrease(current)).filter(|bid| *bid != current),
        };

        if let (Some(bid), Some(draw)) = (next, self.active_draw.as_mut()) {
            draw.current_bid = bid;
        }
        Ok(next)
    }

    /// Settles the active draw and reports the phase the round is left in.
    pub fn resolve(&mut self, decision: Decision, rules: &AuctionRules) -> Result<Phase> {
        let draw = self.active_draw.as_ref().ok_or(AuctionError::NoActiveDraw)?;

        match decision {
            Decision::Sold => {
                let team_id = draw.selected_team_id.ok_or(AuctionError::NoTeamSelected)?;
                let item = draw.item.clone();
                let price = draw.current_bid;
                let team = self
                    .teams
                    .iter_mut()
                    .find(|team| team.id == team_id)
                    .ok_or(AuctionError::UnknownTeam { team_id })?;

                if let Err(e) = rules.ledger.commit(team, item, price) {
                    tracing::error!(
                        team = %team_id,
                        price,
                        error = %e,
                        "Sale rejected at commit; bid ladder and ledger are out of sync"
                    );
                    return Err(e);
                }
            }
            Decision::Unsold => {
                self.pool.mark_unsold(draw.item.clone());
            }
        }

        self.active_draw = None;
        Ok(self.phase())
    }

    /// Starts a carried-over round from the unsold list.
    pub fn requeue_unsold(&mut self) -> Result<usize> {
        match self.phase() {
            Phase::Drawing => return Err(AuctionError::AlreadyDrawing),
            Phase::RoundActive => {
                return Err(AuctionError::RoundNotExhausted {
                    remaining: self.pool.pool().len(),
                })
            }
            _ => {}
        }
        let requeued = self.pool.requeue_unsold()?.len();
        self.round = Round::CarriedOver;
        Ok(requeued)
    }

    pub fn rename_team(&mut self, team_id: TeamId, name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AuctionError::InvalidConfigValueError {
                field: "team.name".to_string(),
                value: name.to_string(),
                reason: "Team name cannot be empty".to_string(),
            });
        }
        let team = self
            .teams
            .iter_mut()
            .find(|team| team.id == team_id)
            .ok_or(AuctionError::UnknownTeam { team_id })?;
        team.name = trimmed.to_string();
        Ok(())
    }

    /// Checks item partition, budget conservation, roster caps and the bid
    /// floor.
    pub fn check_invariants(&self, rules: &AuctionRules) -> Result<()> {
        let violation = |reason: String| Err(AuctionError::InvariantViolation { reason });

        let mut seen = HashSet::new();
        for id in self.item_ids() {
            if !seen.insert(id.clone()) {
                return violation(format!("item {} appears in more than one place", id));
            }
        }

        let mut team_ids = HashSet::new();
        for team in &self.teams {
            if !team_ids.insert(team.id) {
                return violation(format!("duplicate team id {}", team.id));
            }
            if u64::from(team.budget) + team.spent() != u64::from(rules.initial_budget) {
                return violation(format!(
                    "team {} budget {} plus spent {} differs from initial budget {}",
                    team.id,
                    team.budget,
                    team.spent(),
                    rules.initial_budget
                ));
            }
            if team.roster.len() > rules.ledger.max_roster_size {
                return violation(format!(
                    "team {} roster has {} items, cap is {}",
                    team.id,
                    team.roster.len(),
                    rules.ledger.max_roster_size
                ));
            }
        }

        if let Some(draw) = &self.active_draw {
            if draw.current_bid < rules.ladder.base_price() {
                return violation(format!(
                    "current bid {} is below the base price {}",
                    draw.current_bid,
                    rules.ladder.base_price()
                ));
            }
            if let Some(team_id) = draw.selected_team_id {
                if self.team(team_id).is_none() {
                    return violation(format!("selected team {} does not exist", team_id));
                }
            }
        }

        Ok(())
    }

    /// Rejects a session whose items are not exactly the catalog's items.
    pub fn check_catalog(&self, catalog_ids: &HashSet<ItemId>) -> Result<()> {
        let held: HashSet<ItemId> = self.item_ids().into_iter().collect();
        if &held == catalog_ids {
            return Ok(());
        }
        Err(AuctionError::MalformedState {
            reason: format!(
                "saved items do not match the catalog ({} missing, {} unknown)",
                catalog_ids.difference(&held).count(),
                held.difference(catalog_ids).count()
            ),
        })
    }

    /// Swaps every held item for the catalog's copy when the two are equal,
    /// so reloaded sessions share item payloads again.
    pub fn share_items(&mut self, catalog: &HashMap<ItemId, Arc<Item>>) {
        for item in self.pool.items_mut() {
            share_item(item, catalog);
        }
        for team in &mut self.teams {
            for entry in &mut team.roster {
                share_item(&mut entry.item, catalog);
            }
        }
        if let Some(draw) = &mut self.active_draw {
            share_item(&mut draw.item, catalog);
        }
    }

    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            pool: self.pool.pool().to_vec(),
            unsold: self.pool.unsold().to_vec(),
            teams: self.teams.clone(),
            active_draw: self.active_draw.as_ref().map(|d| d.item.clone()),
            current_bid: self.active_draw.as_ref().map(|d| d.current_bid),
            selected_team_id: self.active_draw.as_ref().and_then(|d| d.selected_team_id),
            round: self.round,
        }
    }

    /// Rebuilds a session from persisted state, rejecting documents that
    /// break any session invariant.
    pub fn from_snapshot(snapshot: SessionSnapshot, rules: &AuctionRules) -> Result<Self> {
        let active_draw = match snapshot.active_draw {
            Some(item) => Some(ActiveDraw {
                item,
                current_bid: snapshot.current_bid.unwrap_or(rules.ladder.base_price()),
                selected_team_id: snapshot.selected_team_id,
            }),
            None if snapshot.current_bid.is_some() || snapshot.selected_team_id.is_some() => {
                return Err(AuctionError::MalformedState {
                    reason: "bid or team selection present without an active draw".to_string(),
                })
            }
            None => None,
        };

        let session = Self {
            pool: PoolManager::with_unsold(snapshot.pool, snapshot.unsold),
            teams: snapshot.teams,
            active_draw,
            round: snapshot.round,
        };

        session.check_invariants(rules).map_err(|e| match e {
            AuctionError::InvariantViolation { reason } => AuctionError::MalformedState { reason },
            other => other,
        })?;
        Ok(session)
    }
}

fn share_item(item: &mut Arc<Item>, catalog: &HashMap<ItemId, Arc<Item>>) {
    if let Some(shared) = catalog.get(&item.id) {
        if **shared == **item {
            *item = shared.clone();
        }
    }
}
