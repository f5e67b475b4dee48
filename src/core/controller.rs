use crate::adapters::catalog::Catalog;
use crate::core::history::HistoryStack;
use crate::core::reconciler::{
    DeadLetterLog, PersistenceReconciler, ResumeCandidate, ResumeDecision, ResumeMode,
};
use crate::core::report::RoundSummary;
use crate::core::session::{AuctionRules, Session};
use crate::domain::model::{BidDirection, Decision, Item, Phase, TeamId};
use crate::domain::ports::{LocalStore, Selector};
use crate::utils::error::{AuctionError, Result};
use std::sync::Arc;

/// Single owner of the live session. Every state change is snapshotted onto
/// the undo stack, checked against the session invariants and saved locally
/// before the call returns.
pub struct AuctionController<L: LocalStore> {
    rules: AuctionRules,
    session: Option<Session>,
    history: HistoryStack,
    ended: bool,
    reconciler: PersistenceReconciler<L>,
}

impl<L: LocalStore> AuctionController<L> {
    pub fn new(rules: AuctionRules, reconciler: PersistenceReconciler<L>) -> Self {
        Self {
            rules,
            session: None,
            history: HistoryStack::new(),
            ended: false,
            reconciler,
        }
    }

    pub fn rules(&self) -> &AuctionRules {
        &self.rules
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reconciler(&self) -> &PersistenceReconciler<L> {
        &self.reconciler
    }

    pub fn dead_letters(&self) -> Option<&DeadLetterLog> {
        self.reconciler.dead_letters()
    }

    pub fn phase(&self) -> Phase {
        match (&self.session, self.ended) {
            (_, true) => Phase::Ended,
            (None, false) => Phase::Idle,
            (Some(session), false) => session.phase(),
        }
    }

    pub fn summary(&self) -> Option<RoundSummary> {
        self.session
            .as_ref()
            .map(|session| RoundSummary::from_session(session, &self.rules))
    }

    /// Saved sessions are only offered when they hold exactly the items of
    /// `catalog`.
    pub async fn load_on_startup(&self, catalog: &Catalog) -> Result<ResumeDecision> {
        self.reconciler
            .load_on_startup(&self.rules, catalog.items())
            .await
    }

    /// Full pool, every team at the initial budget, empty undo history.
    pub async fn start_fresh(&mut self, catalog: &Catalog, team_names: &[String]) -> Result<()> {
        let session = Session::fresh(catalog.items().to_vec(), team_names, &self.rules);
        session.check_invariants(&self.rules)?;

        self.session = Some(session);
        self.history.clear();
        self.ended = false;
        self.persist().await?;

        tracing::info!(
            items = catalog.len(),
            teams = team_names.len(),
            "Started a fresh auction"
        );
        Ok(())
    }

    /// Drops the saved local state after the operator declined to resume.
    pub async fn decline_resume(&self) -> Result<()> {
        tracing::info!("Resume declined; discarding local state");
        self.reconciler.discard_local().await
    }

    pub async fn resume(&mut self, candidate: ResumeCandidate) -> Result<()> {
        tracing::info!(
            source = ?candidate.source,
            history = candidate.history.len(),
            "Resuming saved auction"
        );
        self.session = Some(candidate.session);
        self.history = candidate.history;
        self.ended = false;
        // Re-establish the local copy when resuming from the remote backup.
        self.persist().await
    }

    /// Resumes a finished round straight into the carried-over round.
    pub async fn resume_carried_over(&mut self, candidate: ResumeCandidate) -> Result<usize> {
        if candidate.mode != ResumeMode::CarriedOverRound {
            return Err(AuctionError::NothingToRequeue);
        }
        self.resume(candidate).await?;
        self.requeue_unsold().await
    }

    pub async fn draw(&mut self, index: usize) -> Result<Arc<Item>> {
        let item = self
            .transition("draw", |session, rules| session.draw(index, rules))
            .await?;
        tracing::info!(item = %item.name, id = %item.id, "Item drawn");
        if let Some(session) = &self.session {
            if session.is_final_picks(&self.rules) {
                tracing::info!(remaining = session.pool().len(), "Final picks");
            }
        }
        Ok(item)
    }

    pub async fn draw_with<S: Selector>(&mut self, selector: &mut S) -> Result<Arc<Item>> {
        let pool_len = self
            .live_session()?
            .pool()
            .len();
        let index = if pool_len == 0 { 0 } else { selector.pick(pool_len) };
        self.draw(index).await
    }

    pub async fn select_team(&mut self, team_id: TeamId) -> Result<()> {
        self.transition("select_team", |session, _| session.select_team(team_id))
            .await?;
        tracing::info!(team = %team_id, "Team selected");
        Ok(())
    }

    pub async fn increase_bid(&mut self) -> Result<Option<u32>> {
        self.adjust_bid(BidDirection::Up).await
    }

    pub async fn decrease_bid(&mut self) -> Result<Option<u32>> {
        self.adjust_bid(BidDirection::Down).await
    }

    async fn adjust_bid(&mut self, direction: BidDirection) -> Result<Option<u32>> {
        let bid = self
            .transition("adjust_bid", |session, rules| session.adjust_bid(direction, rules))
            .await?;
        match bid {
            Some(bid) => tracing::info!(bid, ?direction, "Bid changed"),
            None => tracing::debug!(?direction, "Bid unchanged"),
        }
        Ok(bid)
    }

    pub async fn resolve_sold(&mut self) -> Result<Phase> {
        self.resolve(Decision::Sold).await
    }

    pub async fn resolve_unsold(&mut self) -> Result<Phase> {
        self.resolve(Decision::Unsold).await
    }

    async fn resolve(&mut self, decision: Decision) -> Result<Phase> {
        let settled = self
            .live_session()?
            .active_draw()
            .map(|draw| (draw.item.name.clone(), draw.current_bid, draw.selected_team_id));

        let phase = self
            .transition("resolve", |session, rules| session.resolve(decision, rules))
            .await?;

        if let Some((item, price, team)) = settled {
            match decision {
                Decision::Sold => tracing::info!(%item, price, team = ?team, "Sold"),
                Decision::Unsold => tracing::info!(%item, "Unsold"),
            }
        }
        if phase == Phase::RoundExhausted {
            tracing::info!("Round complete");
        }
        Ok(phase)
    }

    pub async fn requeue_unsold(&mut self) -> Result<usize> {
        let requeued = self
            .transition("requeue_unsold", |session, _| session.requeue_unsold())
            .await?;
        tracing::info!(items = requeued, "Unsold round started");
        Ok(requeued)
    }

    pub async fn rename_team(&mut self, team_id: TeamId, name: &str) -> Result<()> {
        self.transition("rename_team", |session, _| session.rename_team(team_id, name))
            .await?;
        tracing::info!(team = %team_id, name, "Team renamed");
        Ok(())
    }

    /// Replaces the live session with the most recent snapshot.
    pub async fn undo(&mut self) -> Result<Phase> {
        if self.ended {
            return Err(AuctionError::SessionEnded);
        }
        if self.session.is_none() {
            return Err(AuctionError::SessionNotLoaded);
        }

        let previous = self.history.pop()?;
        let current = self.session.replace(previous);

        if let Err(e) = self.persist().await {
            if let Some(restored) = std::mem::replace(&mut self.session, current) {
                self.history.push(restored);
            }
            return Err(e);
        }

        let phase = self.phase();
        tracing::info!(%phase, remaining_history = self.history.len(), "Undo");
        Ok(phase)
    }

    /// Terminal. Clears the local copy; the remote backup is kept.
    pub async fn end(&mut self) -> Result<()> {
        let session = self.live_session()?;
        match session.phase() {
            Phase::Drawing => return Err(AuctionError::AlreadyDrawing),
            Phase::RoundActive => {
                return Err(AuctionError::RoundNotExhausted {
                    remaining: session.pool().len(),
                })
            }
            _ => {}
        }

        self.reconciler.discard_local().await?;
        self.history.clear();
        self.ended = true;
        tracing::info!("Auction ended");
        Ok(())
    }

    /// Waits (bounded) for queued remote backups.
    pub async fn shutdown(self) {
        self.reconciler.shutdown().await;
    }

    fn live_session(&self) -> Result<&Session> {
        if self.ended {
            return Err(AuctionError::SessionEnded);
        }
        self.session.as_ref().ok_or(AuctionError::SessionNotLoaded)
    }

    async fn persist(&self) -> Result<()> {
        match &self.session {
            Some(session) => self.reconciler.flush(session, &self.history).await,
            None => Ok(()),
        }
    }

    /// Applies `op` to the live session. Failed or invariant-breaking
    /// operations leave the session untouched; operations that change
    /// nothing skip the snapshot and the save.
    async fn transition<T>(
        &mut self,
        action: &'static str,
        op: impl FnOnce(&mut Session, &AuctionRules) -> Result<T>,
    ) -> Result<T> {
        if self.ended {
            return Err(AuctionError::SessionEnded);
        }
        let session = self.session.as_mut().ok_or(AuctionError::SessionNotLoaded)?;
        let before = session.clone();

        let value = match op(session, &self.rules) {
            Ok(value) => value,
            Err(e) => {
                *session = before;
                tracing::debug!(action, error = %e, "Transition rejected");
                return Err(e);
            }
        };

        if *session == before {
            return Ok(value);
        }

        if let Err(e) = session.check_invariants(&self.rules) {
            tracing::error!(action, error = %e, "Transition broke a session invariant; rolled back");
            *session = before;
            return Err(e);
        }

        self.history.push(before);
        if let Err(e) = self.persist().await {
            tracing::error!(action, error = %e, "Local save failed; transition rolled back");
            if let Ok(previous) = self.history.pop() {
                self.session = Some(previous);
            }
            return Err(e);
        }

        Ok(value)
    }
}
