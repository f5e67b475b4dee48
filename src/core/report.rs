use crate::core::session::{AuctionRules, Session};
use crate::domain::model::{Item, Round, TeamId};
use crate::utils::error::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamStanding {
    pub team_id: TeamId,
    pub name: String,
    pub budget: u32,
    pub spent: u64,
    pub roster_size: usize,
    pub open_slots: usize,
}

/// End-of-round overview shown to the operator.
#[derive(Debug, Clone)]
pub struct RoundSummary {
    pub round: Round,
    pub remaining: usize,
    pub final_picks: bool,
    /// Highest rating first, unrated items last.
    pub unsold: Vec<Arc<Item>>,
    pub standings: Vec<TeamStanding>,
    rosters: Vec<(TeamId, Vec<(Arc<Item>, u32)>)>,
}

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    section: &'static str,
    team: &'a str,
    item_id: &'a str,
    item_name: &'a str,
    price: Option<u32>,
    rating: Option<f64>,
}

impl RoundSummary {
    pub fn from_session(session: &Session, rules: &AuctionRules) -> Self {
        let mut unsold = session.unsold().to_vec();
        unsold.sort_by(|a, b| by_rating_desc(a, b));

        let standings = session
            .teams()
            .iter()
            .map(|team| TeamStanding {
                team_id: team.id,
                name: team.name.clone(),
                budget: team.budget,
                spent: team.spent(),
                roster_size: team.roster.len(),
                open_slots: rules.ledger.max_roster_size.saturating_sub(team.roster.len()),
            })
            .collect();

        let rosters = session
            .teams()
            .iter()
            .map(|team| {
                let entries = team
                    .roster
                    .iter()
                    .map(|entry| (entry.item.clone(), entry.price))
                    .collect();
                (team.id, entries)
            })
            .collect();

        Self {
            round: session.round(),
            remaining: session.pool().len(),
            final_picks: session.is_final_picks(rules),
            unsold,
            standings,
            rosters,
        }
    }

    /// One row per rostered item, then one row per unsold item.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;

        for (team_id, entries) in &self.rosters {
            let team = self
                .standings
                .iter()
                .find(|standing| standing.team_id == *team_id)
                .map(|standing| standing.name.as_str())
                .unwrap_or_default();
            for (item, price) in entries {
                writer.serialize(ReportRow {
                    section: "roster",
                    team,
                    item_id: &item.id.0,
                    item_name: &item.name,
                    price: Some(*price),
                    rating: item.rating,
                })?;
            }
        }

        for item in &self.unsold {
            writer.serialize(ReportRow {
                section: "unsold",
                team: "",
                item_id: &item.id.0,
                item_name: &item.name,
                price: None,
                rating: item.rating,
            })?;
        }

        writer.flush()?;
        tracing::info!(path = %path.as_ref().display(), "Round report written");
        Ok(())
    }
}

fn by_rating_desc(a: &Item, b: &Item) -> Ordering {
    match (a.rating, b.rating) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ladder::BidLadder;
    use crate::core::ledger::BudgetLedger;
    use crate::domain::model::Decision;

    fn rules() -> AuctionRules {
        AuctionRules {
            initial_budget: 300,
            final_picks_threshold: 5,
            ledger: BudgetLedger::new(2, 50),
            ladder: BidLadder::flat(50, 50).unwrap(),
        }
    }

    fn played_session() -> Session {
        let rules = rules();
        let items = vec![
            Arc::new(Item::new("1", "Ana").with_rating(7.5)),
            Arc::new(Item::new("2", "Bo")),
            Arc::new(Item::new("3", "Cy").with_rating(9.0)),
            Arc::new(Item::new("4", "Di").with_rating(8.0)),
        ];
        let mut session = Session::fresh(items, &["Reds".to_string(), "Blues".to_string()], &rules);

        session.draw(0, &rules).unwrap();
        session.select_team(TeamId(1)).unwrap();
        session.resolve(Decision::Sold, &rules).unwrap();
        for _ in 0..3 {
            session.draw(0, &rules).unwrap();
            session.resolve(Decision::Unsold, &rules).unwrap();
        }
        session
    }

    #[test]
    fn test_unsold_sorted_by_rating_with_unrated_last() {
        let summary = RoundSummary::from_session(&played_session(), &rules());
        let names: Vec<_> = summary.unsold.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["Cy", "Di", "Bo"]);
        assert_eq!(summary.round, Round::Main);
        assert_eq!(summary.remaining, 0);
    }

    #[test]
    fn test_standings() {
        let summary = RoundSummary::from_session(&played_session(), &rules());
        let reds = &summary.standings[0];
        assert_eq!(reds.name, "Reds");
        assert_eq!(reds.budget, 250);
        assert_eq!(reds.spent, 50);
        assert_eq!(reds.roster_size, 1);
        assert_eq!(reds.open_slots, 1);
        assert_eq!(summary.standings[1].spent, 0);
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round.csv");
        RoundSummary::from_session(&played_session(), &rules())
            .write_csv(&path)
            .unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["section", "team", "item_id", "item_name", "price", "rating"]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "roster");
        assert_eq!(&rows[0][1], "Reds");
        assert_eq!(&rows[0][4], "50");
        assert_eq!(&rows[1][0], "unsold");
        assert_eq!(&rows[1][3], "Cy");
        assert_eq!(&rows[3][5], "");
    }
}
