use auction_session::core::ladder::BidLadder;
use auction_session::core::ledger::BudgetLedger;
use auction_session::core::reconciler::STATE_KEY;
use auction_session::domain::model::{Item, Phase, Round, TeamId};
use auction_session::domain::ports::LocalStore;
use auction_session::domain::snapshot::{RemoteEnvelope, StateDocument};
use auction_session::{
    AuctionController, AuctionRules, Catalog, FileStateStore, HttpBackup, MemoryStore,
    PersistenceReconciler, RemoteBackupWorker, ResumeDecision, ResumeMode, ResumeSource, Session,
};
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn rules() -> AuctionRules {
    AuctionRules {
        initial_budget: 300,
        final_picks_threshold: 5,
        ledger: BudgetLedger::new(2, 50),
        ladder: BidLadder::flat(50, 50).unwrap(),
    }
}

fn catalog() -> Catalog {
    Catalog::new(vec![
        Item::new("1", "Ana").with_rating(8.0),
        Item::new("2", "Bo").with_rating(6.5),
        Item::new("3", "Cy"),
    ])
    .unwrap()
}

fn team_names() -> Vec<String> {
    vec!["Reds".to_string(), "Blues".to_string()]
}

fn remote_worker(server: &MockServer, timeout: Duration) -> RemoteBackupWorker {
    let backup = HttpBackup::new(&server.base_url(), timeout).unwrap();
    RemoteBackupWorker::spawn(Arc::new(backup), timeout)
}

fn envelope_for(session: &Session) -> serde_json::Value {
    serde_json::to_value(RemoteEnvelope {
        state: StateDocument {
            session: session.to_snapshot(),
            history: vec![],
        },
        saved_at: Some(chrono::Utc::now()),
    })
    .unwrap()
}

#[tokio::test]
async fn test_resume_from_file_store_after_restart() {
    let temp_dir = TempDir::new().unwrap();

    let mut first = AuctionController::new(
        rules(),
        PersistenceReconciler::new(FileStateStore::new(temp_dir.path())),
    );
    assert!(matches!(
        first.load_on_startup(&catalog()).await.unwrap(),
        ResumeDecision::Fresh
    ));
    first.start_fresh(&catalog(), &team_names()).await.unwrap();
    first.draw(1).await.unwrap();
    first.select_team(TeamId(2)).await.unwrap();
    first.increase_bid().await.unwrap();
    let live = first.session().cloned().unwrap();
    let depth = first.history_len();
    first.shutdown().await;

    let store = FileStateStore::new(temp_dir.path());
    assert!(store.path_for(STATE_KEY).exists());

    let mut second = AuctionController::new(rules(), PersistenceReconciler::new(store));
    let decision = second.load_on_startup(&catalog()).await.unwrap();
    let candidates = decision.candidates();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].source, ResumeSource::Local);
    assert_eq!(candidates[0].mode, ResumeMode::Plain);

    second.resume(candidates[0].clone()).await.unwrap();
    assert_eq!(second.session(), Some(&live));
    assert_eq!(second.history_len(), depth);
    assert_eq!(second.phase(), Phase::Drawing);

    // Undo history survives the restart.
    second.undo().await.unwrap();
    assert_eq!(
        second.session().unwrap().active_draw().unwrap().current_bid,
        50
    );
}

#[tokio::test]
async fn test_declined_resume_discards_local_copy() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStateStore::new(temp_dir.path());

    let mut first = AuctionController::new(rules(), PersistenceReconciler::new(store.clone()));
    first.start_fresh(&catalog(), &team_names()).await.unwrap();
    first.draw(0).await.unwrap();

    let mut second = AuctionController::new(rules(), PersistenceReconciler::new(store.clone()));
    assert_eq!(second.load_on_startup(&catalog()).await.unwrap().candidates().len(), 1);
    second.decline_resume().await.unwrap();
    assert!(!store.path_for(STATE_KEY).exists());

    second.start_fresh(&catalog(), &team_names()).await.unwrap();
    assert_eq!(second.session().unwrap().pool().len(), 3);
    assert_eq!(second.history_len(), 0);
}

#[tokio::test]
async fn test_corrupt_local_file_is_treated_as_absent() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStateStore::new(temp_dir.path());
    store
        .save(STATE_KEY, r#"{"pool": "not a list", "teams": []}"#)
        .await
        .unwrap();

    let controller = AuctionController::new(rules(), PersistenceReconciler::new(store));
    assert!(matches!(
        controller.load_on_startup(&catalog()).await.unwrap(),
        ResumeDecision::Fresh
    ));
}

#[tokio::test]
async fn test_state_breaking_budget_conservation_is_rejected() {
    let rules = rules();
    let mut session = Session::fresh(catalog().items().to_vec(), &team_names(), &rules);
    session.draw(0, &rules).unwrap();
    let mut snapshot = session.to_snapshot();
    snapshot.teams[0].budget = 999;

    let store = MemoryStore::new();
    let document = StateDocument {
        session: snapshot,
        history: vec![],
    };
    store
        .save(STATE_KEY, &serde_json::to_string(&document).unwrap())
        .await
        .unwrap();

    let controller = AuctionController::new(rules, PersistenceReconciler::new(store));
    assert!(matches!(
        controller.load_on_startup(&catalog()).await.unwrap(),
        ResumeDecision::Fresh
    ));
}

#[tokio::test]
async fn test_remote_backup_receives_state_without_history() {
    let server = MockServer::start();
    let save_mock = server.mock(|when, then| {
        when.method(POST).path("/save-state");
        then.status(200);
    });

    let reconciler = PersistenceReconciler::new(MemoryStore::new())
        .with_remote(remote_worker(&server, Duration::from_secs(2)));
    let mut auction = AuctionController::new(rules(), reconciler);
    auction.start_fresh(&catalog(), &team_names()).await.unwrap();
    auction.draw(0).await.unwrap();
    auction.select_team(TeamId(1)).await.unwrap();

    let dead_letters = auction.dead_letters().unwrap().clone();
    auction.shutdown().await;

    assert!(save_mock.hits() >= 1);
    assert!(dead_letters.is_empty());
}

#[tokio::test]
async fn test_remote_failures_never_block_the_operator() {
    let server = MockServer::start();
    let save_mock = server.mock(|when, then| {
        when.method(POST).path("/save-state");
        then.status(503);
    });

    let store = MemoryStore::new();
    let reconciler = PersistenceReconciler::new(store.clone())
        .with_remote(remote_worker(&server, Duration::from_secs(2)));
    let mut auction = AuctionController::new(rules(), reconciler);

    auction.start_fresh(&catalog(), &team_names()).await.unwrap();
    auction.draw(0).await.unwrap();
    auction.resolve_unsold().await.unwrap();
    assert!(store.load(STATE_KEY).await.unwrap().is_some());

    let dead_letters = auction.dead_letters().unwrap().clone();
    auction.shutdown().await;

    assert!(save_mock.hits() >= 1);
    assert!(!dead_letters.is_empty());
    assert!(dead_letters.entries()[0].error.contains("503"));
}

#[tokio::test]
async fn test_slow_remote_is_cut_off_by_timeout() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/save-state");
        then.status(200).delay(Duration::from_millis(800));
    });

    let reconciler = PersistenceReconciler::new(MemoryStore::new())
        .with_remote(remote_worker(&server, Duration::from_millis(100)));
    let mut auction = AuctionController::new(rules(), reconciler);
    auction.start_fresh(&catalog(), &team_names()).await.unwrap();

    let dead_letters = auction.dead_letters().unwrap().clone();
    tokio::time::sleep(Duration::from_millis(400)).await;
    auction.shutdown().await;

    assert_eq!(dead_letters.len(), 1);
}

#[tokio::test]
async fn test_resume_from_remote_when_local_is_missing() {
    let rules = rules();
    let mut remote_session = Session::fresh(catalog().items().to_vec(), &team_names(), &rules);
    remote_session.draw(2, &rules).unwrap();
    remote_session.select_team(TeamId(1)).unwrap();

    let server = MockServer::start();
    let load_mock = server.mock(|when, then| {
        when.method(GET).path("/load-state");
        then.status(200).json_body(envelope_for(&remote_session));
    });
    server.mock(|when, then| {
        when.method(POST).path("/save-state");
        then.status(200);
    });

    let store = MemoryStore::new();
    let reconciler = PersistenceReconciler::new(store.clone())
        .with_remote(remote_worker(&server, Duration::from_secs(2)));
    let mut auction = AuctionController::new(rules, reconciler);

    let decision = auction.load_on_startup(&catalog()).await.unwrap();
    load_mock.assert();
    let candidate = decision.candidates()[0].clone();
    assert_eq!(candidate.source, ResumeSource::Remote);
    assert!(candidate.saved_at.is_some());
    assert_eq!(candidate.history.len(), 0);

    auction.resume(candidate).await.unwrap();
    assert_eq!(auction.session(), Some(&remote_session));
    // The local copy is re-established from the remote one.
    assert!(store.load(STATE_KEY).await.unwrap().is_some());
    auction.shutdown().await;
}

#[tokio::test]
async fn test_both_copies_are_offered_local_first() {
    let rules = rules();
    let store = MemoryStore::new();
    let mut local = AuctionController::new(rules.clone(), PersistenceReconciler::new(store.clone()));
    local.start_fresh(&catalog(), &team_names()).await.unwrap();
    local.draw(0).await.unwrap();

    let remote_session = Session::fresh(catalog().items().to_vec(), &team_names(), &rules);
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/load-state");
        then.status(200).json_body(envelope_for(&remote_session));
    });

    let reconciler = PersistenceReconciler::new(store)
        .with_remote(remote_worker(&server, Duration::from_secs(2)));
    let auction = AuctionController::new(rules, reconciler);
    let decision = auction.load_on_startup(&catalog()).await.unwrap();

    let sources: Vec<_> = decision.candidates().iter().map(|c| c.source).collect();
    assert_eq!(sources, vec![ResumeSource::Local, ResumeSource::Remote]);
    auction.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_remote_degrades_to_local_only() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/load-state");
        then.status(500);
    });

    let reconciler = PersistenceReconciler::new(MemoryStore::new())
        .with_remote(remote_worker(&server, Duration::from_secs(2)));
    let auction = AuctionController::new(rules(), reconciler);

    assert!(matches!(
        auction.load_on_startup(&catalog()).await.unwrap(),
        ResumeDecision::Fresh
    ));
    assert_eq!(auction.dead_letters().unwrap().len(), 1);
    auction.shutdown().await;
}

#[tokio::test]
async fn test_carried_over_resume_starts_unsold_round() {
    let rules = rules();
    let store = MemoryStore::new();
    let mut first = AuctionController::new(rules.clone(), PersistenceReconciler::new(store.clone()));
    first.start_fresh(&catalog(), &team_names()).await.unwrap();
    for _ in 0..3 {
        first.draw(0).await.unwrap();
        first.resolve_unsold().await.unwrap();
    }
    assert_eq!(first.phase(), Phase::RoundExhausted);

    let mut second = AuctionController::new(rules, PersistenceReconciler::new(store));
    let decision = second.load_on_startup(&catalog()).await.unwrap();
    let candidate = decision.candidates()[0].clone();
    assert_eq!(candidate.mode, ResumeMode::CarriedOverRound);

    assert_eq!(second.resume_carried_over(candidate).await.unwrap(), 3);
    let session = second.session().unwrap();
    assert_eq!(session.round(), Round::CarriedOver);
    assert_eq!(session.pool().len(), 3);
    assert!(session.unsold().is_empty());
    assert_eq!(second.phase(), Phase::RoundActive);
}

#[tokio::test]
async fn test_end_clears_local_but_keeps_remote() {
    let server = MockServer::start();
    let save_mock = server.mock(|when, then| {
        when.method(POST).path("/save-state");
        then.status(200);
    });
    let delete_mock = server.mock(|when, then| {
        when.method(DELETE);
        then.status(200);
    });

    let store = MemoryStore::new();
    let reconciler = PersistenceReconciler::new(store.clone())
        .with_remote(remote_worker(&server, Duration::from_secs(2)));
    let mut auction = AuctionController::new(rules(), reconciler);

    auction.start_fresh(&catalog(), &team_names()).await.unwrap();
    for _ in 0..3 {
        auction.draw(0).await.unwrap();
        auction.resolve_unsold().await.unwrap();
    }
    auction.end().await.unwrap();

    assert_eq!(auction.phase(), Phase::Ended);
    assert!(store.load(STATE_KEY).await.unwrap().is_none());
    auction.shutdown().await;

    assert!(save_mock.hits() >= 1);
    assert_eq!(delete_mock.hits(), 0);
}

#[tokio::test]
async fn test_round_report_written_to_csv() {
    let temp_dir = TempDir::new().unwrap();
    let mut auction = AuctionController::new(rules(), PersistenceReconciler::new(MemoryStore::new()));
    auction.start_fresh(&catalog(), &team_names()).await.unwrap();

    auction.draw(0).await.unwrap();
    auction.select_team(TeamId(1)).await.unwrap();
    auction.resolve_sold().await.unwrap();
    for _ in 0..2 {
        auction.draw(0).await.unwrap();
        auction.resolve_unsold().await.unwrap();
    }

    let path = temp_dir.path().join("round.csv");
    auction.summary().unwrap().write_csv(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();

    assert!(content.starts_with("section,team,item_id,item_name,price,rating"));
    assert!(content.contains("roster,Reds,1,Ana,50,8.0"));
    let bo = content.find("unsold,,2,Bo").unwrap();
    let cy = content.find("unsold,,3,Cy").unwrap();
    assert!(bo < cy);
}

#[tokio::test]
async fn test_saved_state_missing_a_catalog_item_is_rejected() {
    let rules = rules();
    let session = Session::fresh(catalog().items().to_vec(), &team_names(), &rules);
    let mut snapshot = session.to_snapshot();
    snapshot.pool.pop();

    let store = MemoryStore::new();
    let document = StateDocument {
        session: snapshot,
        history: vec![],
    };
    store
        .save(STATE_KEY, &serde_json::to_string(&document).unwrap())
        .await
        .unwrap();

    let controller = AuctionController::new(rules, PersistenceReconciler::new(store));
    assert!(matches!(
        controller.load_on_startup(&catalog()).await.unwrap(),
        ResumeDecision::Fresh
    ));
}

#[tokio::test]
async fn test_remote_backup_from_another_catalog_is_rejected() {
    let rules = rules();
    let other_catalog = Catalog::new(vec![Item::new("1", "Ana"), Item::new("9", "Zed")]).unwrap();
    let remote_session = Session::fresh(other_catalog.items().to_vec(), &team_names(), &rules);

    let server = MockServer::start();
    let load_mock = server.mock(|when, then| {
        when.method(GET).path("/load-state");
        then.status(200).json_body(envelope_for(&remote_session));
    });

    let reconciler = PersistenceReconciler::new(MemoryStore::new())
        .with_remote(remote_worker(&server, Duration::from_secs(2)));
    let auction = AuctionController::new(rules, reconciler);

    let decision = auction.load_on_startup(&catalog()).await.unwrap();
    load_mock.assert();
    assert!(matches!(decision, ResumeDecision::Fresh));
    auction.shutdown().await;
}
