//! End-to-end: mock feed -> cache -> merge -> price -> board -> history.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use sharpline::pricing::consensus::MarketKind;
use sharpline::storage::{HistoryStore, MemoryHistoryStore, SqliteHistoryStore};
use sharpline::types::*;

use crate::mock_source::*;

#[tokio::test]
async fn test_ev_found_against_sharp_consensus() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![ev_event("e1", 120.0, -140.0)]);
    let history = Arc::new(MemoryHistoryStore::new());
    let engine = Harness::default().build(Arc::clone(&source), history.clone());

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    let snap = engine.snapshot(NBA).unwrap();
    let bets = snap.ev_bets();

    // Every book feeds the average, the soft one included.
    let lakers = (3.0 * 110.0 / 210.0 + 100.0 / 220.0) / 4.0;
    let celtics = (3.0 * 110.0 / 210.0 + 140.0 / 240.0) / 4.0;
    let fair = lakers / (lakers + celtics);

    let best = &bets[0];
    assert_eq!(best.book, "soft");
    assert_eq!(best.outcome, "Lakers");
    assert!((best.fair_probability - fair).abs() < 1e-9);
    assert!((best.ev_percent - (fair * 2.2 - 1.0) * 100.0).abs() < 1e-6);
    assert_eq!(best.books, 4);
    assert!(bets.iter().all(|b| b.book == "soft"));

    let recorded = history.recent(Utc::now() - Duration::minutes(5)).await.unwrap();
    assert_eq!(recorded.len(), bets.len());
    assert!(recorded.iter().all(|r| !r.is_prop));
}

#[tokio::test]
async fn test_too_few_books_means_no_ev() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![event(
        "e1",
        "Lakers",
        "Celtics",
        starts_in(3),
        vec![
            h2h_book("sharp1", ("Lakers", -110.0), ("Celtics", -110.0)),
            h2h_book("soft", ("Lakers", 150.0), ("Celtics", -170.0)),
        ],
    )]);
    let engine = Harness::default().build(Arc::clone(&source), Arc::new(MemoryHistoryStore::new()));

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    let snap = engine.snapshot(NBA).unwrap();
    assert_eq!(snap.games.len(), 1);
    assert!(snap.game_opportunities.ev.is_empty());
}

#[tokio::test]
async fn test_arb_between_two_books() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![event(
        "e1",
        "Lakers",
        "Celtics",
        starts_in(3),
        vec![
            h2h_book("a", ("Lakers", 110.0), ("Celtics", -130.0)),
            h2h_book("b", ("Lakers", -130.0), ("Celtics", 110.0)),
        ],
    )]);
    let engine = Harness::default().build(Arc::clone(&source), Arc::new(MemoryHistoryStore::new()));

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    let snap = engine.snapshot(NBA).unwrap();
    let arbs = &snap.game_opportunities.arbs;
    assert_eq!(arbs.len(), 1);
    let arb = &arbs[0];
    assert_ne!(arb.leg_a.book, arb.leg_b.book);
    assert!(arb.combined_probability < 1.0);
    assert!(arb.profit_percent > 0.1);
}

#[tokio::test]
async fn test_totals_middle_surfaced() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![event(
        "e1",
        "Lakers",
        "Celtics",
        starts_in(3),
        vec![
            book(
                "a",
                vec![(
                    "totals",
                    vec![quote("Over", -110.0, Some(220.5)), quote("Under", -110.0, Some(220.5))],
                )],
            ),
            book(
                "b",
                vec![(
                    "totals",
                    vec![quote("Over", -110.0, Some(222.5)), quote("Under", -110.0, Some(222.5))],
                )],
            ),
        ],
    )]);
    let engine = Harness::default().build(Arc::clone(&source), Arc::new(MemoryHistoryStore::new()));

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    let snap = engine.snapshot(NBA).unwrap();
    let middles = &snap.game_opportunities.middles;
    assert_eq!(middles.len(), 1);

    let m = &middles[0];
    assert_eq!(m.kind, MarketKind::Total);
    assert_eq!(m.leg_a.book, "a");
    assert_eq!(m.leg_a.point, Some(220.5));
    assert_eq!(m.leg_b.book, "b");
    assert_eq!(m.leg_b.point, Some(222.5));
    assert!((m.window - 2.0).abs() < 1e-9);
    assert!(m.combined_cost <= 1.08);
    assert!(m.hit_probability > 0.0 && m.hit_probability < 1.0);
}

#[tokio::test]
async fn test_middle_disabled_finds_nothing() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![event(
        "e1",
        "Lakers",
        "Celtics",
        starts_in(3),
        vec![
            book("a", vec![("totals", vec![quote("Over", -110.0, Some(220.5))])]),
            book("b", vec![("totals", vec![quote("Under", -110.0, Some(222.5))])]),
        ],
    )]);
    let mut harness = Harness::default();
    harness.pricing.middle_enabled = false;
    let engine = harness.build(Arc::clone(&source), Arc::new(MemoryHistoryStore::new()));

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    assert!(engine.snapshot(NBA).unwrap().game_opportunities.middles.is_empty());
}

#[tokio::test]
async fn test_dfs_override_drives_prop_pricing() {
    let source = Arc::new(MockSource::new(500));
    let player = "LeBron James";
    let sharp = |key: &str| {
        book(
            key,
            vec![(
                "player_points",
                vec![
                    player_quote("Over", player, -200.0, 25.5),
                    player_quote("Under", player, 170.0, 25.5),
                ],
            )],
        )
    };
    let dfs = book(
        "prizepicks",
        vec![(
            "player_points",
            vec![
                player_quote("Over", player, -120.0, 25.5),
                player_quote("Under", player, -120.0, 25.5),
            ],
        )],
    );
    source.add_props(event(
        "e1",
        "Lakers",
        "Celtics",
        starts_in(4),
        vec![sharp("sharp1"), sharp("sharp2"), sharp("sharp3"), dfs],
    ));

    let history = Arc::new(MemoryHistoryStore::new());
    let engine = Harness {
        overrides: HashMap::from([("prizepicks".to_string(), -137.0)]),
        ..Harness::default()
    }
    .build(Arc::clone(&source), history.clone());

    assert!(engine.refresh(NBA, DataKind::Props).await.is_updated());
    let snap = engine.snapshot(NBA).unwrap();

    // The merged row carries only the configured price for the DFS book.
    let row = &snap.props[0];
    assert_eq!(row.player, player);
    assert_eq!(row.over["prizepicks"].price, -137.0);
    assert_eq!(row.under["prizepicks"].price, -137.0);

    let ev = &snap.prop_opportunities.ev;
    let over = ev
        .iter()
        .find(|b| b.book == "prizepicks" && b.outcome == "Over")
        .expect("DFS over is +EV at -137");
    assert_eq!(over.price, -137.0);
    assert_eq!(over.player.as_deref(), Some(player));
    // The DFS book never counts toward consensus.
    assert_eq!(over.books, 3);
    assert!(ev.iter().all(|b| b.book != "prizepicks" || b.price == -137.0));

    let recorded = history.recent(Utc::now() - Duration::minutes(5)).await.unwrap();
    assert!(recorded.iter().any(|r| r.is_prop && r.bet.book == "prizepicks"));
}

#[tokio::test]
async fn test_live_game_is_not_priced() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![ev_event("e1", 120.0, -140.0)]);
    source.set_scores(vec![Score {
        id: "e1".into(),
        sport_key: NBA.into(),
        sport_title: "NBA".into(),
        commence_time: starts_in(3),
        home_team: "Lakers".into(),
        away_team: "Celtics".into(),
        completed: false,
        last_update: None,
        scores: Some(vec![
            ScoreValue { name: "Lakers".into(), score: Some("12".into()) },
            ScoreValue { name: "Celtics".into(), score: Some("9".into()) },
        ]),
    }]);
    let engine = Harness::default().build(Arc::clone(&source), Arc::new(MemoryHistoryStore::new()));

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    assert!(!engine.snapshot(NBA).unwrap().game_opportunities.ev.is_empty());

    assert!(engine.refresh(NBA, DataKind::Scores).await.is_updated());
    let snap = engine.snapshot(NBA).unwrap();
    let game = &snap.games[0];
    assert!(!game.pre_game);
    assert_eq!(game.home_score.as_deref(), Some("12"));
    assert!(snap.game_opportunities.is_empty());
}

#[tokio::test]
async fn test_history_survives_in_sqlite() {
    let store: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::connect("sqlite::memory:").await.unwrap());
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![ev_event("e1", 120.0, -140.0)]);
    let engine = Harness::default().build(Arc::clone(&source), Arc::clone(&store));

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    let rows = store.recent(Utc::now() - Duration::minutes(5)).await.unwrap();
    assert!(!rows.is_empty());
    assert_eq!(rows[0].bet.book, "soft");

    // A second publish from the same cache appends again; nothing is deduplicated.
    engine.rebuild(NBA, DataKind::Odds).await;
    let again = store.recent(Utc::now() - Duration::minutes(5)).await.unwrap();
    assert_eq!(again.len(), rows.len() * 2);
}
