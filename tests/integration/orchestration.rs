//! Fetch orchestration through the public engine: coalescing, budget
//! gating, partial per-event failure, stale data and the concurrency bound.

use std::sync::Arc;
use std::time::Duration;

use sharpline::engine::budget::{BudgetThresholds, BudgetTier};
use sharpline::engine::orchestrator::{RefreshOutcome, SkipReason};
use sharpline::storage::MemoryHistoryStore;
use sharpline::types::DataKind;

use crate::mock_source::*;

fn history() -> Arc<MemoryHistoryStore> {
    Arc::new(MemoryHistoryStore::new())
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_coalesced_refresh_makes_one_call() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![ev_event("e1", 120.0, -140.0)]);
    let gate = source.gate_odds();
    let engine = Harness::default().build(Arc::clone(&source), history());

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.refresh(NBA, DataKind::Odds).await })
    };
    wait_until(|| source.calls("odds") == 1).await;
    assert_eq!(source.calls("odds"), 1);

    let second = engine.refresh(NBA, DataKind::Odds).await;
    assert!(matches!(second, RefreshOutcome::Skipped(SkipReason::InFlight)));

    gate.notify_one();
    let first = first.await.unwrap();
    assert!(first.is_updated());
    assert_eq!(source.calls("odds"), 1);
}

#[tokio::test]
async fn test_critical_budget_issues_no_calls() {
    let source = Arc::new(MockSource::new(9));
    source.set_odds(vec![ev_event("e1", 120.0, -140.0)]);
    source.add_props(props_event("e2", "LeBron James"));
    let engine = Harness::default().build(Arc::clone(&source), history());

    // Unknown balance allows the first call; it reports 8 left.
    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    assert_eq!(engine.budget().tier, BudgetTier::Critical);
    assert_eq!(engine.budget().remaining, Some(8));
    let paid = source.total_paid_calls();

    let outcomes = engine.force_refresh(NBA).await;
    for (kind, outcome) in &outcomes {
        if *kind == DataKind::AltLines {
            continue;
        }
        assert!(
            matches!(outcome, RefreshOutcome::Skipped(SkipReason::BudgetExhausted)),
            "{kind}: {outcome:?}"
        );
    }
    assert_eq!(source.total_paid_calls(), paid);
    assert_eq!(
        engine.budget().warning.as_deref(),
        Some("CREDITS CRITICAL - pausing API calls")
    );
}

#[tokio::test]
async fn test_low_budget_blocks_per_event_only() {
    let source = Arc::new(MockSource::new(26));
    source.set_odds(vec![ev_event("e1", 120.0, -140.0)]);
    source.add_props(props_event("e2", "LeBron James"));
    let engine = Harness::default().build(Arc::clone(&source), history());

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    assert_eq!(engine.budget().remaining, Some(25));

    let props = engine.refresh(NBA, DataKind::Props).await;
    assert!(matches!(props, RefreshOutcome::Skipped(SkipReason::BudgetExhausted)));
    assert_eq!(source.calls("event_odds"), 0);

    // Bulk calls still go through in this band.
    assert!(engine.refresh(NBA, DataKind::Scores).await.is_updated());
}

#[tokio::test]
async fn test_partial_props_failure_keeps_the_rest() {
    let source = Arc::new(MockSource::new(500));
    source.add_props(props_event("e1", "LeBron James"));
    source.add_props(props_event("e2", "Jayson Tatum"));
    source.add_props(props_event("e3", "Anthony Davis"));
    source.fail_event("e2");
    let engine = Harness::default().build(Arc::clone(&source), history());

    let outcome = engine.refresh(NBA, DataKind::Props).await;
    assert!(matches!(outcome, RefreshOutcome::Updated { records: 2, failed: 1 }));

    let snap = engine.snapshot(NBA).unwrap();
    let players: Vec<&str> = snap.props.iter().map(|p| p.player.as_str()).collect();
    assert_eq!(players.len(), 2);
    assert!(!players.contains(&"Jayson Tatum"));
}

#[tokio::test]
async fn test_every_props_call_failing_is_a_failure() {
    let source = Arc::new(MockSource::new(500));
    source.add_props(props_event("e1", "LeBron James"));
    source.fail_event("e1");
    let engine = Harness::default().build(Arc::clone(&source), history());

    let outcome = engine.refresh(NBA, DataKind::Props).await;
    assert!(matches!(outcome, RefreshOutcome::Failed(_)));
    assert!(engine.snapshot(NBA).is_none());
}

#[tokio::test]
async fn test_failure_keeps_stale_data() {
    let source = Arc::new(MockSource::new(500));
    source.set_odds(vec![ev_event("e1", 120.0, -140.0)]);
    let engine = Harness::default().build(Arc::clone(&source), history());

    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
    let before = engine.snapshot(NBA).unwrap();
    let remaining = engine.budget().remaining;

    source.set_error(503);
    let outcomes = engine.force_refresh(NBA).await;
    let odds = outcomes.iter().find(|(k, _)| *k == DataKind::Odds).unwrap();
    assert!(matches!(odds.1, RefreshOutcome::Failed(_)));

    // The published board and the credit count are untouched.
    let after = engine.snapshot(NBA).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.games.len(), 1);
    assert_eq!(engine.budget().remaining, remaining);

    // The next natural tick recovers.
    source.clear_error();
    assert!(engine.refresh(NBA, DataKind::Odds).await.is_updated());
}

#[tokio::test]
async fn test_props_concurrency_bounded() {
    let source = Arc::new(MockSource::new(500));
    for i in 0..8 {
        source.add_props(props_event(&format!("e{i}"), &format!("Player {i}")));
    }
    source.set_per_event_delay(Duration::from_millis(20));
    let engine = Harness {
        max_concurrent: 3,
        ..Harness::default()
    }
    .build(Arc::clone(&source), history());

    let outcome = engine.refresh(NBA, DataKind::Props).await;
    assert!(matches!(outcome, RefreshOutcome::Updated { records: 8, failed: 0 }));
    assert_eq!(source.calls("event_odds"), 8);
    assert!(source.peak_concurrency() <= 3);
    assert!(source.peak_concurrency() >= 1);
}

#[tokio::test]
async fn test_started_events_are_not_fetched_for_props() {
    let source = Arc::new(MockSource::new(500));
    source.add_props(props_event("upcoming", "LeBron James"));
    let mut live = props_event("live", "Jayson Tatum");
    live.commence_time = starts_in(-1);
    source.add_props(live);
    let engine = Harness::default().build(Arc::clone(&source), history());

    assert!(engine.refresh(NBA, DataKind::Props).await.is_updated());
    assert_eq!(source.calls("event_odds"), 1);
}

#[tokio::test]
async fn test_disabled_props_make_no_calls() {
    let source = Arc::new(MockSource::new(500));
    source.add_props(props_event("e1", "LeBron James"));
    let engine = Harness {
        props_enabled: false,
        ..Harness::default()
    }
    .build(Arc::clone(&source), history());

    let outcome = engine.refresh(NBA, DataKind::Props).await;
    assert!(matches!(outcome, RefreshOutcome::Skipped(SkipReason::Disabled)));
    assert_eq!(source.calls("events"), 0);
}

#[tokio::test]
async fn test_sports_list_loaded_once() {
    let source = Arc::new(MockSource::new(500));
    let engine = Harness {
        thresholds: BudgetThresholds { low: 100, critical: 20 },
        ..Harness::default()
    }
    .build(Arc::clone(&source), history());

    assert_eq!(engine.load_sports().await, vec![NBA.to_string()]);
    assert_eq!(engine.load_sports().await, vec![NBA.to_string()]);
    assert_eq!(source.calls("sports"), 1);

    // The free endpoint reports no credits, so the balance stays unknown.
    assert_eq!(engine.budget().status, "Credits: --");
    assert_eq!(engine.budget().tier, BudgetTier::Normal);
}
