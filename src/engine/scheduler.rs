//! Refresh scheduler.
//!
//! One interval loop per data kind, each ticking independently and fanning
//! the refresh out over every active sport. A channel accepts on-demand
//! force refreshes from the query surface. Overlapping ticks are safe: the
//! orchestrator coalesces a refresh that is already in flight.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::cache::CacheTtls;
use super::orchestrator::RefreshOutcome;
use super::MarketEngine;
use crate::types::DataKind;

const TRIGGER_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct RefreshIntervals {
    pub odds: Duration,
    pub scores: Duration,
    pub props: Duration,
    pub alt_lines: Duration,
}

impl RefreshIntervals {
    pub fn for_kind(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Odds => self.odds,
            DataKind::Scores => self.scores,
            DataKind::Props => self.props,
            DataKind::AltLines => self.alt_lines,
        }
    }

    /// Cache TTLs for these intervals. Each TTL is 90% of its interval, so
    /// an entry stamped at the start of one tick has expired by the next
    /// even when that tick fires a little early.
    pub fn cache_ttls(&self) -> CacheTtls {
        let ttl = |interval: Duration| interval - interval / 10;
        CacheTtls {
            odds: ttl(self.odds),
            scores: ttl(self.scores),
            props: ttl(self.props),
            alt_lines: ttl(self.alt_lines),
        }
    }
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            odds: Duration::from_secs(300),
            scores: Duration::from_secs(120),
            props: Duration::from_secs(300),
            alt_lines: Duration::from_secs(300),
        }
    }
}

/// Cloneable sender for force-refresh requests.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<String>,
}

impl RefreshTrigger {
    /// Queue a force refresh. Returns false when the queue is full or the
    /// scheduler has stopped.
    pub fn request(&self, sport: &str) -> bool {
        match self.tx.try_send(sport.to_string()) {
            Ok(()) => true,
            Err(e) => {
                warn!(sport, error = %e, "Force refresh not queued");
                false
            }
        }
    }
}

pub struct SchedulerHandle {
    trigger: RefreshTrigger,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    /// Stop every loop. Refreshes already spawned run to completion.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(loops = self.tasks.len(), "Scheduler stopped");
    }
}

/// Start the refresh loops on the current runtime.
pub fn spawn(engine: Arc<MarketEngine>, intervals: RefreshIntervals) -> SchedulerHandle {
    let (tx, rx) = mpsc::channel(TRIGGER_BUFFER);

    let mut tasks: Vec<JoinHandle<()>> = DataKind::ALL
        .iter()
        .map(|&kind| {
            let engine = Arc::clone(&engine);
            let period = intervals.for_kind(kind);
            tokio::spawn(run_kind(engine, kind, period))
        })
        .collect();
    tasks.push(tokio::spawn(run_triggers(engine, rx)));

    info!(
        odds_secs = intervals.odds.as_secs(),
        scores_secs = intervals.scores.as_secs(),
        props_secs = intervals.props.as_secs(),
        "Scheduler started"
    );

    SchedulerHandle {
        trigger: RefreshTrigger { tx },
        tasks,
    }
}

async fn run_kind(engine: Arc<MarketEngine>, kind: DataKind, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        for sport in engine.sports() {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let outcome = engine.refresh(&sport, kind).await;
                log_outcome(&sport, kind, &outcome);
            });
        }
    }
}

async fn run_triggers(engine: Arc<MarketEngine>, mut rx: mpsc::Receiver<String>) {
    while let Some(sport) = rx.recv().await {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            for (kind, outcome) in engine.force_refresh(&sport).await {
                log_outcome(&sport, kind, &outcome);
            }
        });
    }
}

fn log_outcome(sport: &str, kind: DataKind, outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Updated { records, failed } => {
            info!(sport, %kind, records, failed, "Refresh complete")
        }
        RefreshOutcome::Skipped(reason) => debug!(sport, %kind, %reason, "Refresh skipped"),
        RefreshOutcome::Failed(e) => warn!(sport, %kind, error = %e, "Refresh failed"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
