//! Consumption budget.
//!
//! Tracks the upstream credit counters and decides which fetch classes may
//! go out. The budget never estimates spend ahead of time: it only moves
//! when a response reports new counters.
//!
//! Tiers over remaining credits `r`:
//! - NORMAL:   r > low
//! - LOW:      critical < r <= low (everything still allowed, warn)
//! - CRITICAL: r <= critical (no upstream calls at all)
//!
//! Per-event kinds (props, alt lines) cost several credits per refresh and
//! are cut off earlier, once r <= 3 x critical.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::data::CreditReport;
use crate::types::DataKind;

/// Multiple of the critical threshold below which per-event fetches stop.
const PER_EVENT_GUARD_MULTIPLIER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Normal,
    Low,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetThresholds {
    pub low: u32,
    pub critical: u32,
}

impl Default for BudgetThresholds {
    fn default() -> Self {
        Self { low: 50, critical: 10 }
    }
}

impl BudgetThresholds {
    pub fn tier(&self, remaining: Option<u32>) -> BudgetTier {
        match remaining {
            Some(r) if r <= self.critical => BudgetTier::Critical,
            Some(r) if r <= self.low => BudgetTier::Low,
            _ => BudgetTier::Normal,
        }
    }
}

/// Point-in-time view for the query surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    pub remaining: Option<u32>,
    pub used: Option<u32>,
    pub tier: BudgetTier,
    pub status: String,
    pub warning: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    remaining: Option<u32>,
    used: Option<u32>,
}

pub struct ConsumptionBudget {
    thresholds: BudgetThresholds,
    counters: Mutex<Counters>,
}

impl ConsumptionBudget {
    pub fn new(thresholds: BudgetThresholds) -> Self {
        Self {
            thresholds,
            counters: Mutex::new(Counters::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply the counters from one upstream response.
    ///
    /// Responses can land out of order, so `remaining` only ever goes down
    /// and `used` only ever goes up. A report whose `used` is below the
    /// recorded value means the quota period rolled over; that report is
    /// taken as-is.
    pub fn record(&self, report: CreditReport) {
        if report.is_empty() {
            return;
        }

        let mut counters = self.lock();
        let before = self.thresholds.tier(counters.remaining);

        let rollover = matches!(
            (report.used, counters.used),
            (Some(new), Some(old)) if new < old
        );

        if rollover {
            info!(
                remaining = ?report.remaining,
                used = ?report.used,
                "Credit quota rolled over"
            );
            counters.remaining = report.remaining.or(counters.remaining);
            counters.used = report.used;
        } else {
            counters.remaining = match (counters.remaining, report.remaining) {
                (Some(old), Some(new)) => Some(old.min(new)),
                (old, new) => new.or(old),
            };
            counters.used = match (counters.used, report.used) {
                (Some(old), Some(new)) => Some(old.max(new)),
                (old, new) => new.or(old),
            };
        }

        let after = self.thresholds.tier(counters.remaining);
        if after != before {
            match after {
                BudgetTier::Critical => warn!(
                    remaining = ?counters.remaining,
                    "Credits critical, pausing upstream calls"
                ),
                BudgetTier::Low => warn!(remaining = ?counters.remaining, "Credits low"),
                BudgetTier::Normal => info!(remaining = ?counters.remaining, "Credits back to normal"),
            }
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.lock().remaining
    }

    pub fn used(&self) -> Option<u32> {
        self.lock().used
    }

    pub fn tier(&self) -> BudgetTier {
        self.thresholds.tier(self.remaining())
    }

    /// Whether an upstream call for `kind` may be issued right now.
    /// Unknown remaining credits (nothing reported yet) allow everything.
    pub fn can_fetch(&self, kind: DataKind) -> bool {
        let Some(r) = self.remaining() else {
            return true;
        };
        if r <= self.thresholds.critical {
            return false;
        }
        if kind.is_per_event() {
            return r > self.thresholds.critical.saturating_mul(PER_EVENT_GUARD_MULTIPLIER);
        }
        true
    }

    pub fn status_text(&self) -> String {
        match self.remaining() {
            Some(r) => format!("Credits: {r}"),
            None => "Credits: --".to_string(),
        }
    }

    pub fn warning_text(&self) -> Option<String> {
        match self.tier() {
            BudgetTier::Critical => Some("CREDITS CRITICAL - pausing API calls".to_string()),
            BudgetTier::Low => Some("Credits low".to_string()),
            BudgetTier::Normal => None,
        }
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let (remaining, used) = {
            let c = self.lock();
            (c.remaining, c.used)
        };
        BudgetSnapshot {
            remaining,
            used,
            tier: self.thresholds.tier(remaining),
            status: self.status_text(),
            warning: self.warning_text(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
