//! Two-leg stake plans.
//!
//! Leg A is fixed at the reference stake; leg B is sized so that either leg
//! winning alone returns the same payout. Amounts are money, so they are
//! held as `Decimal` and rounded to cents.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

pub const REFERENCE_STAKE: Decimal = dec!(100);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StakePlan {
    pub stake_a: Decimal,
    pub stake_b: Decimal,
    pub total_stake: Decimal,
    /// Return when leg A alone wins (equal to leg B alone, up to rounding).
    pub payout: Decimal,
    /// Return when both legs win.
    pub both_win_payout: Decimal,
}

impl StakePlan {
    /// Size both legs from their decimal odds.
    pub fn equal_payout(decimal_a: f64, decimal_b: f64) -> Option<Self> {
        let da = Decimal::from_f64(decimal_a)?;
        let db = Decimal::from_f64(decimal_b)?;
        if da <= Decimal::ONE || db <= Decimal::ONE {
            return None;
        }

        let stake_a = REFERENCE_STAKE;
        let stake_b = (stake_a * da / db).round_dp(2);
        let payout = (stake_a * da).round_dp(2);
        let both_win_payout = (payout + stake_b * db).round_dp(2);

        Some(Self {
            stake_a,
            stake_b,
            total_stake: stake_a + stake_b,
            payout,
            both_win_payout,
        })
    }

    /// Profit when exactly one leg wins. Positive only for an arbitrage.
    pub fn single_win_profit(&self) -> Decimal {
        self.payout - self.total_stake
    }

    /// Profit when both legs win (a middle hitting).
    pub fn both_win_profit(&self) -> Decimal {
        self.both_win_payout - self.total_stake
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
