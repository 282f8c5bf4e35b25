//! Published per-sport snapshots.
//!
//! The query surface only ever reads whole snapshots. A rebuild swaps the
//! `Arc` in one step, so readers see either the old board or the new one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::pricing::ev::EvBet;
use crate::pricing::Opportunities;
use crate::types::{GameRow, PropRow};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SportSnapshot {
    pub sport: String,
    pub games: Vec<GameRow>,
    pub props: Vec<PropRow>,
    pub game_opportunities: Opportunities,
    pub prop_opportunities: Opportunities,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SportSnapshot {
    /// Game and prop +EV bets together, best first.
    pub fn ev_bets(&self) -> Vec<EvBet> {
        let mut bets: Vec<EvBet> = self
            .game_opportunities
            .ev
            .iter()
            .chain(self.prop_opportunities.ev.iter())
            .cloned()
            .collect();
        bets.sort_by(|a, b| b.ev_percent.total_cmp(&a.ev_percent));
        bets
    }
}

#[derive(Default)]
pub struct Board {
    sports: RwLock<HashMap<String, Arc<SportSnapshot>>>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sport: &str) -> Option<Arc<SportSnapshot>> {
        self.sports
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(sport)
            .cloned()
    }

    pub fn publish(&self, snapshot: SportSnapshot) {
        self.sports
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(snapshot.sport.clone(), Arc::new(snapshot));
    }

    pub fn sports(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .sports
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}
