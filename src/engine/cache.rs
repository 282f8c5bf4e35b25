//! Freshness cache.
//!
//! Short-TTL in-memory store keyed by (sport, data kind). A fresh entry
//! means the orchestrator skips the upstream call; an expired entry is a
//! miss for scheduling purposes but stays readable through `last_known`
//! so a failed refresh never blanks out the board.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::types::{DataKind, Event, Score};

// ---------------------------------------------------------------------------
// Keys and payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub sport: String,
    pub kind: DataKind,
}

impl CacheKey {
    pub fn new(sport: &str, kind: DataKind) -> Self {
        Self {
            sport: sport.to_string(),
            kind,
        }
    }
}

/// Cached fetch result. Shared, never copied.
#[derive(Debug, Clone)]
pub enum Payload {
    Events(Arc<Vec<Event>>),
    Scores(Arc<Vec<Score>>),
}

impl Payload {
    pub fn events(&self) -> Option<Arc<Vec<Event>>> {
        match self {
            Payload::Events(events) => Some(Arc::clone(events)),
            Payload::Scores(_) => None,
        }
    }

    pub fn scores(&self) -> Option<Arc<Vec<Score>>> {
        match self {
            Payload::Scores(scores) => Some(Arc::clone(scores)),
            Payload::Events(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Events(events) => events.len(),
            Payload::Scores(scores) => scores.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CacheEntry {
    payload: Payload,
    fetched_at: Instant,
    ttl: Duration,
    /// Set by `invalidate`. The payload stays readable until replaced.
    expired: bool,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        !self.expired && now.saturating_duration_since(self.fetched_at) <= self.ttl
    }
}

/// TTL per data kind. Kept a little under the kind's refresh interval so
/// each scheduled tick finds the previous entry expired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtls {
    pub odds: Duration,
    pub scores: Duration,
    pub props: Duration,
    pub alt_lines: Duration,
}

impl CacheTtls {
    pub fn for_kind(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Odds => self.odds,
            DataKind::Scores => self.scores,
            DataKind::Props => self.props,
            DataKind::AltLines => self.alt_lines,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            odds: Duration::from_secs(300),
            scores: Duration::from_secs(120),
            props: Duration::from_secs(300),
            alt_lines: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct FreshnessCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttls: CacheTtls,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FreshnessCache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttls,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh payload, or `None` once the entry's age exceeds its TTL.
    pub fn get(&self, sport: &str, kind: DataKind) -> Option<Payload> {
        self.get_at(sport, kind, Instant::now())
    }

    pub fn get_at(&self, sport: &str, kind: DataKind, now: Instant) -> Option<Payload> {
        let fresh = self
            .read()
            .get(&CacheKey::new(sport, kind))
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone());

        let counter = if fresh.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        fresh
    }

    /// Latest payload regardless of age. Used for reads, not scheduling.
    pub fn last_known(&self, sport: &str, kind: DataKind) -> Option<Payload> {
        self.read()
            .get(&CacheKey::new(sport, kind))
            .map(|entry| entry.payload.clone())
    }

    pub fn put(&self, sport: &str, kind: DataKind, payload: Payload) {
        self.put_at(sport, kind, payload, Instant::now());
    }

    pub fn put_at(&self, sport: &str, kind: DataKind, payload: Payload, now: Instant) {
        self.write().insert(
            CacheKey::new(sport, kind),
            CacheEntry {
                payload,
                fetched_at: now,
                ttl: self.ttls.for_kind(kind),
                expired: false,
            },
        );
    }

    /// Expire every entry for a sport. `get` misses until the next `put`;
    /// `last_known` keeps serving the old payload. Returns how many expired.
    pub fn invalidate(&self, sport: &str) -> usize {
        let mut expired = 0;
        for (key, entry) in self.write().iter_mut() {
            if key.sport == sport {
                entry.expired = true;
                expired += 1;
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
