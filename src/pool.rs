//! The bounded candidate pool.
//!
//! Holds at most `capacity` candidates ranked by priority score. Owns
//! the three retention decisions: merge-in-place on re-flag, TTL sweep
//! of stale entries, and priority-based eviction when full. The pool is
//! the only resource shared between the scan producer and readers; all
//! access goes through one mutex wrapping the whole structure, and
//! every critical section is O(pool), never O(universe).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::types::{Candidate, CandidateRecord, CapitalFlow, Category};

/// Handle shared between the scan loop and consumers.
pub type SharedPool = Arc<Mutex<CandidatePool>>;

/// Bounded, priority-ranked candidate store.
#[derive(Debug)]
pub struct CandidatePool {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, CandidateRecord>,
    /// Upserts rejected because the pool was full, since `begin_cycle`.
    capacity_rejections: u64,
    /// Malformed candidates rejected at the boundary, since `begin_cycle`.
    validation_rejections: u64,
}

impl CandidatePool {
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            capacity,
            ttl: Duration::seconds(ttl_secs as i64),
            entries: HashMap::with_capacity(capacity),
            capacity_rejections: 0,
            validation_rejections: 0,
        }
    }

    /// Wrap a fresh pool in the shared handle.
    pub fn shared(capacity: usize, ttl_secs: u64) -> SharedPool {
        Arc::new(Mutex::new(Self::new(capacity, ttl_secs)))
    }

    // -- Cycle bookkeeping -------------------------------------------------

    /// Reset the per-cycle rejection counters. Called by the scan loop
    /// at the start of the pool-update phase.
    pub fn begin_cycle(&mut self) {
        self.capacity_rejections = 0;
        self.validation_rejections = 0;
    }

    pub fn capacity_rejections(&self) -> u64 {
        self.capacity_rejections
    }

    pub fn validation_rejections(&self) -> u64 {
        self.validation_rejections
    }

    // -- Core operations ---------------------------------------------------

    /// Insert or refresh a candidate. Returns `true` if the candidate is
    /// in the pool afterwards.
    ///
    /// - existing id: merge fields, preserve `added_at`, advance
    ///   `last_updated_at`, adopt the recomputed score
    /// - pool not full: insert as unclassified
    /// - pool full: evict the minimum-priority entry only if the new
    ///   candidate's score is strictly greater, else reject unchanged
    ///
    /// Malformed candidates are counted and rejected. Never panics.
    pub fn upsert(
        &mut self,
        candidate: &Candidate,
        priority_score: f64,
        now: DateTime<Utc>,
    ) -> bool {
        if let Err(e) = candidate.validate() {
            self.validation_rejections += 1;
            warn!(error = %e, "Rejected malformed candidate");
            return false;
        }

        if let Some(existing) = self.entries.get_mut(&candidate.instrument_id) {
            existing.refresh(candidate, priority_score, now);
            return true;
        }

        if self.entries.len() < self.capacity {
            self.entries.insert(
                candidate.instrument_id.clone(),
                CandidateRecord::new(candidate, priority_score, now),
            );
            return true;
        }

        // Full pool: displace the weakest entry or reject.
        match self.eviction_victim() {
            Some(victim_id) if priority_score > self.entries[&victim_id].priority_score => {
                let evicted = self.entries.remove(&victim_id);
                if let Some(evicted) = evicted {
                    debug!(
                        evicted = %evicted.instrument_id,
                        evicted_score = evicted.priority_score,
                        inserted = %candidate.instrument_id,
                        inserted_score = priority_score,
                        "Pool full — evicted minimum-priority candidate"
                    );
                }
                self.entries.insert(
                    candidate.instrument_id.clone(),
                    CandidateRecord::new(candidate, priority_score, now),
                );
                true
            }
            _ => {
                self.capacity_rejections += 1;
                false
            }
        }
    }

    /// Remove every entry idle longer than the TTL. Returns the number
    /// of entries removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, rec| now - rec.last_updated_at <= ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "TTL sweep");
        }
        removed
    }

    /// Immutable point-in-time copy of the pool, ordered by descending
    /// priority. Callers never see live references, so a snapshot can
    /// outlive the lock without observing later mutations.
    pub fn snapshot(&self) -> Vec<CandidateRecord> {
        let mut records: Vec<CandidateRecord> = self.entries.values().cloned().collect();
        records.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        records
    }

    // -- Analysis write-backs ----------------------------------------------

    /// Attach Level2 enrichment. Returns `false` if the candidate left
    /// the pool while analysis was running (evicted or swept).
    pub fn apply_enrichment(&mut self, instrument_id: &str, flow: CapitalFlow) -> bool {
        match self.entries.get_mut(instrument_id) {
            Some(rec) => {
                rec.enrichment = Some(flow);
                true
            }
            None => false,
        }
    }

    /// Record the Level3 verdict. This is the only path that writes
    /// `category`.
    pub fn apply_assessment(
        &mut self,
        instrument_id: &str,
        category: Category,
        risk_score: f64,
        reasons: Vec<String>,
    ) -> bool {
        match self.entries.get_mut(instrument_id) {
            Some(rec) => {
                rec.category = category;
                rec.risk_score = Some(risk_score.clamp(0.0, 1.0));
                rec.reasons = reasons;
                true
            }
            None => false,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, instrument_id: &str) -> bool {
        self.entries.contains_key(instrument_id)
    }

    pub fn get(&self, instrument_id: &str) -> Option<&CandidateRecord> {
        self.entries.get(instrument_id)
    }

    // -- Internal ------------------------------------------------------------

    /// The entry that would be evicted: minimum priority, and among
    /// equals the one idle the longest.
    fn eviction_victim(&self) -> Option<String> {
        self.entries
            .values()
            .min_by(|a, b| {
                a.priority_score
                    .partial_cmp(&b.priority_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.last_updated_at.cmp(&b.last_updated_at))
            })
            .map(|rec| rec.instrument_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
