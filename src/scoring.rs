//! Priority scoring — the single scalar that ranks candidates for
//! retention and eviction.
//!
//! The score is a weighted sum of three independently clamped
//! sub-scores (price-change magnitude, volume ratio, turnover amount),
//! mapped to [0, 100]. It is fully deterministic: identical inputs
//! always produce identical scores, which eviction decisions rely on.

use std::collections::HashMap;

use crate::config::ScoringConfig;
use crate::types::Candidate;

// ---------------------------------------------------------------------------
// Volume baseline
// ---------------------------------------------------------------------------

/// EWMA smoothing factor for the rolling volume baseline.
const BASELINE_ALPHA: f64 = 0.2;

/// Rolling per-instrument volume baseline, fed once per cycle from the
/// full universe snapshot. Owned by the scan loop; the screener only
/// reads it.
#[derive(Debug, Default)]
pub struct VolumeBaseline {
    averages: HashMap<String, f64>,
}

impl VolumeBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold today's observed volume into the rolling average.
    pub fn observe(&mut self, instrument_id: &str, volume: f64) {
        if !(volume > 0.0) {
            return;
        }
        self.averages
            .entry(instrument_id.to_string())
            .and_modify(|avg| *avg = *avg * (1.0 - BASELINE_ALPHA) + volume * BASELINE_ALPHA)
            .or_insert(volume);
    }

    /// Current volume relative to the baseline. Returns 1.0 for
    /// instruments with no history yet — the first observation is, by
    /// definition, in line with itself.
    pub fn ratio(&self, instrument_id: &str, volume: f64) -> f64 {
        match self.averages.get(instrument_id) {
            Some(avg) if *avg > 0.0 => volume / avg,
            _ => 1.0,
        }
    }

    pub fn len(&self) -> usize {
        self.averages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.averages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Priority scorer
// ---------------------------------------------------------------------------

/// Computes the ranking scalar for pool admission and eviction.
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    cfg: ScoringConfig,
}

impl PriorityScorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self { cfg }
    }

    /// Score a candidate into [0, 100].
    ///
    /// Each component saturates at its configured full-scale value, so
    /// one extreme field cannot dominate the other two.
    pub fn score(&self, candidate: &Candidate) -> f64 {
        let change_sub = clamp01(candidate.change_pct.abs() / self.cfg.change_full_scale_pct);
        let volume_sub = clamp01(candidate.volume_ratio / self.cfg.volume_ratio_full_scale);
        let turnover_sub = clamp01(candidate.turnover_amount / self.cfg.turnover_full_scale);

        let weighted = self.cfg.change_weight * change_sub
            + self.cfg.volume_weight * volume_sub
            + self.cfg.turnover_weight * turnover_sub;

        (weighted * 100.0).clamp(0.0, 100.0)
    }
}

fn clamp01(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
