//! Level1 screen — the coarse, market-wide anomaly filter.
//!
//! Reduces the full universe snapshot to a small set of lightweight
//! candidates using cheap numeric thresholds. This stage is pure and
//! stateless: thresholds and the volume baseline are inputs, never
//! internal state, so identical inputs always produce identical output.

use std::collections::HashMap;
use tracing::debug;

use crate::scoring::VolumeBaseline;
use crate::types::{Candidate, Quote};

/// Phase-dependent Level1 thresholds (selected in `session`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum absolute price change, in percent.
    pub min_abs_change_pct: f64,
    /// Minimum turnover amount, in currency units.
    pub min_turnover_amount: f64,
}

/// Screen the universe snapshot down to anomaly candidates.
///
/// An empty or missing upstream snapshot yields an empty result; this
/// function never fails. Quotes with an unusable prior close screen to
/// 0% change and therefore drop out on the change threshold.
pub fn screen(
    snapshot: &HashMap<String, Quote>,
    thresholds: &Thresholds,
    baseline: &VolumeBaseline,
) -> Vec<Candidate> {
    let mut hits = Vec::new();

    for (instrument_id, quote) in snapshot {
        let change_pct = quote.change_pct();
        if change_pct.abs() < thresholds.min_abs_change_pct {
            continue;
        }
        if quote.turnover_amount < thresholds.min_turnover_amount {
            continue;
        }

        hits.push(Candidate {
            instrument_id: instrument_id.clone(),
            display_name: quote.display_name.clone(),
            last_price: quote.last_price,
            change_pct,
            volume: quote.volume,
            turnover_amount: quote.turnover_amount,
            volume_ratio: baseline.ratio(instrument_id, quote.volume),
        });
    }

    debug!(
        universe = snapshot.len(),
        hits = hits.len(),
        min_change = thresholds.min_abs_change_pct,
        min_turnover = thresholds.min_turnover_amount,
        "Level1 screen complete"
    );

    hits
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
