//! Level3 classifier — risk classification of enriched candidates.
//!
//! Maps a candidate's raw movement plus its Level2 capital-flow fields
//! to a category, a risk score in [0, 1], and a list of reasons. Pure
//! and deterministic; runs only on pool members that enriched
//! successfully this cycle.

use crate::types::{CandidateRecord, CapitalFlow, Category};

/// Price-limit proximity threshold, in percent. A-share main boards cap
/// daily moves at ±10%; anything beyond 9.5% is effectively pinned.
const LIMIT_PROXIMITY_PCT: f64 = 9.5;

/// Volume ratio treated as a blow-off spike rather than healthy interest.
const VOLUME_SPIKE_RATIO: f64 = 8.0;

/// Risk above which a candidate is blacklisted outright.
const BLACKLIST_RISK: f64 = 0.7;

/// Risk below which an inflow-backed riser qualifies as an opportunity.
const OPPORTUNITY_MAX_RISK: f64 = 0.5;

/// Minimum inflow ratio for the opportunity call.
const OPPORTUNITY_MIN_INFLOW_RATIO: f64 = 0.1;

/// The Level3 verdict for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub category: Category,
    pub risk_score: f64,
    pub reasons: Vec<String>,
}

/// Classify an enriched candidate.
///
/// Risk accumulates from independent factors and is clamped to [0, 1]:
/// proximity to the daily price limit, blow-off volume, and divergence
/// between price direction and main-capital flow. The category then
/// follows from risk plus flow direction.
pub fn classify(record: &CandidateRecord, flow: &CapitalFlow) -> Assessment {
    let mut risk: f64 = 0.0;
    let mut reasons = Vec::new();

    // Base risk grows mildly with move size — large moves revert more.
    risk += (record.change_pct.abs() / 20.0).min(0.2);

    if record.change_pct.abs() >= LIMIT_PROXIMITY_PCT {
        risk += 0.3;
        reasons.push(format!(
            "move {:+.1}% pinned near daily limit",
            record.change_pct
        ));
    }

    if record.volume_ratio > VOLUME_SPIKE_RATIO {
        risk += 0.2;
        reasons.push(format!(
            "volume {:.1}x baseline — blow-off pattern",
            record.volume_ratio
        ));
    }

    if record.change_pct > 0.0 && flow.net_inflow < 0.0 {
        risk += 0.3;
        reasons.push("price rising against main-capital outflow".to_string());
    }

    if record.change_pct < 0.0 && flow.net_inflow < 0.0 {
        risk += 0.25;
        reasons.push("falling with sustained outflow".to_string());
    }

    let risk = risk.clamp(0.0, 1.0);

    let category = if risk >= BLACKLIST_RISK {
        reasons.push("risk above blacklist threshold".to_string());
        Category::Blacklist
    } else if record.change_pct > 0.0
        && flow.net_inflow > 0.0
        && flow.inflow_ratio >= OPPORTUNITY_MIN_INFLOW_RATIO
        && risk < OPPORTUNITY_MAX_RISK
    {
        reasons.push(format!(
            "inflow-backed rise (ratio {:+.2})",
            flow.inflow_ratio
        ));
        Category::Opportunity
    } else {
        Category::Watchlist
    };

    Assessment {
        category,
        risk_score: risk,
        reasons,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
