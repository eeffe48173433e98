//! Shared types for the SENTINEL monitoring core.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that provider, engine, and
//! presentation modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Quote snapshot
// ---------------------------------------------------------------------------

/// Latest observed fields for one instrument, as returned by a
/// `SnapshotSource`. A snapshot is a point-in-time observation — it
/// carries no identity of its own; the instrument id is the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub display_name: String,
    pub last_price: f64,
    pub prior_close: f64,
    /// Shares traded so far today.
    pub volume: f64,
    /// Turnover amount in currency units.
    pub turnover_amount: f64,
}

impl Quote {
    /// Percent change vs. prior close. Returns 0.0 when prior close is
    /// unusable (new listing, halted instrument with no reference price).
    pub fn change_pct(&self) -> f64 {
        if self.prior_close > 0.0 {
            (self.last_price - self.prior_close) / self.prior_close * 100.0
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Lightweight candidate produced by the Level1 screen. Carries only the
/// raw fields needed for scoring and pool admission; enrichment comes
/// later, and only for candidates that make it into the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub instrument_id: String,
    pub display_name: String,
    pub last_price: f64,
    pub change_pct: f64,
    pub volume: f64,
    pub turnover_amount: f64,
    /// Today's volume relative to the rolling baseline (1.0 = in line).
    pub volume_ratio: f64,
}

impl Candidate {
    /// Check the fields a candidate must have to enter the pool.
    /// Non-positive prices and empty ids are data errors upstream and
    /// must never become pool entries.
    pub fn validate(&self) -> Result<(), SentinelError> {
        if self.instrument_id.is_empty() {
            return Err(SentinelError::Validation {
                instrument_id: "<empty>".to_string(),
                reason: "empty instrument id".to_string(),
            });
        }
        if !(self.last_price > 0.0) {
            return Err(SentinelError::Validation {
                instrument_id: self.instrument_id.clone(),
                reason: format!("non-positive price {}", self.last_price),
            });
        }
        for (name, v) in [
            ("change_pct", self.change_pct),
            ("volume", self.volume),
            ("turnover_amount", self.turnover_amount),
            ("volume_ratio", self.volume_ratio),
        ] {
            if !v.is_finite() {
                return Err(SentinelError::Validation {
                    instrument_id: self.instrument_id.clone(),
                    reason: format!("non-finite {name}"),
                });
            }
        }
        Ok(())
    }
}

/// Classification assigned by the Level3 classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Unclassified,
    Opportunity,
    Watchlist,
    Blacklist,
}

impl Category {
    /// All categories (useful for iteration and counting).
    pub const ALL: &'static [Category] = &[
        Category::Unclassified,
        Category::Opportunity,
        Category::Watchlist,
        Category::Blacklist,
    ];

    /// Short lowercase tag used in the exported state file.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::Unclassified => "unclassified",
            Category::Opportunity => "opportunity",
            Category::Watchlist => "watchlist",
            Category::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Capital-flow fields attached by Level2 enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalFlow {
    /// Main (large-order) buy amount, currency units.
    pub main_inflow: f64,
    /// Main (large-order) sell amount, currency units.
    pub main_outflow: f64,
    /// Net inflow over the whole session so far.
    pub net_inflow: f64,
    /// Net inflow as a fraction of turnover (-1.0 to 1.0).
    pub inflow_ratio: f64,
    pub fetched_at: DateTime<Utc>,
}

impl fmt::Display for CapitalFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "net={:.0} ratio={:+.2} (in={:.0} out={:.0})",
            self.net_inflow, self.inflow_ratio, self.main_inflow, self.main_outflow,
        )
    }
}

/// A fully materialised pool entry.
///
/// Invariants (enforced by `CandidatePool`):
/// - `instrument_id` is unique within the pool
/// - `added_at` never changes after first insert
/// - `last_updated_at` is monotonically non-decreasing
/// - `category` is written only via the classifier path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub instrument_id: String,
    pub display_name: String,
    pub last_price: f64,
    pub change_pct: f64,
    pub volume: f64,
    pub turnover_amount: f64,
    pub volume_ratio: f64,
    pub priority_score: f64,
    pub added_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub category: Category,
    pub enrichment: Option<CapitalFlow>,
    /// Risk score from the classifier (0.0 = benign, 1.0 = avoid).
    pub risk_score: Option<f64>,
    /// Human-readable classification reasons.
    pub reasons: Vec<String>,
}

impl CandidateRecord {
    /// Build a fresh record from a screened candidate.
    pub fn new(candidate: &Candidate, priority_score: f64, now: DateTime<Utc>) -> Self {
        Self {
            instrument_id: candidate.instrument_id.clone(),
            display_name: candidate.display_name.clone(),
            last_price: candidate.last_price,
            change_pct: candidate.change_pct,
            volume: candidate.volume,
            turnover_amount: candidate.turnover_amount,
            volume_ratio: candidate.volume_ratio,
            priority_score,
            added_at: now,
            last_updated_at: now,
            category: Category::Unclassified,
            enrichment: None,
            risk_score: None,
            reasons: Vec::new(),
        }
    }

    /// Merge fresh raw fields into an existing record.
    /// Preserves `added_at`, classification, and enrichment; the caller
    /// supplies the recomputed priority score.
    pub fn refresh(&mut self, candidate: &Candidate, priority_score: f64, now: DateTime<Utc>) {
        self.display_name = candidate.display_name.clone();
        self.last_price = candidate.last_price;
        self.change_pct = candidate.change_pct;
        self.volume = candidate.volume;
        self.turnover_amount = candidate.turnover_amount;
        self.volume_ratio = candidate.volume_ratio;
        self.priority_score = priority_score;
        if now > self.last_updated_at {
            self.last_updated_at = now;
        }
    }

    /// Age since last refresh.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_updated_at
    }
}

impl fmt::Display for CandidateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:+.2}% @ {:.2} vr={:.1} prio={:.1} [{}]",
            self.instrument_id,
            self.display_name,
            self.change_pct,
            self.last_price,
            self.volume_ratio,
            self.priority_score,
            self.category,
        )
    }
}

// ---------------------------------------------------------------------------
// Scan statistics
// ---------------------------------------------------------------------------

/// Scan loop lifecycle status, surfaced to consumers and the export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Starting,
    Ok,
    Error,
    Stopped,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Starting => write!(f, "starting"),
            ScanStatus::Ok => write!(f, "ok"),
            ScanStatus::Error => write!(f, "error"),
            ScanStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Per-category pool counts at the end of a cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub unclassified: usize,
    pub opportunity: usize,
    pub watchlist: usize,
    pub blacklist: usize,
}

impl CategoryCounts {
    /// Tally counts from a pool snapshot.
    pub fn from_records(records: &[CandidateRecord]) -> Self {
        let mut counts = Self::default();
        for r in records {
            match r.category {
                Category::Unclassified => counts.unclassified += 1,
                Category::Opportunity => counts.opportunity += 1,
                Category::Watchlist => counts.watchlist += 1,
                Category::Blacklist => counts.blacklist += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.unclassified + self.opportunity + self.watchlist + self.blacklist
    }
}

/// Process-wide scan statistics. Mutated only by the scan loop; read by
/// the display, the dashboard, and the state exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub last_scan_time: Option<DateTime<Utc>>,
    pub scan_count: u64,
    /// Wall-clock duration of the most recent cycle.
    pub scan_duration_ms: u64,
    pub universe_size: usize,
    pub level1_hits: usize,
    pub category_counts: CategoryCounts,
    /// Upserts rejected because the pool was full (aggregated per cycle).
    pub capacity_rejections: u64,
    /// Candidates rejected as malformed at the pool boundary.
    pub validation_rejections: u64,
    /// Level2/Level3 failures or timeouts in the last cycle.
    pub enrichment_failures: u64,
    pub status: ScanStatus,
}

impl Default for ScanStatistics {
    fn default() -> Self {
        Self {
            last_scan_time: None,
            scan_count: 0,
            scan_duration_ms: 0,
            universe_size: 0,
            level1_hits: 0,
            category_counts: CategoryCounts::default(),
            capacity_rejections: 0,
            validation_rejections: 0,
            enrichment_failures: 0,
            status: ScanStatus::Starting,
        }
    }
}

impl fmt::Display for ScanStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] scans={} pool={} (opp={} watch={} black={}) hits={} rej={}+{} fail={} dur={}ms",
            self.status,
            self.scan_count,
            self.category_counts.total(),
            self.category_counts.opportunity,
            self.category_counts.watchlist,
            self.category_counts.blacklist,
            self.level1_hits,
            self.capacity_rejections,
            self.validation_rejections,
            self.enrichment_failures,
            self.scan_duration_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy for SENTINEL.
///
/// `TransientData` is retried next cycle, `Validation` is stopped at the
/// pool boundary, `Export` keeps the previous file valid. Capacity
/// rejection is a normal outcome, not an error, and has no variant here.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("transient data error ({source_name}): {message}")]
    TransientData { source_name: String, message: String },

    #[error("invalid candidate {instrument_id}: {reason}")]
    Validation { instrument_id: String, reason: String },

    #[error("export failed: {0}")]
    Export(String),

    #[error("configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate() -> Candidate {
        Candidate {
            instrument_id: "600519".to_string(),
            display_name: "Kweichow Moutai".to_string(),
            last_price: 1720.0,
            change_pct: 4.2,
            volume: 3_200_000.0,
            turnover_amount: 5_400_000_000.0,
            volume_ratio: 2.8,
        }
    }

    // -- Quote tests --

    #[test]
    fn test_quote_change_pct() {
        let q = Quote {
            display_name: "Test".to_string(),
            last_price: 11.0,
            prior_close: 10.0,
            volume: 1000.0,
            turnover_amount: 11_000.0,
        };
        assert!((q.change_pct() - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_quote_change_pct_no_prior_close() {
        let q = Quote {
            display_name: "IPO".to_string(),
            last_price: 11.0,
            prior_close: 0.0,
            volume: 1000.0,
            turnover_amount: 11_000.0,
        };
        assert_eq!(q.change_pct(), 0.0);
    }

    // -- Candidate validation tests --

    #[test]
    fn test_candidate_valid() {
        assert!(sample_candidate().validate().is_ok());
    }

    #[test]
    fn test_candidate_empty_id_rejected() {
        let mut c = sample_candidate();
        c.instrument_id = String::new();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_candidate_non_positive_price_rejected() {
        let mut c = sample_candidate();
        c.last_price = 0.0;
        assert!(c.validate().is_err());
        c.last_price = -3.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_candidate_nan_field_rejected() {
        let mut c = sample_candidate();
        c.volume_ratio = f64::NAN;
        assert!(c.validate().is_err());
    }

    // -- CandidateRecord tests --

    #[test]
    fn test_record_new_defaults() {
        let now = Utc::now();
        let rec = CandidateRecord::new(&sample_candidate(), 62.5, now);
        assert_eq!(rec.instrument_id, "600519");
        assert_eq!(rec.category, Category::Unclassified);
        assert_eq!(rec.added_at, now);
        assert_eq!(rec.last_updated_at, now);
        assert!(rec.enrichment.is_none());
        assert!(rec.risk_score.is_none());
    }

    #[test]
    fn test_record_refresh_preserves_identity() {
        let t0 = Utc::now();
        let mut rec = CandidateRecord::new(&sample_candidate(), 50.0, t0);
        rec.category = Category::Opportunity;

        let mut updated = sample_candidate();
        updated.last_price = 1750.0;
        let t1 = t0 + chrono::Duration::seconds(30);
        rec.refresh(&updated, 55.0, t1);

        assert_eq!(rec.added_at, t0, "added_at is immutable");
        assert_eq!(rec.last_updated_at, t1);
        assert_eq!(rec.category, Category::Opportunity, "refresh never touches category");
        assert!((rec.last_price - 1750.0).abs() < 1e-10);
        assert!((rec.priority_score - 55.0).abs() < 1e-10);
    }

    #[test]
    fn test_record_refresh_timestamp_monotone() {
        let t0 = Utc::now();
        let mut rec = CandidateRecord::new(&sample_candidate(), 50.0, t0);
        // Refresh with an earlier clock must not move last_updated_at back
        rec.refresh(&sample_candidate(), 50.0, t0 - chrono::Duration::seconds(5));
        assert_eq!(rec.last_updated_at, t0);
    }

    #[test]
    fn test_record_display() {
        let rec = CandidateRecord::new(&sample_candidate(), 62.5, Utc::now());
        let s = format!("{rec}");
        assert!(s.contains("600519"));
        assert!(s.contains("unclassified"));
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let rec = CandidateRecord::new(&sample_candidate(), 62.5, Utc::now());
        let json = serde_json::to_string(&rec).unwrap();
        let parsed: CandidateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.instrument_id, "600519");
        assert_eq!(parsed.category, Category::Unclassified);
    }

    // -- Category tests --

    #[test]
    fn test_category_tags() {
        assert_eq!(Category::Opportunity.tag(), "opportunity");
        assert_eq!(Category::Blacklist.tag(), "blacklist");
        assert_eq!(Category::ALL.len(), 4);
    }

    #[test]
    fn test_category_counts() {
        let now = Utc::now();
        let mut records = vec![
            CandidateRecord::new(&sample_candidate(), 10.0, now),
            CandidateRecord::new(&sample_candidate(), 20.0, now),
            CandidateRecord::new(&sample_candidate(), 30.0, now),
        ];
        records[0].category = Category::Opportunity;
        records[1].category = Category::Blacklist;

        let counts = CategoryCounts::from_records(&records);
        assert_eq!(counts.opportunity, 1);
        assert_eq!(counts.blacklist, 1);
        assert_eq!(counts.unclassified, 1);
        assert_eq!(counts.total(), 3);
    }

    // -- Statistics tests --

    #[test]
    fn test_statistics_default() {
        let stats = ScanStatistics::default();
        assert_eq!(stats.scan_count, 0);
        assert_eq!(stats.status, ScanStatus::Starting);
        assert!(stats.last_scan_time.is_none());
    }

    #[test]
    fn test_statistics_display() {
        let stats = ScanStatistics::default();
        let s = format!("{stats}");
        assert!(s.contains("starting"));
        assert!(s.contains("scans=0"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", ScanStatus::Ok), "ok");
        assert_eq!(format!("{}", ScanStatus::Error), "error");
    }

    // -- Error tests --

    #[test]
    fn test_error_display() {
        let e = SentinelError::TransientData {
            source_name: "quotes".to_string(),
            message: "connection timeout".to_string(),
        };
        assert_eq!(format!("{e}"), "transient data error (quotes): connection timeout");

        let e = SentinelError::Validation {
            instrument_id: "000001".to_string(),
            reason: "non-positive price 0".to_string(),
        };
        assert!(format!("{e}").contains("000001"));
    }
}
