//! State export — the cross-process contract.
//!
//! Once per cycle the scan loop serialises a bounded summary
//! (statistics, a log tail, and the top opportunities ordered by
//! ascending risk) to a JSON file. The write is atomic from a reader's
//! perspective: content goes to a sibling temp file first, then one
//! rename replaces the canonical path. A failed export leaves the
//! previous file untouched.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::types::{CandidateRecord, Category, ScanStatistics};

// ---------------------------------------------------------------------------
// Log tail
// ---------------------------------------------------------------------------

/// Bounded ring of recent per-cycle summary lines, included in the
/// export so file readers get context without access to process logs.
#[derive(Debug)]
pub struct LogTail {
    lines: VecDeque<String>,
    cap: usize,
}

pub type SharedLogTail = Arc<Mutex<LogTail>>;

impl LogTail {
    pub fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    pub fn shared(cap: usize) -> SharedLogTail {
        Arc::new(Mutex::new(Self::new(cap)))
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Exported state
// ---------------------------------------------------------------------------

/// One row of the exported opportunity list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopOpportunity {
    pub instrument_id: String,
    pub display_name: String,
    pub price: f64,
    pub change_pct: f64,
    pub risk_score: f64,
    pub category_tag: String,
}

/// The full exported document. Never partially visible to readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedState {
    pub updated_at: DateTime<Utc>,
    pub stats: ScanStatistics,
    pub log_tail: Vec<String>,
    pub top_opportunities: Vec<TopOpportunity>,
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// Writes the exported state atomically to a fixed path.
#[derive(Debug, Clone)]
pub struct StateExporter {
    path: PathBuf,
    top_k: usize,
}

impl StateExporter {
    pub fn new(path: impl Into<PathBuf>, top_k: usize) -> Self {
        Self {
            path: path.into(),
            top_k: top_k.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialise and atomically replace the exported state file.
    pub fn export(
        &self,
        records: &[CandidateRecord],
        stats: &ScanStatistics,
        log_tail: Vec<String>,
    ) -> Result<()> {
        let state = ExportedState {
            updated_at: Utc::now(),
            stats: stats.clone(),
            log_tail,
            top_opportunities: self.top_opportunities(records),
        };

        let json = serde_json::to_string_pretty(&state)
            .context("Failed to serialise exported state")?;

        // Temp file in the same directory so the rename is a same-
        // filesystem replace.
        let tmp = self.tmp_path();
        std::fs::write(&tmp, &json)
            .with_context(|| format!("Failed to write temp export {}", tmp.display()))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            // Leave no orphan temp file behind on a failed replace
            let _ = std::fs::remove_file(&tmp);
            return Err(anyhow::Error::new(e).context(format!(
                "Failed to replace export file {}",
                self.path.display()
            )));
        }

        debug!(
            path = %self.path.display(),
            opportunities = state.top_opportunities.len(),
            "State exported"
        );
        Ok(())
    }

    /// Read the exported state back (consumer side).
    pub fn load(path: impl AsRef<Path>) -> Result<ExportedState> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read exported state {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse exported state {}", path.display()))
    }

    /// Classified opportunities, ascending by risk score, at most K.
    fn top_opportunities(&self, records: &[CandidateRecord]) -> Vec<TopOpportunity> {
        let mut rows: Vec<TopOpportunity> = records
            .iter()
            .filter(|r| r.category == Category::Opportunity)
            .filter_map(|r| {
                r.risk_score.map(|risk| TopOpportunity {
                    instrument_id: r.instrument_id.clone(),
                    display_name: r.display_name.clone(),
                    price: r.last_price,
                    change_pct: r.change_pct,
                    risk_score: risk,
                    category_tag: r.category.tag().to_string(),
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            a.risk_score
                .partial_cmp(&b.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(self.top_k);
        rows
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sentinel_state.json".to_string());
        name.push_str(".tmp");
        self.path.with_file_name(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candidate;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("sentinel_test_export_{}.json", uuid::Uuid::new_v4()));
        p
    }

    fn record(id: &str, category: Category, risk: Option<f64>) -> CandidateRecord {
        let c = Candidate {
            instrument_id: id.to_string(),
            display_name: format!("Instr {id}"),
            last_price: 12.5,
            change_pct: 4.0,
            volume: 1e6,
            turnover_amount: 2e8,
            volume_ratio: 2.0,
        };
        let mut rec = CandidateRecord::new(&c, 50.0, Utc::now());
        rec.category = category;
        rec.risk_score = risk;
        rec
    }

    #[test]
    fn test_export_round_trip() {
        let path = temp_path();
        let exporter = StateExporter::new(&path, 10);

        let records = vec![
            record("a", Category::Opportunity, Some(0.4)),
            record("b", Category::Opportunity, Some(0.1)),
            record("c", Category::Watchlist, Some(0.3)),
            record("d", Category::Opportunity, Some(0.25)),
        ];
        let mut stats = ScanStatistics::default();
        stats.scan_count = 7;

        exporter
            .export(&records, &stats, vec!["cycle 7 ok".to_string()])
            .unwrap();

        let loaded = StateExporter::load(&path).unwrap();
        assert_eq!(loaded.stats.scan_count, 7);
        assert_eq!(loaded.log_tail, vec!["cycle 7 ok".to_string()]);

        // Only opportunities, ascending by risk score
        let ids: Vec<&str> = loaded
            .top_opportunities
            .iter()
            .map(|o| o.instrument_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
        for o in &loaded.top_opportunities {
            assert_eq!(o.category_tag, "opportunity");
        }

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_export_truncates_to_top_k() {
        let path = temp_path();
        let exporter = StateExporter::new(&path, 2);

        let records: Vec<CandidateRecord> = (0..5)
            .map(|i| record(&format!("id{i}"), Category::Opportunity, Some(i as f64 / 10.0)))
            .collect();
        exporter
            .export(&records, &ScanStatistics::default(), vec![])
            .unwrap();

        let loaded = StateExporter::load(&path).unwrap();
        assert_eq!(loaded.top_opportunities.len(), 2);
        assert!(loaded.top_opportunities[0].risk_score <= loaded.top_opportunities[1].risk_score);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unclassified_opportunity_without_risk_excluded() {
        let path = temp_path();
        let exporter = StateExporter::new(&path, 10);
        let records = vec![record("a", Category::Opportunity, None)];
        exporter
            .export(&records, &ScanStatistics::default(), vec![])
            .unwrap();
        let loaded = StateExporter::load(&path).unwrap();
        assert!(loaded.top_opportunities.is_empty());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_export_leaves_no_temp_file() {
        let path = temp_path();
        let exporter = StateExporter::new(&path, 10);
        exporter
            .export(&[], &ScanStatistics::default(), vec![])
            .unwrap();
        assert!(path.exists());
        assert!(!exporter.tmp_path().exists());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_failed_export_preserves_previous_file() {
        let path = temp_path();
        let exporter = StateExporter::new(&path, 10);
        let mut stats = ScanStatistics::default();
        stats.scan_count = 1;
        exporter.export(&[], &stats, vec![]).unwrap();

        // An exporter pointed into a nonexistent directory fails, and
        // the previously written file stays readable.
        let mut bad = std::env::temp_dir();
        bad.push(format!("sentinel_no_such_dir_{}", uuid::Uuid::new_v4()));
        bad.push("state.json");
        let broken = StateExporter::new(&bad, 10);
        assert!(broken.export(&[], &stats, vec![]).is_err());

        let loaded = StateExporter::load(&path).unwrap();
        assert_eq!(loaded.stats.scan_count, 1);
        std::fs::remove_file(&path).unwrap();
    }

    // -- Log tail --

    #[test]
    fn test_log_tail_bounded() {
        let mut tail = LogTail::new(3);
        for i in 0..10 {
            tail.push(format!("line {i}"));
        }
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.lines(), vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn test_log_tail_zero_cap_clamped() {
        let mut tail = LogTail::new(0);
        tail.push("only".to_string());
        assert_eq!(tail.len(), 1);
    }
}
