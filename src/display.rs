//! Console display — the in-process consumer of the shared pool.
//!
//! Renders a compact table of the highest-priority candidates plus the
//! scan statistics line on a fixed refresh timer. Read-only: it takes
//! pool and stats snapshots under the lock and renders outside it.

use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

use crate::config::DisplayConfig;
use crate::engine::SharedStats;
use crate::pool::SharedPool;
use crate::types::{CandidateRecord, ScanStatistics};

/// Render one refresh frame.
pub fn render(records: &[CandidateRecord], stats: &ScanStatistics, rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("{stats}\n"));
    out.push_str(&format!(
        "{:<10} {:<16} {:>10} {:>8} {:>6} {:>6} {:>5}  {}\n",
        "ID", "NAME", "PRICE", "CHG%", "VR", "PRIO", "RISK", "CATEGORY"
    ));

    for rec in records.iter().take(rows) {
        let risk = rec
            .risk_score
            .map(|r| format!("{r:.2}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<10} {:<16} {:>10.2} {:>+8.2} {:>6.1} {:>6.1} {:>5}  {}\n",
            rec.instrument_id,
            truncate(&rec.display_name, 16),
            rec.last_price,
            rec.change_pct,
            rec.volume_ratio,
            rec.priority_score,
            risk,
            rec.category,
        ));
    }

    if records.len() > rows {
        out.push_str(&format!("... and {} more\n", records.len() - rows));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max.saturating_sub(1)).chain(['…']).collect()
    }
}

/// Refresh loop. Returns when the stop flag flips.
pub async fn run_display(
    cfg: DisplayConfig,
    pool: SharedPool,
    stats: SharedStats,
    mut stop_rx: watch::Receiver<bool>,
) {
    let refresh = Duration::from_secs(cfg.refresh_secs.max(1));

    loop {
        tokio::select! {
            _ = tokio::time::sleep(refresh) => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    return;
                }
            }
        }

        let records = match pool.lock() {
            Ok(guard) => guard.snapshot(),
            Err(_) => {
                warn!("Display: pool lock poisoned, stopping refresh");
                return;
            }
        };
        let stats_copy = match stats.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };

        println!("{}", render(&records, &stats_copy, cfg.rows));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, Category};
    use chrono::Utc;

    fn record(id: &str, name: &str, priority: f64) -> CandidateRecord {
        let c = Candidate {
            instrument_id: id.to_string(),
            display_name: name.to_string(),
            last_price: 42.5,
            change_pct: 5.1,
            volume: 1e6,
            turnover_amount: 2e8,
            volume_ratio: 2.4,
        };
        CandidateRecord::new(&c, priority, Utc::now())
    }

    #[test]
    fn test_render_lists_records() {
        let records = vec![
            record("600519", "Kweichow Moutai", 80.0),
            record("000063", "ZTE", 55.0),
        ];
        let frame = render(&records, &ScanStatistics::default(), 15);
        assert!(frame.contains("600519"));
        assert!(frame.contains("Kweichow Moutai"));
        assert!(frame.contains("000063"));
        assert!(frame.contains("unclassified"));
    }

    #[test]
    fn test_render_truncates_rows() {
        let records: Vec<CandidateRecord> = (0..10)
            .map(|i| record(&format!("id{i}"), "Name", 10.0))
            .collect();
        let frame = render(&records, &ScanStatistics::default(), 3);
        assert!(frame.contains("and 7 more"));
        assert!(!frame.contains("id9\n"));
    }

    #[test]
    fn test_render_shows_risk_when_assessed() {
        let mut rec = record("600519", "Moutai", 80.0);
        rec.risk_score = Some(0.35);
        rec.category = Category::Opportunity;
        let frame = render(&[rec], &ScanStatistics::default(), 5);
        assert!(frame.contains("0.35"));
        assert!(frame.contains("opportunity"));
    }

    #[test]
    fn test_long_names_truncated() {
        let rec = record("600519", "An Unreasonably Long Instrument Name", 80.0);
        let frame = render(&[rec], &ScanStatistics::default(), 5);
        assert!(frame.contains('…'));
        assert!(!frame.contains("Unreasonably Long Instrument"));
    }
}
