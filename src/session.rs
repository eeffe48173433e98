//! Exchange session clock.
//!
//! Maps a wall-clock instant to a session phase, and derives the two
//! phase-dependent inputs of the scan loop: the Level1 thresholds and
//! the inter-cycle sleep. The exchange day is modelled after a
//! mainland A-share venue: 09:30–11:30 and 13:00–15:00 local time,
//! Monday to Friday, with the first half hour treated as the noisy
//! opening window.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Timelike, Utc, Weekday};
use std::time::Duration;

use crate::config::{MonitorConfig, ScreenerConfig};
use crate::screener::Thresholds;

/// Exchange-local UTC offset (UTC+8).
const EXCHANGE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Phase of the exchange day at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// First 30 minutes of the morning session — wide spreads, thin
    /// baselines, so screening runs with stricter thresholds.
    Opening,
    /// Regular continuous trading.
    Continuous,
    /// Lunch break, nights, weekends.
    Closed,
}

/// Classify an instant into a session phase.
pub fn phase_at(instant: DateTime<Utc>) -> SessionPhase {
    let local = instant.with_timezone(
        &FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS).expect("static offset"),
    );

    match local.weekday() {
        Weekday::Sat | Weekday::Sun => return SessionPhase::Closed,
        _ => {}
    }

    let t = NaiveTime::from_hms_opt(local.hour(), local.minute(), local.second())
        .expect("valid wall clock");
    let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let opening_end = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
    let am_close = NaiveTime::from_hms_opt(11, 30, 0).unwrap();
    let pm_open = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
    let pm_close = NaiveTime::from_hms_opt(15, 0, 0).unwrap();

    if t >= open && t < opening_end {
        SessionPhase::Opening
    } else if (t >= opening_end && t < am_close) || (t >= pm_open && t < pm_close) {
        SessionPhase::Continuous
    } else {
        SessionPhase::Closed
    }
}

/// Inter-cycle sleep for the current phase.
pub fn scan_interval(phase: SessionPhase, cfg: &MonitorConfig) -> Duration {
    match phase {
        SessionPhase::Opening | SessionPhase::Continuous => {
            Duration::from_secs(cfg.in_session_interval_secs)
        }
        SessionPhase::Closed => Duration::from_secs(cfg.off_session_interval_secs),
    }
}

/// Level1 thresholds for the current phase.
pub fn thresholds(phase: SessionPhase, cfg: &ScreenerConfig) -> Thresholds {
    match phase {
        SessionPhase::Opening => Thresholds {
            min_abs_change_pct: cfg.opening_min_abs_change_pct,
            min_turnover_amount: cfg.opening_min_turnover_amount,
        },
        _ => Thresholds {
            min_abs_change_pct: cfg.min_abs_change_pct,
            min_turnover_amount: cfg.min_turnover_amount,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
