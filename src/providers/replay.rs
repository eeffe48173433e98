//! Deterministic replay provider.
//!
//! Serves a fixed universe with fully deterministic, slowly evolving
//! quotes — no external dependencies. Used for offline runs
//! (`providers.offline = true`) and as the workhorse of the integration
//! tests: error and latency injection are controllable from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{EnrichmentProvider, SnapshotSource};
use crate::types::{CapitalFlow, Quote};

const SOURCE_NAME: &str = "replay";

/// One instrument of the replay universe.
#[derive(Debug, Clone)]
struct ReplayInstrument {
    id: &'static str,
    name: &'static str,
    base_price: f64,
    /// Baseline daily volume in shares.
    base_volume: f64,
    /// Fixed anomaly bias: positive ids trend up with volume, negative
    /// trend down, zero stay quiet.
    drift_pct: f64,
}

/// The built-in universe. Three instruments are engineered to trip the
/// Level1 screen; the rest provide background noise that must not.
const UNIVERSE: &[ReplayInstrument] = &[
    ReplayInstrument { id: "600519", name: "Kweichow Moutai", base_price: 1650.0, base_volume: 3.0e6, drift_pct: 6.0 },
    ReplayInstrument { id: "300750", name: "CATL", base_price: 185.0, base_volume: 2.2e7, drift_pct: 7.5 },
    ReplayInstrument { id: "000063", name: "ZTE", base_price: 31.0, base_volume: 4.5e7, drift_pct: -6.5 },
    ReplayInstrument { id: "601318", name: "Ping An", base_price: 42.0, base_volume: 6.0e7, drift_pct: 0.4 },
    ReplayInstrument { id: "600036", name: "CMB", base_price: 33.0, base_volume: 4.0e7, drift_pct: -0.3 },
    ReplayInstrument { id: "000858", name: "Wuliangye", base_price: 142.0, base_volume: 1.4e7, drift_pct: 0.8 },
    ReplayInstrument { id: "601888", name: "CTG Duty-Free", base_price: 88.0, base_volume: 9.0e6, drift_pct: -0.6 },
    ReplayInstrument { id: "002594", name: "BYD", base_price: 240.0, base_volume: 1.1e7, drift_pct: 1.1 },
];

/// Deterministic pseudo-noise in [-1.0, 1.0) from a seed.
fn wobble(seed: u64) -> f64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z as f64 / u64::MAX as f64) * 2.0 - 1.0
}

fn id_seed(id: &str) -> u64 {
    id.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
}

/// Deterministic in-process market data for offline mode and tests.
pub struct ReplayMarketData {
    /// Monotone tick advanced on every snapshot, so consecutive cycles
    /// see slightly different (but reproducible) quotes.
    tick: AtomicU64,
    /// If set, all operations return this error.
    force_error: Mutex<Option<String>>,
    /// Instrument ids whose enrichment calls fail.
    failing_enrichment: Mutex<HashSet<String>>,
    /// Artificial latency applied to every enrichment call.
    enrich_delay: Mutex<Duration>,
}

impl ReplayMarketData {
    pub fn new() -> Self {
        Self {
            tick: AtomicU64::new(0),
            force_error: Mutex::new(None),
            failing_enrichment: Mutex::new(HashSet::new()),
            enrich_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Force all subsequent operations to fail.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear a forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Make enrichment fail for one instrument only.
    pub fn fail_enrichment_for(&self, instrument_id: &str) {
        self.failing_enrichment
            .lock()
            .unwrap()
            .insert(instrument_id.to_string());
    }

    /// Delay every enrichment call (for timeout tests).
    pub fn set_enrich_delay(&self, delay: Duration) {
        *self.enrich_delay.lock().unwrap() = delay;
    }

    fn check_forced_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("replay: {msg}")),
            None => Ok(()),
        }
    }

    fn quote_at(inst: &ReplayInstrument, tick: u64) -> Quote {
        let noise = wobble(id_seed(inst.id).wrapping_add(tick)) * 0.4;
        let change_pct = inst.drift_pct + noise;
        let last_price = inst.base_price * (1.0 + change_pct / 100.0);
        // Anomalous movers also trade well above baseline volume
        let volume_boost = 1.0 + inst.drift_pct.abs() * 0.5;
        let volume = inst.base_volume * volume_boost;
        Quote {
            display_name: inst.name.to_string(),
            last_price,
            prior_close: inst.base_price,
            volume,
            turnover_amount: volume * last_price,
        }
    }
}

impl Default for ReplayMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for ReplayMarketData {
    async fn get_snapshot(&self, instrument_ids: &[String]) -> Result<HashMap<String, Quote>> {
        self.check_forced_error()?;
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);

        let wanted: Option<HashSet<&str>> = if instrument_ids.is_empty() {
            None
        } else {
            Some(instrument_ids.iter().map(String::as_str).collect())
        };

        Ok(UNIVERSE
            .iter()
            .filter(|inst| wanted.as_ref().map_or(true, |w| w.contains(inst.id)))
            .map(|inst| (inst.id.to_string(), Self::quote_at(inst, tick)))
            .collect())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[async_trait]
impl EnrichmentProvider for ReplayMarketData {
    async fn enrich(&self, instrument_id: &str) -> Result<CapitalFlow> {
        self.check_forced_error()?;

        let delay = *self.enrich_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        if self.failing_enrichment.lock().unwrap().contains(instrument_id) {
            return Err(anyhow!("replay: enrichment unavailable for {instrument_id}"));
        }

        let inst = UNIVERSE
            .iter()
            .find(|i| i.id == instrument_id)
            .ok_or_else(|| anyhow!("replay: unknown instrument {instrument_id}"))?;

        // Upward drifters attract inflow, downward drifters bleed out
        let turnover = inst.base_volume * inst.base_price;
        let ratio = (inst.drift_pct / 10.0).clamp(-0.6, 0.6);
        let net = turnover * ratio * 0.2;
        Ok(CapitalFlow {
            main_inflow: (net.max(0.0)) + turnover * 0.05,
            main_outflow: (-net).max(0.0) + turnover * 0.05,
            net_inflow: net,
            inflow_ratio: ratio,
            fetched_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
