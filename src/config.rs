//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every tunable the operator owns lives here: pool capacity and TTL,
//! Level1 thresholds per session phase, score weights, enrichment
//! concurrency, export path, and scan cadence. All sections have
//! defaults so a partial (or missing-section) file still loads.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub screener: ScreenerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub name: String,
    /// Scan cadence while the exchange session is open.
    pub in_session_interval_secs: u64,
    /// Scan cadence outside trading hours.
    pub off_session_interval_secs: u64,
    /// Extra sleep multiplier applied once after a failed cycle.
    pub error_backoff_multiplier: u32,
    /// How long `stop()` waits for the scan task to finish its cycle.
    pub shutdown_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            name: "SENTINEL-001".to_string(),
            in_session_interval_secs: 30,
            off_session_interval_secs: 300,
            error_backoff_multiplier: 2,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Level1 thresholds. The opening phase is noisier, so it carries its
/// own (stricter) pair.
#[derive(Debug, Deserialize, Clone)]
pub struct ScreenerConfig {
    pub min_abs_change_pct: f64,
    pub min_turnover_amount: f64,
    pub opening_min_abs_change_pct: f64,
    pub opening_min_turnover_amount: f64,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            min_abs_change_pct: 3.0,
            min_turnover_amount: 50_000_000.0,
            opening_min_abs_change_pct: 5.0,
            opening_min_turnover_amount: 100_000_000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub capacity: usize,
    /// Inactivity TTL before a sweep removes an entry.
    pub ttl_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 600,
        }
    }
}

/// Priority score weights and normalisers. Weights should sum to 1.0;
/// `load` rejects configs where they are wildly off.
#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    pub change_weight: f64,
    pub volume_weight: f64,
    pub turnover_weight: f64,
    /// Absolute change% that earns a full change sub-score.
    pub change_full_scale_pct: f64,
    /// Volume ratio that earns a full volume sub-score.
    pub volume_ratio_full_scale: f64,
    /// Turnover amount that earns a full turnover sub-score.
    pub turnover_full_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            change_weight: 0.4,
            volume_weight: 0.3,
            turnover_weight: 0.3,
            change_full_scale_pct: 10.0,
            volume_ratio_full_scale: 5.0,
            turnover_full_scale: 1_000_000_000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    /// Concurrent enrichment workers (bounded fan-out).
    pub workers: usize,
    /// Per-candidate timeout for one enrich+classify pass.
    pub timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Canonical path of the exported state file.
    pub path: String,
    /// Maximum opportunities listed in the export.
    pub top_k: usize,
    /// Lines retained in the exported log tail.
    pub log_tail_len: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: "sentinel_state.json".to_string(),
            top_k: 10,
            log_tail_len: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub refresh_secs: u64,
    /// Rows shown per refresh.
    pub rows: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_secs: 5,
            rows: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    /// Run against the built-in replay provider instead of live HTTP.
    pub offline: bool,
    /// Base URL of the quote/capital-flow API.
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            offline: false,
            base_url: "http://127.0.0.1:9000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool.capacity == 0 {
            anyhow::bail!("pool.capacity must be at least 1");
        }
        if self.enrichment.workers == 0 {
            anyhow::bail!("enrichment.workers must be at least 1");
        }
        let weight_sum = self.scoring.change_weight
            + self.scoring.volume_weight
            + self.scoring.turnover_weight;
        if (weight_sum - 1.0).abs() > 0.01 {
            anyhow::bail!("scoring weights must sum to 1.0, got {weight_sum:.3}");
        }
        if self.export.top_k == 0 {
            anyhow::bail!("export.top_k must be at least 1");
        }
        Ok(())
    }
}
