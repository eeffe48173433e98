//! REST market-data client.
//!
//! Talks to an internal quote gateway exposing two JSON endpoints:
//!
//! - `GET {base}/quotes`            — full-universe snapshot
//! - `GET {base}/quotes?ids=a,b,c`  — targeted snapshot
//! - `GET {base}/flow/{id}`         — capital-flow fields for one instrument
//!
//! All requests carry an explicit client-level timeout; the engine
//! treats any failure here as transient and retries next cycle.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{EnrichmentProvider, SnapshotSource};
use crate::config::ProvidersConfig;
use crate::types::{CapitalFlow, Quote};

const SOURCE_NAME: &str = "rest-gateway";

// ---------------------------------------------------------------------------
// Wire types (gateway JSON → Rust)
// ---------------------------------------------------------------------------

/// One row of the `/quotes` response. Only the fields we need.
#[derive(Debug, Deserialize)]
struct QuoteRow {
    code: String,
    #[serde(default)]
    name: String,
    last: f64,
    prev_close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(default)]
    amount: f64,
}

/// Response of `/flow/{id}`.
#[derive(Debug, Deserialize)]
struct FlowRow {
    #[serde(default)]
    main_buy: f64,
    #[serde(default)]
    main_sell: f64,
    #[serde(default)]
    net_inflow: f64,
    #[serde(default)]
    inflow_ratio: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP implementation of both provider traits against the quote
/// gateway.
pub struct RestMarketData {
    http: Client,
    base_url: String,
}

impl RestMarketData {
    pub fn new(cfg: &ProvidersConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SnapshotSource for RestMarketData {
    async fn get_snapshot(&self, instrument_ids: &[String]) -> Result<HashMap<String, Quote>> {
        let url = if instrument_ids.is_empty() {
            format!("{}/quotes", self.base_url)
        } else {
            format!("{}/quotes?ids={}", self.base_url, instrument_ids.join(","))
        };

        let rows: Vec<QuoteRow> = self
            .http
            .get(&url)
            .send()
            .await
            .context("Quote request failed")?
            .error_for_status()
            .context("Quote gateway returned error status")?
            .json()
            .await
            .context("Failed to parse quote response")?;

        debug!(count = rows.len(), "Quotes fetched");

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.code,
                    Quote {
                        display_name: r.name,
                        last_price: r.last,
                        prior_close: r.prev_close,
                        volume: r.volume,
                        turnover_amount: r.amount,
                    },
                )
            })
            .collect())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[async_trait]
impl EnrichmentProvider for RestMarketData {
    async fn enrich(&self, instrument_id: &str) -> Result<CapitalFlow> {
        let url = format!("{}/flow/{instrument_id}", self.base_url);

        let row: FlowRow = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Flow request failed for {instrument_id}"))?
            .error_for_status()
            .context("Flow endpoint returned error status")?
            .json()
            .await
            .with_context(|| format!("Failed to parse flow response for {instrument_id}"))?;

        Ok(CapitalFlow {
            main_inflow: row.main_buy,
            main_outflow: row.main_sell,
            net_inflow: row.net_inflow,
            inflow_ratio: row.inflow_ratio.clamp(-1.0, 1.0),
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
