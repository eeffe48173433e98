//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`;
//! handlers take snapshots under the lock and serialise outside it. A
//! poisoned lock maps to 500 rather than taking the server down.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::SharedStats;
use crate::export::SharedLogTail;
use crate::pool::SharedPool;
use crate::types::{CandidateRecord, Category};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Read-only handles shared with the scan loop.
pub struct DashboardState {
    pub pool: SharedPool,
    pub stats: SharedStats,
    pub log_tail: SharedLogTail,
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub last_scan_time: Option<String>,
    pub scan_count: u64,
    pub scan_duration_ms: u64,
    pub universe_size: usize,
    pub level1_hits: usize,
    pub pool_size: usize,
    pub pool_capacity: usize,
    pub opportunities: usize,
    pub watchlist: usize,
    pub blacklist: usize,
    pub unclassified: usize,
    pub capacity_rejections: u64,
    pub validation_rejections: u64,
    pub enrichment_failures: u64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let stats = state
        .stats
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();
    let (pool_size, pool_capacity) = {
        let pool = state
            .pool
            .lock()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        (pool.len(), pool.capacity())
    };

    Ok(Json(StatusResponse {
        status: format!("{}", stats.status),
        last_scan_time: stats.last_scan_time.map(|t| t.to_rfc3339()),
        scan_count: stats.scan_count,
        scan_duration_ms: stats.scan_duration_ms,
        universe_size: stats.universe_size,
        level1_hits: stats.level1_hits,
        pool_size,
        pool_capacity,
        opportunities: stats.category_counts.opportunity,
        watchlist: stats.category_counts.watchlist,
        blacklist: stats.category_counts.blacklist,
        unclassified: stats.category_counts.unclassified,
        capacity_rejections: stats.capacity_rejections,
        validation_rejections: stats.validation_rejections,
        enrichment_failures: stats.enrichment_failures,
    }))
}

/// GET /api/candidates — full pool, descending by priority.
pub async fn get_candidates(
    State(state): State<AppState>,
) -> Result<Json<Vec<CandidateRecord>>, StatusCode> {
    let records = state
        .pool
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .snapshot();
    Ok(Json(records))
}

/// GET /api/opportunities — classified opportunities, ascending by risk.
pub async fn get_opportunities(
    State(state): State<AppState>,
) -> Result<Json<Vec<CandidateRecord>>, StatusCode> {
    let mut records: Vec<CandidateRecord> = state
        .pool
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .snapshot()
        .into_iter()
        .filter(|r| r.category == Category::Opportunity)
        .collect();
    records.sort_by(|a, b| {
        a.risk_score
            .partial_cmp(&b.risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(Json(records))
}

/// GET /api/log — recent per-cycle summary lines.
pub async fn get_log(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    let lines = state
        .log_tail
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .lines();
    Ok(Json(lines))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
