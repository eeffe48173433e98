//! Market data providers.
//!
//! Defines the two inbound collaborator traits — quote snapshots for
//! the Level1 screen and capital-flow enrichment for Level2 — plus a
//! live REST implementation and a deterministic replay implementation
//! for offline runs and tests.

pub mod replay;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::types::{CapitalFlow, Quote};

/// Source of per-instrument quote snapshots.
///
/// Implementations may return partial or empty maps — missing
/// instruments are simply absent this cycle. Errors are transient from
/// the engine's point of view: the cycle logs them and retries on the
/// next tick.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch quotes for the given instruments. An empty id slice
    /// requests the provider's full universe.
    async fn get_snapshot(&self, instrument_ids: &[String]) -> Result<HashMap<String, Quote>>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Per-instrument capital-flow enrichment (Level2 input).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(&self, instrument_id: &str) -> Result<CapitalFlow>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
