//! Level2 + Level3 analysis pass.
//!
//! Takes one snapshot of the pool at the start of the phase (entries
//! inserted mid-analysis wait for the next cycle), fans the batch out
//! through a bounded number of concurrent enrichment calls, each under
//! its own timeout, classifies what comes back, and writes results into
//! the pool. One candidate failing or timing out never aborts the
//! batch; the candidate keeps its prior category and enrichment.

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::classifier::{classify, Assessment};
use crate::config::EnrichmentConfig;
use crate::pool::SharedPool;
use crate::providers::EnrichmentProvider;
use crate::types::CapitalFlow;

/// Outcome of one analysis pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisReport {
    /// Candidates in the phase-start snapshot.
    pub analyzed: usize,
    /// Candidates whose enrichment and classification landed.
    pub updated: usize,
    /// Enrichment failures or timeouts (candidate kept prior state).
    pub failures: u64,
}

/// Run Level2 enrichment and Level3 classification over the current
/// pool members.
pub async fn analyze_pool(
    pool: &SharedPool,
    provider: Arc<dyn EnrichmentProvider>,
    cfg: &EnrichmentConfig,
) -> Result<AnalysisReport> {
    // Phase boundary: analysis only ever sees this snapshot.
    let batch = pool
        .lock()
        .map_err(|_| anyhow!("candidate pool lock poisoned"))?
        .snapshot();

    let analyzed = batch.len();
    if analyzed == 0 {
        return Ok(AnalysisReport::default());
    }

    let per_candidate = Duration::from_millis(cfg.timeout_ms);
    let workers = cfg.workers.max(1);

    let results: Vec<Option<(String, CapitalFlow, Assessment)>> =
        stream::iter(batch.into_iter().map(|record| {
            let provider = Arc::clone(&provider);
            async move {
                let id = record.instrument_id.clone();
                match timeout(per_candidate, provider.enrich(&id)).await {
                    Ok(Ok(flow)) => {
                        let assessment = classify(&record, &flow);
                        Some((id, flow, assessment))
                    }
                    Ok(Err(e)) => {
                        warn!(
                            instrument = %id,
                            source = provider.name(),
                            error = %e,
                            "Enrichment failed — candidate keeps prior state"
                        );
                        None
                    }
                    Err(_) => {
                        warn!(
                            instrument = %id,
                            timeout_ms = cfg.timeout_ms,
                            "Enrichment timed out — candidate keeps prior state"
                        );
                        None
                    }
                }
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut updated = 0usize;
    let mut failures = 0u64;
    {
        let mut guard = pool
            .lock()
            .map_err(|_| anyhow!("candidate pool lock poisoned"))?;
        for result in results {
            match result {
                Some((id, flow, assessment)) => {
                    // The candidate may have been evicted mid-analysis;
                    // writing to a departed entry is a silent no-op.
                    if guard.apply_enrichment(&id, flow) {
                        guard.apply_assessment(
                            &id,
                            assessment.category,
                            assessment.risk_score,
                            assessment.reasons,
                        );
                        updated += 1;
                    }
                }
                None => failures += 1,
            }
        }
    }

    debug!(analyzed, updated, failures, "Analysis pass complete");

    Ok(AnalysisReport {
        analyzed,
        updated,
        failures,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CandidatePool;
    use crate::providers::replay::ReplayMarketData;
    use crate::types::{Candidate, Category};
    use chrono::Utc;

    fn seeded_pool(ids: &[&str]) -> SharedPool {
        let pool = CandidatePool::shared(100, 600);
        {
            let mut guard = pool.lock().unwrap();
            for (i, id) in ids.iter().enumerate() {
                let c = Candidate {
                    instrument_id: id.to_string(),
                    display_name: format!("Instr {id}"),
                    last_price: 10.0,
                    change_pct: 6.0,
                    volume: 1e7,
                    turnover_amount: 1e9,
                    volume_ratio: 3.0,
                };
                guard.upsert(&c, 50.0 + i as f64, Utc::now());
            }
        }
        pool
    }

    fn cfg(workers: usize, timeout_ms: u64) -> EnrichmentConfig {
        EnrichmentConfig { workers, timeout_ms }
    }

    #[tokio::test]
    async fn test_empty_pool_is_noop() {
        let pool = CandidatePool::shared(10, 600);
        let provider: Arc<dyn EnrichmentProvider> = Arc::new(ReplayMarketData::new());
        let report = analyze_pool(&pool, provider, &cfg(4, 1000)).await.unwrap();
        assert_eq!(report.analyzed, 0);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn test_all_candidates_enriched_and_classified() {
        let pool = seeded_pool(&["600519", "000063", "601318"]);
        let provider: Arc<dyn EnrichmentProvider> = Arc::new(ReplayMarketData::new());
        let report = analyze_pool(&pool, provider, &cfg(4, 1000)).await.unwrap();

        assert_eq!(report.analyzed, 3);
        assert_eq!(report.updated, 3);
        assert_eq!(report.failures, 0);

        let guard = pool.lock().unwrap();
        for id in ["600519", "000063", "601318"] {
            let rec = guard.get(id).unwrap();
            assert!(rec.enrichment.is_some(), "{id} should be enriched");
            assert_ne!(rec.category, Category::Unclassified);
            assert!(rec.risk_score.is_some());
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        // Spec scenario: enrichment for one instrument fails; the other
        // candidates in the same cycle still complete.
        let pool = seeded_pool(&["600519", "000063", "601318"]);
        let replay = Arc::new(ReplayMarketData::new());
        replay.fail_enrichment_for("000063");
        let provider: Arc<dyn EnrichmentProvider> = replay;

        let report = analyze_pool(&pool, provider, &cfg(4, 1000)).await.unwrap();
        assert_eq!(report.analyzed, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.failures, 1);

        let guard = pool.lock().unwrap();
        assert_eq!(
            guard.get("000063").unwrap().category,
            Category::Unclassified,
            "failed candidate keeps prior category"
        );
        assert_ne!(guard.get("600519").unwrap().category, Category::Unclassified);
    }

    #[tokio::test]
    async fn test_failed_candidate_retains_prior_assessment() {
        let pool = seeded_pool(&["600519"]);
        pool.lock().unwrap().apply_assessment(
            "600519",
            Category::Opportunity,
            0.2,
            vec!["prior cycle".to_string()],
        );

        let replay = Arc::new(ReplayMarketData::new());
        replay.fail_enrichment_for("600519");
        let report = analyze_pool(&pool, replay, &cfg(2, 1000)).await.unwrap();
        assert_eq!(report.failures, 1);

        let guard = pool.lock().unwrap();
        let rec = guard.get("600519").unwrap();
        assert_eq!(rec.category, Category::Opportunity);
        assert_eq!(rec.risk_score, Some(0.2));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let pool = seeded_pool(&["600519", "000063"]);
        let replay = Arc::new(ReplayMarketData::new());
        replay.set_enrich_delay(Duration::from_millis(300));

        let report = analyze_pool(&pool, replay, &cfg(2, 20)).await.unwrap();
        assert_eq!(report.failures, 2);
        assert_eq!(report.updated, 0);
    }

    #[tokio::test]
    async fn test_single_worker_still_processes_all() {
        let pool = seeded_pool(&["600519", "000063", "601318", "600036"]);
        let provider: Arc<dyn EnrichmentProvider> = Arc::new(ReplayMarketData::new());
        let report = analyze_pool(&pool, provider, &cfg(1, 1000)).await.unwrap();
        assert_eq!(report.updated, 4);
    }
}
