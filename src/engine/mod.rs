//! The scan loop — SENTINEL's heartbeat.
//!
//! One cycle walks the fixed phase sequence: snapshot the universe, run
//! the Level1 screen, update the candidate pool, run the Level2+Level3
//! analysis pass, export state, sleep. Cadence adapts to the exchange
//! session, a failed cycle backs off once, and a stop request is
//! honoured at the next phase boundary with a final export.

pub mod classifier;
pub mod enricher;

pub use enricher::{analyze_pool, AnalysisReport};

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::AppConfig;
use crate::export::{LogTail, SharedLogTail, StateExporter};
use crate::pool::{CandidatePool, SharedPool};
use crate::providers::{EnrichmentProvider, SnapshotSource};
use crate::scoring::{PriorityScorer, VolumeBaseline};
use crate::session;
use crate::types::{CategoryCounts, ScanStatistics, ScanStatus};
use crate::{screener, session::SessionPhase};

/// Handle shared between the scan loop and consumers.
pub type SharedStats = Arc<Mutex<ScanStatistics>>;

// ---------------------------------------------------------------------------
// Cycle phases
// ---------------------------------------------------------------------------

/// Where the loop currently is inside a cycle. Surfaced via tracing for
/// operators chasing a stuck cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    ScanningLevel1,
    UpdatingPool,
    Analyzing,
    ExportingState,
    Sleeping,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::Idle => write!(f, "idle"),
            CyclePhase::ScanningLevel1 => write!(f, "scanning-level1"),
            CyclePhase::UpdatingPool => write!(f, "updating-pool"),
            CyclePhase::Analyzing => write!(f, "analyzing"),
            CyclePhase::ExportingState => write!(f, "exporting-state"),
            CyclePhase::Sleeping => write!(f, "sleeping"),
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| anyhow!("shared state lock poisoned"))
}

// ---------------------------------------------------------------------------
// Scan loop
// ---------------------------------------------------------------------------

/// Owns the per-cycle pipeline and all loop-local state (volume
/// baseline, scorer). The pool, statistics, and log tail are shared
/// handles so the display, dashboard, and exporter read the same data
/// the loop writes.
pub struct ScanLoop {
    cfg: AppConfig,
    pool: SharedPool,
    stats: SharedStats,
    log_tail: SharedLogTail,
    snapshot_source: Arc<dyn SnapshotSource>,
    enrichment: Arc<dyn EnrichmentProvider>,
    scorer: PriorityScorer,
    baseline: VolumeBaseline,
    exporter: StateExporter,
    phase: CyclePhase,
}

impl ScanLoop {
    pub fn new(
        cfg: AppConfig,
        snapshot_source: Arc<dyn SnapshotSource>,
        enrichment: Arc<dyn EnrichmentProvider>,
    ) -> Self {
        let pool = CandidatePool::shared(cfg.pool.capacity, cfg.pool.ttl_secs);
        let exporter = StateExporter::new(&cfg.export.path, cfg.export.top_k);
        let log_tail = LogTail::shared(cfg.export.log_tail_len);
        let scorer = PriorityScorer::new(cfg.scoring.clone());
        Self {
            cfg,
            pool,
            stats: Arc::new(Mutex::new(ScanStatistics::default())),
            log_tail,
            snapshot_source,
            enrichment,
            scorer,
            baseline: VolumeBaseline::new(),
            exporter,
            phase: CyclePhase::Idle,
        }
    }

    /// Shared pool handle for consumers.
    pub fn pool(&self) -> SharedPool {
        Arc::clone(&self.pool)
    }

    /// Shared statistics handle for consumers.
    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    pub fn log_tail(&self) -> SharedLogTail {
        Arc::clone(&self.log_tail)
    }

    fn enter(&mut self, phase: CyclePhase) {
        self.phase = phase;
        trace!(phase = %phase, "Cycle phase");
    }

    /// Run one complete scan cycle.
    ///
    /// A failed snapshot degrades to an empty universe (the pool ages
    /// naturally and the cycle still exports); a failed export is logged
    /// and the previous file stays valid. Only corrupted shared state
    /// makes this return an error.
    pub async fn run_cycle(&mut self) -> Result<()> {
        let started = Instant::now();
        let now = Utc::now();
        let session_phase = session::phase_at(now);

        // -- Level1: snapshot and screen --
        self.enter(CyclePhase::ScanningLevel1);
        let universe = match self.snapshot_source.get_snapshot(&[]).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    source = self.snapshot_source.name(),
                    error = %e,
                    "Snapshot failed — screening an empty universe this cycle"
                );
                HashMap::new()
            }
        };
        let universe_size = universe.len();
        for (id, quote) in &universe {
            self.baseline.observe(id, quote.volume);
        }
        let thresholds = session::thresholds(session_phase, &self.cfg.screener);
        let hits = screener::screen(&universe, &thresholds, &self.baseline);
        let level1_hits = hits.len();

        // -- Pool update: upserts first so re-flagged entries survive
        // the sweep that follows --
        self.enter(CyclePhase::UpdatingPool);
        let (swept, capacity_rejections, validation_rejections) = {
            let mut pool = lock(&self.pool)?;
            pool.begin_cycle();
            for candidate in &hits {
                pool.upsert(candidate, self.scorer.score(candidate), now);
            }
            let swept = pool.sweep(now);
            (
                swept,
                pool.capacity_rejections(),
                pool.validation_rejections(),
            )
        };

        // -- Level2 + Level3 --
        self.enter(CyclePhase::Analyzing);
        let report = analyze_pool(
            &self.pool,
            Arc::clone(&self.enrichment),
            &self.cfg.enrichment,
        )
        .await?;

        // -- Statistics and export --
        self.enter(CyclePhase::ExportingState);
        let records = lock(&self.pool)?.snapshot();
        let stats_copy = {
            let mut stats = lock(&self.stats)?;
            stats.last_scan_time = Some(now);
            stats.scan_count += 1;
            stats.scan_duration_ms = started.elapsed().as_millis() as u64;
            stats.universe_size = universe_size;
            stats.level1_hits = level1_hits;
            stats.category_counts = CategoryCounts::from_records(&records);
            stats.capacity_rejections = capacity_rejections;
            stats.validation_rejections = validation_rejections;
            stats.enrichment_failures = report.failures;
            stats.status = ScanStatus::Ok;
            stats.clone()
        };

        let tail_lines = {
            let mut tail = lock(&self.log_tail)?;
            tail.push(format!(
                "cycle {}: universe={} hits={} pool={} swept={} analyzed={} failures={}",
                stats_copy.scan_count,
                universe_size,
                level1_hits,
                records.len(),
                swept,
                report.analyzed,
                report.failures,
            ));
            tail.lines()
        };

        if let Err(e) = self.exporter.export(&records, &stats_copy, tail_lines) {
            warn!(error = %e, "State export failed — previous file stays valid");
        }

        self.enter(CyclePhase::Idle);
        info!(
            cycle = stats_copy.scan_count,
            universe = universe_size,
            hits = level1_hits,
            pool = records.len(),
            opportunities = stats_copy.category_counts.opportunity,
            failures = report.failures,
            duration_ms = stats_copy.scan_duration_ms,
            "Scan cycle complete"
        );
        Ok(())
    }

    /// Run cycles until the stop flag flips.
    pub async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        info!(monitor = %self.cfg.monitor.name, "Scan loop started");

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let cycle_result = self.run_cycle().await;

            let session_phase = session::phase_at(Utc::now());
            let mut interval = session::scan_interval(session_phase, &self.cfg.monitor);
            if let Err(e) = cycle_result {
                error!(error = %e, "Scan cycle failed");
                if let Ok(mut stats) = self.stats.lock() {
                    stats.status = ScanStatus::Error;
                }
                // Back off once; the next successful cycle resumes the
                // normal cadence.
                interval *= self.cfg.monitor.error_backoff_multiplier.max(1);
            }

            if session_phase == SessionPhase::Closed {
                debug!(sleep_secs = interval.as_secs(), "Session closed — long sleep");
            }

            self.enter(CyclePhase::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.finalize();
        info!("Scan loop stopped");
    }

    /// Mark the loop stopped and write one last export so the file
    /// reflects the shutdown.
    fn finalize(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.status = ScanStatus::Stopped;
        }
        let records = self.pool.lock().map(|p| p.snapshot()).unwrap_or_default();
        let stats = self
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let tail = self.log_tail.lock().map(|t| t.lines()).unwrap_or_default();
        if let Err(e) = self.exporter.export(&records, &stats, tail) {
            warn!(error = %e, "Final state export failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor handle
// ---------------------------------------------------------------------------

/// Detached scan loop plus the means to stop it.
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Start the loop on the runtime.
    pub fn spawn(scan_loop: ScanLoop) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(scan_loop.run(stop_rx));
        Self { stop_tx, task }
    }

    /// Request a stop and wait for the loop to finish its current
    /// cycle, up to `timeout`.
    pub async fn stop(self, timeout: Duration) -> Result<()> {
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(timeout, self.task).await {
            Ok(joined) => joined.map_err(|e| anyhow!("scan task panicked: {e}")),
            Err(_) => Err(anyhow!(
                "scan task did not stop within {}s",
                timeout.as_secs()
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
