// Logging setup and scan loop metrics
use crate::glass::CycleOutcome;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Samples kept for latency percentiles
const LATENCY_WINDOW: usize = 512;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Calling this twice is harmless;
/// the second call leaves the first subscriber in place.
pub fn init_logging(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Scan loop counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_cycles: u64,
    pub matches: u64,
    pub repeats: u64,
    pub no_matches: u64,
    pub failures: u64,
    pub stale: u64,
    /// Ticks dropped because a cycle was still in flight
    pub skipped: u64,
    pub avg_latency_ms: f64,
    pub p99_latency_ms: f64,
}

/// Collector for [`ScanStats`]. Cheap to clone.
#[derive(Clone)]
pub struct ScanMetrics {
    stats: Arc<RwLock<ScanStats>>,
    latencies: Arc<RwLock<VecDeque<Duration>>>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(ScanStats::default())),
            latencies: Arc::new(RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW))),
        }
    }

    pub async fn record_skip(&self) {
        self.stats.write().await.skipped += 1;
    }

    /// Record a finished cycle and its latency
    pub async fn record_cycle(&self, outcome: &CycleOutcome, latency: Duration) {
        let mut stats = self.stats.write().await;
        stats.total_cycles += 1;
        match outcome {
            CycleOutcome::Matched(_) => stats.matches += 1,
            CycleOutcome::Repeated(_) => stats.repeats += 1,
            CycleOutcome::NoMatch => stats.no_matches += 1,
            CycleOutcome::Failed(_) => stats.failures += 1,
            CycleOutcome::Stale => stats.stale += 1,
            CycleOutcome::Skipped => stats.skipped += 1,
        }

        let mut latencies = self.latencies.write().await;
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(latency);

        let total_ms: f64 = latencies.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
        stats.avg_latency_ms = total_ms / latencies.len() as f64;

        let mut sorted: Vec<Duration> = latencies.iter().copied().collect();
        sorted.sort();
        let p99_idx = ((sorted.len() as f64 * 0.99) as usize).min(sorted.len() - 1);
        stats.p99_latency_ms = sorted[p99_idx].as_secs_f64() * 1000.0;
    }

    pub async fn snapshot(&self) -> ScanStats {
        self.stats.read().await.clone()
    }

    /// Print metrics to log
    pub async fn print(&self) {
        let stats = self.snapshot().await;
        info!("=== Scan Metrics ===");
        info!("Cycles: {}", stats.total_cycles);
        info!(
            "Matches: {} (repeats {}), no match: {}",
            stats.matches, stats.repeats, stats.no_matches
        );
        info!("Failures: {}, skipped ticks: {}", stats.failures, stats.skipped);
        info!("Avg Latency: {:.2}ms", stats.avg_latency_ms);
        info!("P99 Latency: {:.2}ms", stats.p99_latency_ms);
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}
