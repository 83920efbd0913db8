//! Shared service state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::info;

use envwatch_core::{AdapterSet, Clock, HttpTransport, ReqwestTransport, SystemClock};
use envwatch_core::Adapter;
use envwatch_store::Store;
use envwatch_types::{DataSource, ProviderKind};

use crate::backend::{Backends, SqliteBackend};
use crate::config::{Config, ConfigError};
use crate::monitor::EnvMonitor;
use crate::scheduler::{CellReport, CellStatus, Scheduler, SchedulerSettings, TickReport};

/// Everything the binary needs, wired together.
pub struct AppState {
    /// Configuration the service was started with.
    pub config: Config,
    /// The data store.
    pub store: Arc<Mutex<Store>>,
    /// Periodic collection and maintenance.
    pub scheduler: Arc<Scheduler>,
    /// On-demand lookups.
    pub monitor: EnvMonitor,
}

impl AppState {
    /// Wire the service over a store using the real HTTP transport and
    /// system clock.
    pub fn new(store: Store, config: Config) -> Result<Arc<Self>, ConfigError> {
        Self::with_parts(
            store,
            config,
            Arc::new(ReqwestTransport::new()),
            Arc::new(SystemClock),
        )
    }

    /// Wire the service with an explicit transport and clock.
    pub fn with_parts(
        store: Store,
        config: Config,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ConfigError> {
        let settings = SchedulerSettings::from_config(&config.collection)?;

        let store = Arc::new(Mutex::new(store));
        let backends = Backends::sqlite(SqliteBackend::new(Arc::clone(&store), Arc::clone(&clock)));
        let adapters = build_adapters(&config, transport, &backends, &clock);

        info!(
            "Configured providers: {}",
            adapters
                .kinds()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let scheduler = Arc::new(Scheduler::new(
            adapters.clone(),
            backends.clone(),
            Arc::clone(&clock),
            settings,
        ));
        let monitor = EnvMonitor::new(adapters, backends, clock, Arc::clone(&scheduler))
            .with_retention_days(config.collection.retention_days);

        Ok(Arc::new(Self {
            config,
            store,
            scheduler,
            monitor,
        }))
    }
}

/// One adapter per enabled provider, all sharing the same backends.
pub fn build_adapters(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
    backends: &Backends,
    clock: &Arc<dyn Clock>,
) -> AdapterSet {
    let mut adapters = AdapterSet::new();
    for provider in config.providers.build_providers(transport, clock) {
        let timeout = config.providers.fetch_timeout(provider.kind());
        adapters.insert(
            Adapter::new(
                provider,
                Arc::clone(&backends.cache),
                Arc::clone(&backends.history),
                Arc::clone(clock),
            )
            .with_timeout(timeout),
        );
    }
    adapters
}

/// Running state and statistics for the scheduler.
pub struct SchedulerState {
    /// Whether the periodic loops are running.
    running: AtomicBool,
    /// When the loops were started (Unix timestamp).
    started_at: AtomicU64,
    /// Whether a collection tick is in progress.
    collecting: AtomicBool,
    /// Completed collection ticks.
    ticks: AtomicU64,
    /// Channel to signal the loops to stop.
    stop_tx: watch::Sender<bool>,
    /// Receiver for stop signal (cloned by each loop).
    stop_rx: watch::Receiver<bool>,
    /// Per-provider collection stats.
    pub provider_stats: RwLock<BTreeMap<ProviderKind, ProviderStats>>,
    /// Report of the last completed collection tick.
    pub last_report: RwLock<Option<TickReport>>,
}

impl SchedulerState {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            collecting: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            provider_stats: RwLock::new(BTreeMap::new()),
            last_report: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the loops as started or stopped.
    pub fn set_running(&self, running: bool, now: OffsetDateTime) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            self.started_at
                .store(now.unix_timestamp().max(0) as u64, Ordering::SeqCst);
        }
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::SeqCst)
    }

    pub(crate) fn set_collecting(&self, collecting: bool) {
        self.collecting.store(collecting, Ordering::SeqCst);
    }

    /// Number of completed collection ticks.
    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal all loops to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Reset the stop signal (for restarting).
    pub fn reset_stop(&self) {
        let _ = self.stop_tx.send(false);
    }

    /// Fold a finished tick into the per-provider stats.
    pub(crate) async fn record_tick(&self, report: TickReport) {
        {
            let mut stats = self.provider_stats.write().await;
            for cell in &report.cells {
                stats
                    .entry(cell.kind)
                    .or_insert_with(|| ProviderStats::new(cell.kind))
                    .record(cell, report.finished_at);
            }
        }
        self.ticks.fetch_add(1, Ordering::SeqCst);
        *self.last_report.write().await = Some(report);
    }

    /// Snapshot of the per-provider stats.
    pub async fn stats(&self) -> Vec<ProviderStats> {
        self.provider_stats.read().await.values().cloned().collect()
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Collection statistics for a single provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub kind: ProviderKind,
    /// Cells answered live, from cache or from the static table.
    pub success_count: u64,
    /// Cells answered from history or as unavailable.
    pub degraded_count: u64,
    /// Cells that panicked or could not be recorded.
    pub failure_count: u64,
    /// Cells skipped by the pollen dedupe window.
    pub skipped_count: u64,
    /// Source of the most recent answer.
    pub last_source: Option<DataSource>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

impl ProviderStats {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            success_count: 0,
            degraded_count: 0,
            failure_count: 0,
            skipped_count: 0,
            last_source: None,
            last_success_at: None,
            last_error_at: None,
            last_error: None,
        }
    }

    fn record(&mut self, cell: &CellReport, at: OffsetDateTime) {
        if cell.source.is_some() {
            self.last_source = cell.source;
        }
        match cell.status {
            CellStatus::Success => {
                self.success_count += 1;
                self.last_success_at = Some(at);
            }
            CellStatus::Degraded => self.degraded_count += 1,
            CellStatus::Failed => self.failure_count += 1,
            CellStatus::Skipped => self.skipped_count += 1,
        }
        if let Some(error) = &cell.error {
            self.last_error_at = Some(at);
            self.last_error = Some(error.clone());
        }
    }
}
