//! Periodic collection and maintenance.
//!
//! Three loops run on their own cadence:
//!
//! - **collection**: every active location is looked up through every
//!   adapter, and each observation without an error annotation is appended
//!   to history.
//! - **cache prune**: expired cache entries are purged.
//! - **history prune**: history past the retention window and expired
//!   sessions are deleted.
//!
//! A job requested while the same job is still running is skipped, not
//! queued. Each (location, provider) cell runs in its own task, so one
//! failing or panicking provider never stops the rest of the tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use envwatch_core::{Adapter, AdapterSet, Clock, ObservationHistory};
use envwatch_types::{DataSource, MonitoredLocation, ProviderKind};

use crate::backend::Backends;
use crate::config::{CollectionConfig, ConfigError, ValidationError, parse_cadence};
use crate::state::SchedulerState;

/// Consecutive bad ticks for one cell before the failure is logged at error level.
const ESCALATE_AFTER: u32 = 4;

/// Resolved scheduling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub collection_interval: Duration,
    pub cache_prune_interval: Duration,
    pub history_prune_interval: Duration,
    /// History older than this is pruned.
    pub retention: time::Duration,
    /// Pollen is skipped for a location with a record newer than this.
    pub pollen_dedupe: time::Duration,
    /// Cells fetched at once.
    pub max_concurrency: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(3600),
            cache_prune_interval: Duration::from_secs(6 * 3600),
            history_prune_interval: Duration::from_secs(86_400),
            retention: time::Duration::days(30),
            pollen_dedupe: time::Duration::hours(2),
            max_concurrency: 8,
        }
    }
}

impl SchedulerSettings {
    /// Resolve the `[collection]` section.
    pub fn from_config(config: &CollectionConfig) -> Result<Self, ConfigError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let cadence = |field: &str, expr: &str| {
            parse_cadence(expr)
                .map_err(|message| ConfigError::Validation(vec![ValidationError::new(field, message)]))
        };

        Ok(Self {
            collection_interval: cadence("collection.cadence", &config.cadence)?,
            cache_prune_interval: cadence(
                "collection.cache_prune_cadence",
                &config.cache_prune_cadence,
            )?,
            history_prune_interval: cadence(
                "collection.history_prune_cadence",
                &config.history_prune_cadence,
            )?,
            retention: time::Duration::days(i64::from(config.retention_days)),
            pollen_dedupe: time::Duration::hours(i64::from(config.pollen_dedupe_hours)),
            max_concurrency: config.max_concurrency,
        })
    }
}

/// Result of asking for a job to run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum TickOutcome<T> {
    /// The job ran.
    Completed(T),
    /// The same job was already running.
    Skipped,
}

impl<T> TickOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped)
    }

    /// The report, if the job ran.
    pub fn completed(self) -> Option<T> {
        match self {
            TickOutcome::Completed(report) => Some(report),
            TickOutcome::Skipped => None,
        }
    }
}

/// How one (location, provider) cell ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Answered live, from cache or from a static table.
    Success,
    /// Answered from history or as unavailable.
    Degraded,
    /// Skipped by the pollen dedupe window.
    Skipped,
    /// The task panicked or the result could not be recorded.
    Failed,
}

/// Outcome of one cell in a collection tick.
#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub location_id: String,
    pub kind: ProviderKind,
    pub status: CellStatus,
    /// Source of the observation, when one was produced.
    pub source: Option<DataSource>,
    /// Whether a new history record was written.
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CellReport {
    fn new(location_id: String, kind: ProviderKind, status: CellStatus) -> Self {
        Self {
            location_id,
            kind,
            status,
            source: None,
            recorded: false,
            error: None,
        }
    }
}

/// Outcome of one collection tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    /// Active locations enumerated.
    pub locations: usize,
    /// One entry per (location, provider), in location then provider order.
    pub cells: Vec<CellReport>,
    /// Set when the locations could not be listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TickReport {
    /// Number of cells with the given status.
    pub fn count(&self, status: CellStatus) -> usize {
        self.cells.iter().filter(|c| c.status == status).count()
    }

    /// The cell for a location and kind.
    pub fn cell(&self, location_id: &str, kind: ProviderKind) -> Option<&CellReport> {
        self.cells
            .iter()
            .find(|c| c.location_id == location_id && c.kind == kind)
    }
}

/// Outcome of a maintenance pass.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    #[serde(with = "time::serde::rfc3339")]
    pub ran_at: OffsetDateTime,
    /// Expired cache entries removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_entries: Option<usize>,
    /// Retention cutoff applied to history.
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cutoff: Option<OffsetDateTime>,
    /// History records removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<usize>,
    /// Expired sessions removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl MaintenanceReport {
    fn new(ran_at: OffsetDateTime) -> Self {
        Self {
            ran_at,
            cache_entries: None,
            cutoff: None,
            observations: None,
            sessions: None,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Collection,
    CachePrune,
    HistoryPrune,
}

impl Job {
    const ALL: [Job; 3] = [Job::Collection, Job::CachePrune, Job::HistoryPrune];

    fn period(self, settings: &SchedulerSettings) -> Duration {
        match self {
            Job::Collection => settings.collection_interval,
            Job::CachePrune => settings.cache_prune_interval,
            Job::HistoryPrune => settings.history_prune_interval,
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Job::Collection => "collection",
            Job::CachePrune => "cache prune",
            Job::HistoryPrune => "history prune",
        })
    }
}

/// Drives periodic collection and maintenance.
pub struct Scheduler {
    adapters: AdapterSet,
    backends: Backends,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    state: Arc<SchedulerState>,
    collection_guard: Mutex<()>,
    cache_guard: Mutex<()>,
    history_guard: Mutex<()>,
    streaks: std::sync::Mutex<HashMap<(String, ProviderKind), u32>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("adapters", &self.adapters)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        adapters: AdapterSet,
        backends: Backends,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            adapters,
            backends,
            clock,
            settings,
            state: Arc::new(SchedulerState::new()),
            collection_guard: Mutex::new(()),
            cache_guard: Mutex::new(()),
            history_guard: Mutex::new(()),
            streaks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> &Arc<SchedulerState> {
        &self.state
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Spawn the three loops. Each runs once immediately, then on its cadence,
    /// until [`Scheduler::stop`].
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.state.is_running() {
            warn!("Scheduler already running");
            return Vec::new();
        }
        self.state.reset_stop();
        self.state.set_running(true, self.clock.now());

        Job::ALL
            .into_iter()
            .map(|job| {
                let scheduler = Arc::clone(self);
                let stop = self.state.subscribe_stop();
                tokio::spawn(async move { scheduler.job_loop(job, stop).await })
            })
            .collect()
    }

    /// Signal every loop to stop after its current job.
    pub fn stop(&self) {
        info!("Stopping scheduler");
        self.state.signal_stop();
    }

    async fn job_loop(self: Arc<Self>, job: Job, mut stop: watch::Receiver<bool>) {
        let period = job.period(&self.settings);
        info!("Starting {} loop (every {:?})", job, period);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_job(job).await,
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Stopped {} loop", job);
    }

    async fn run_job(&self, job: Job) {
        let skipped = match job {
            Job::Collection => self.run_collection().await.is_skipped(),
            Job::CachePrune => self.run_cache_prune().await.is_skipped(),
            Job::HistoryPrune => self.run_history_prune().await.is_skipped(),
        };
        if skipped {
            info!("Previous {} still running, skipping tick", job);
        }
    }

    /// Collect every active location now, unless a collection is running.
    pub async fn run_collection(&self) -> TickOutcome<TickReport> {
        let Ok(_guard) = self.collection_guard.try_lock() else {
            return TickOutcome::Skipped;
        };

        self.state.set_collecting(true);
        let report = self.collect().await;
        self.state.set_collecting(false);

        info!(
            "Collection tick finished: {} locations, {} ok, {} degraded, {} skipped, {} failed",
            report.locations,
            report.count(CellStatus::Success),
            report.count(CellStatus::Degraded),
            report.count(CellStatus::Skipped),
            report.count(CellStatus::Failed),
        );
        self.state.record_tick(report.clone()).await;
        TickOutcome::Completed(report)
    }

    async fn collect(&self) -> TickReport {
        let started_at = self.clock.now();

        let locations = match self.backends.directory.list_active_locations().await {
            Ok(locations) => locations,
            Err(e) => {
                warn!("Could not list active locations: {}", e);
                return TickReport {
                    started_at,
                    finished_at: self.clock.now(),
                    locations: 0,
                    cells: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        debug!(
            "Collecting {} location(s) from {} provider(s)",
            locations.len(),
            self.adapters.len()
        );

        let cells: Vec<(MonitoredLocation, Arc<Adapter>)> = locations
            .iter()
            .flat_map(|location| {
                self.adapters
                    .iter()
                    .map(move |adapter| (location.clone(), Arc::clone(adapter)))
            })
            .collect();

        let mut reports: Vec<(usize, CellReport)> = futures::stream::iter(cells.into_iter().enumerate())
            .map(|(index, (location, adapter))| async move {
                (index, self.run_cell(location, adapter).await)
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        reports.sort_by_key(|(index, _)| *index);

        TickReport {
            started_at,
            finished_at: self.clock.now(),
            locations: locations.len(),
            cells: reports.into_iter().map(|(_, report)| report).collect(),
            error: None,
        }
    }

    async fn run_cell(&self, location: MonitoredLocation, adapter: Arc<Adapter>) -> CellReport {
        let location_id = location.id.clone();
        let kind = adapter.kind();
        let task = tokio::spawn(collect_cell(
            location,
            adapter,
            Arc::clone(&self.backends.history),
            Arc::clone(&self.clock),
            self.settings.pollen_dedupe,
        ));

        let report = match task.await {
            Ok(report) => report,
            Err(e) => {
                let message = if e.is_panic() {
                    format!("collection task panicked: {}", panic_message(e.into_panic()))
                } else {
                    format!("collection task failed: {}", e)
                };
                let mut report = CellReport::new(location_id, kind, CellStatus::Failed);
                report.error = Some(message);
                report
            }
        };

        self.note_streak(&report);
        report
    }

    fn note_streak(&self, report: &CellReport) {
        let key = (report.location_id.clone(), report.kind);
        let mut streaks = self.streaks.lock().unwrap_or_else(|e| e.into_inner());

        match report.status {
            CellStatus::Success => {
                if streaks.remove(&key).is_some_and(|n| n >= ESCALATE_AFTER) {
                    info!("{} for {} recovered", report.kind, report.location_id);
                }
            }
            CellStatus::Skipped => {}
            CellStatus::Degraded | CellStatus::Failed => {
                let count = streaks.entry(key).or_default();
                *count += 1;
                let reason = report.error.as_deref().unwrap_or("served from history");
                if *count < ESCALATE_AFTER {
                    warn!(
                        "{} for {} degraded: {} (tick {})",
                        report.kind, report.location_id, reason, count
                    );
                } else if *count == ESCALATE_AFTER {
                    error!(
                        "{} for {} degraded for {} consecutive ticks, will keep trying silently: {}",
                        report.kind, report.location_id, count, reason
                    );
                }
            }
        }
    }

    /// Purge expired cache entries now, unless a purge is running.
    pub async fn run_cache_prune(&self) -> TickOutcome<MaintenanceReport> {
        let Ok(_guard) = self.cache_guard.try_lock() else {
            return TickOutcome::Skipped;
        };

        let now = self.clock.now();
        let mut report = MaintenanceReport::new(now);
        match self.backends.cache.purge_expired(now).await {
            Ok(removed) => {
                info!("Purged {} expired cache entries", removed);
                report.cache_entries = Some(removed);
            }
            Err(e) => {
                warn!("Cache purge failed: {}", e);
                report.errors.push(e.to_string());
            }
        }
        TickOutcome::Completed(report)
    }

    /// Delete history past retention and expired sessions now, unless a
    /// pass is running.
    pub async fn run_history_prune(&self) -> TickOutcome<MaintenanceReport> {
        let Ok(_guard) = self.history_guard.try_lock() else {
            return TickOutcome::Skipped;
        };

        let now = self.clock.now();
        let cutoff = now - self.settings.retention;
        let mut report = MaintenanceReport::new(now);
        report.cutoff = Some(cutoff);

        match self.backends.history.prune_older_than(cutoff).await {
            Ok(removed) => {
                info!("Pruned {} history records older than {}", removed, cutoff);
                report.observations = Some(removed);
            }
            Err(e) => {
                warn!("History prune failed: {}", e);
                report.errors.push(e.to_string());
            }
        }

        match self.backends.sessions.delete_expired_sessions(now).await {
            Ok(removed) => {
                info!("Deleted {} expired sessions", removed);
                report.sessions = Some(removed);
            }
            Err(e) => {
                warn!("Session cleanup failed: {}", e);
                report.errors.push(e.to_string());
            }
        }

        TickOutcome::Completed(report)
    }
}

/// Look up one cell and record the result.
async fn collect_cell(
    location: MonitoredLocation,
    adapter: Arc<Adapter>,
    history: Arc<dyn ObservationHistory>,
    clock: Arc<dyn Clock>,
    pollen_dedupe: time::Duration,
) -> CellReport {
    let kind = adapter.kind();

    if kind == ProviderKind::Pollen && pollen_dedupe > time::Duration::ZERO {
        match history.most_recent(&location.id, kind).await {
            Ok(Some(previous)) if previous.timestamp > clock.now() - pollen_dedupe => {
                debug!(
                    "Skipping pollen for {}: recorded at {}",
                    location.id, previous.timestamp
                );
                return CellReport::new(location.id, kind, CellStatus::Skipped);
            }
            Ok(_) => {}
            Err(e) => warn!("Pollen dedupe check failed for {}: {}", location.id, e),
        }
    }

    let observation = adapter.fetch_current(&location.location_ref()).await;
    let status = match observation.source {
        DataSource::HistoricalFallback | DataSource::Unavailable => CellStatus::Degraded,
        _ => CellStatus::Success,
    };
    let mut report = CellReport::new(location.id.clone(), kind, status);
    report.source = Some(observation.source);
    report.error = observation.error.clone();

    if observation.error.is_none() {
        match history.append(&location.id, &observation).await {
            Ok(recorded) => report.recorded = recorded,
            Err(e) => {
                warn!("Could not record {} for {}: {}", kind, location.id, e);
                report.status = CellStatus::Failed;
                report.error = Some(e.to_string());
            }
        }
    }

    report
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
