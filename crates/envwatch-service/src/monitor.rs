//! On-demand lookups.
//!
//! [`EnvMonitor`] is the surface other parts of the system call into:
//! current conditions for a pin or an arbitrary point, the recorded history
//! of a pin, and a manual collection trigger.

use std::sync::Arc;

use tracing::{debug, warn};

use envwatch_core::{AdapterSet, Clock, LocationDirectory, ObservationHistory};
use envwatch_types::{Coordinates, DataSource, LocationRef, Observation, ProviderKind};

use crate::backend::Backends;
use crate::config::DEFAULT_RETENTION_DAYS;
use crate::scheduler::{Scheduler, TickOutcome, TickReport};

/// What to look up.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A monitored location by id.
    Location(String),
    /// An arbitrary point. Never recorded to history.
    Coordinates(Coordinates),
}

/// Errors from the monitor facade.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Location not found: {0}")]
    LocationNotFound(String),
    #[error("Provider {0} is not enabled")]
    ProviderDisabled(ProviderKind),
    #[error(transparent)]
    Backend(#[from] envwatch_core::Error),
}

/// Entry point for current and historical observations.
#[derive(Clone)]
pub struct EnvMonitor {
    adapters: AdapterSet,
    directory: Arc<dyn LocationDirectory>,
    history: Arc<dyn ObservationHistory>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<Scheduler>,
    retention_days: u32,
}

impl std::fmt::Debug for EnvMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvMonitor")
            .field("adapters", &self.adapters)
            .field("retention_days", &self.retention_days)
            .finish_non_exhaustive()
    }
}

impl EnvMonitor {
    pub fn new(
        adapters: AdapterSet,
        backends: Backends,
        clock: Arc<dyn Clock>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            adapters,
            directory: backends.directory,
            history: backends.history,
            clock,
            scheduler,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Upper bound for [`EnvMonitor::history`] windows.
    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days.max(1);
        self
    }

    /// Current observation for a pin or point.
    ///
    /// Provider failures never surface here; they resolve to a degraded
    /// observation. Only an unknown pin or a disabled provider is an error.
    pub async fn current_observation(
        &self,
        target: Target,
        kind: ProviderKind,
    ) -> Result<Observation, MonitorError> {
        let adapter = self
            .adapters
            .get(kind)
            .ok_or(MonitorError::ProviderDisabled(kind))?;

        let location = match target {
            Target::Location(id) => match self.directory.find_location(&id).await? {
                Some(location) => location.location_ref(),
                None => return Err(MonitorError::LocationNotFound(id)),
            },
            Target::Coordinates(at) => LocationRef::point(at),
        };

        let observation = adapter.fetch_current(&location).await;

        // Fresh results for a pin join its history
        if let Some(id) = location.location_id.as_deref()
            && observation.error.is_none()
            && matches!(observation.source, DataSource::Live | DataSource::Estimated)
        {
            match self.history.append(id, &observation).await {
                Ok(recorded) => debug!("Recorded {} for {}: {}", kind, id, recorded),
                Err(e) => warn!("Could not record {} for {}: {}", kind, id, e),
            }
        }

        Ok(observation)
    }

    /// Recorded observations for a pin over the last `days` days, most
    /// recent first.
    ///
    /// `days` is clamped to between one day and the retention window. An
    /// empty history is an empty result, not an error.
    pub async fn history(
        &self,
        location_id: &str,
        kind: ProviderKind,
        days: u32,
    ) -> Result<Vec<Observation>, MonitorError> {
        let days = days.clamp(1, self.retention_days);
        let since = self.clock.now() - time::Duration::days(i64::from(days));
        Ok(self.history.query(location_id, kind, since).await?)
    }

    /// Run a collection tick now. Skipped if one is already running.
    pub async fn trigger_collection_now(&self) -> TickOutcome<TickReport> {
        self.scheduler.run_collection().await
    }

    /// Kinds with an enabled provider.
    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.adapters.kinds()
    }
}
