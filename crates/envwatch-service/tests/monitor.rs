//! The monitor facade, over in-memory backends and over SQLite.

mod common;

use std::sync::Arc;

use envwatch_core::mock::sample_measurement;
use envwatch_core::{Error, ManualClock, MockTransport, ObservationHistory};
use envwatch_service::{AppState, Config, EnvMonitor, MonitorError, Target};
use envwatch_store::Store;
use envwatch_types::{Coordinates, DataSource, Observation, ProviderKind};

use common::{Harness, START, pin};

fn monitor(harness: &Harness) -> EnvMonitor {
    EnvMonitor::new(
        harness.adapters.clone(),
        harness.backends.clone(),
        harness.clock.clone(),
        harness.scheduler(),
    )
}

#[tokio::test]
async fn pin_lookup_is_recorded_to_history() {
    let harness = Harness::new(
        vec![pin("boulder", 40.015, -105.2705)],
        &[ProviderKind::Weather],
    );
    let monitor = monitor(&harness);

    let obs = monitor
        .current_observation(Target::Location("boulder".into()), ProviderKind::Weather)
        .await
        .unwrap();

    assert_eq!(obs.source, DataSource::Live);
    assert_eq!(obs.location.location_id.as_deref(), Some("boulder"));
    assert_eq!(obs.timestamp, START);
    assert_eq!(harness.history.len().await, 1);

    // A second lookup is a cache hit and adds nothing
    let again = monitor
        .current_observation(Target::Location("boulder".into()), ProviderKind::Weather)
        .await
        .unwrap();
    assert_eq!(again.source, DataSource::Cached);
    assert_eq!(harness.history.len().await, 1);
}

#[tokio::test]
async fn point_lookup_is_not_recorded() {
    let harness = Harness::new(Vec::new(), &[ProviderKind::AirQuality]);
    let monitor = monitor(&harness);
    let at = Coordinates::new(47.6062, -122.3321).unwrap();

    let obs = monitor
        .current_observation(Target::Coordinates(at), ProviderKind::AirQuality)
        .await
        .unwrap();

    assert!(obs.is_available());
    assert_eq!(obs.location.location_id, None);
    assert_eq!(harness.history.len().await, 0);
}

#[tokio::test]
async fn unknown_location_and_disabled_provider_are_errors() {
    let harness = Harness::new(Vec::new(), &[ProviderKind::Weather]);
    let monitor = monitor(&harness);

    let err = monitor
        .current_observation(Target::Location("nowhere".into()), ProviderKind::Weather)
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::LocationNotFound(id) if id == "nowhere"));

    let at = Coordinates::new(0.0, 0.0).unwrap();
    let err = monitor
        .current_observation(Target::Coordinates(at), ProviderKind::Wildfire)
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::ProviderDisabled(ProviderKind::Wildfire)));
}

#[tokio::test]
async fn failed_lookup_without_history_is_explicitly_unavailable() {
    let harness = Harness::new(
        vec![pin("boulder", 40.015, -105.2705)],
        &[ProviderKind::Pollen],
    );
    harness
        .provider(ProviderKind::Pollen)
        .fail_with(Error::NoDataAvailable("no pollen data for this area".into()));
    let monitor = monitor(&harness);

    let obs = monitor
        .current_observation(Target::Location("boulder".into()), ProviderKind::Pollen)
        .await
        .unwrap();

    assert_eq!(obs.source, DataSource::Unavailable);
    assert!(obs.data.is_none());
    assert!(obs.error.as_deref().unwrap().contains("no pollen data"));
    assert_eq!(harness.history.len().await, 0);
}

#[tokio::test]
async fn history_window_is_clamped_and_newest_first() {
    let location = pin("boulder", 40.015, -105.2705);
    let harness = Harness::new(vec![location.clone()], &[ProviderKind::Weather]);
    for days in [40, 20, 5, 1] {
        let obs = Observation::new(
            location.location_ref(),
            START - time::Duration::days(days),
            DataSource::Live,
            sample_measurement(ProviderKind::Weather),
        );
        harness.history.append("boulder", &obs).await.unwrap();
    }
    let monitor = monitor(&harness).with_retention_days(30);

    let week = monitor
        .history("boulder", ProviderKind::Weather, 7)
        .await
        .unwrap();
    let ages: Vec<_> = week.iter().map(|o| (START - o.timestamp).whole_days()).collect();
    assert_eq!(ages, vec![1, 5]);

    // Beyond retention is clamped to retention
    let all = monitor
        .history("boulder", ProviderKind::Weather, 365)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    // Zero days still means the last day
    let today = monitor
        .history("boulder", ProviderKind::Weather, 0)
        .await
        .unwrap();
    assert_eq!(today.len(), 1);

    let empty = monitor
        .history("boulder", ProviderKind::Pollen, 7)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn trigger_collection_runs_a_tick() {
    let harness = Harness::new(
        vec![pin("boulder", 40.015, -105.2705)],
        &[ProviderKind::Weather, ProviderKind::Radon],
    );
    let monitor = monitor(&harness);

    let report = monitor
        .trigger_collection_now()
        .await
        .completed()
        .expect("no tick was running");
    assert_eq!(report.cells.len(), 2);
    assert_eq!(harness.history.len().await, 2);
}

fn radon_only_config() -> Config {
    let mut config = Config::default();
    config.providers.air_quality.common.enabled = false;
    config.providers.weather.common.enabled = false;
    config.providers.pollen.enabled = false;
    config.providers.wildfire.common.enabled = false;
    config
}

#[tokio::test]
async fn app_state_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = radon_only_config();
    config.storage.path = dir.path().join("envwatch.db");

    let store = Store::open(&config.storage.path).unwrap();
    store
        .upsert_location(&pin("denver", 39.7392, -104.9903))
        .unwrap();

    let clock = Arc::new(ManualClock::new(START));
    let state = AppState::with_parts(
        store,
        config,
        Arc::new(MockTransport::new()),
        clock.clone(),
    )
    .unwrap();
    assert_eq!(
        state.monitor.kinds().collect::<Vec<_>>(),
        vec![ProviderKind::Radon]
    );

    // Table lookups are labelled as estimates and recorded for pins
    let obs = state
        .monitor
        .current_observation(Target::Location("denver".into()), ProviderKind::Radon)
        .await
        .unwrap();
    assert_eq!(obs.source, DataSource::Estimated);
    assert!(obs.radon().is_some());
    assert_eq!(
        state.store.lock().await.count_observations(Some("denver")).unwrap(),
        1
    );

    // A point outside every region has no data rather than a made-up zone
    let ocean = Coordinates::new(0.0, -140.0).unwrap();
    let obs = state
        .monitor
        .current_observation(Target::Coordinates(ocean), ProviderKind::Radon)
        .await
        .unwrap();
    assert_eq!(obs.source, DataSource::Unavailable);
    assert!(obs.error.is_some());

    // Collection a week later writes a second record
    clock.advance(time::Duration::days(8));
    let report = state.monitor.trigger_collection_now().await.completed().unwrap();
    assert!(report.cell("denver", ProviderKind::Radon).unwrap().recorded);

    let history = state
        .monitor
        .history("denver", ProviderKind::Radon, 30)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp > history[1].timestamp);

    // Removing the pin cascades and later appends do not resurrect it
    assert!(state.store.lock().await.remove_location("denver").unwrap());
    let late = Observation::new(
        pin("denver", 39.7392, -104.9903).location_ref(),
        START + time::Duration::days(9),
        DataSource::Estimated,
        sample_measurement(ProviderKind::Radon),
    );
    let backends = envwatch_service::Backends::sqlite(envwatch_service::SqliteBackend::new(
        Arc::clone(&state.store),
        clock.clone(),
    ));
    assert!(backends.history.append("denver", &late).await.is_err());
    let store = state.store.lock().await;
    assert!(store.get_location("denver").unwrap().is_none());
    assert_eq!(store.count_observations(None).unwrap(), 0);
}
