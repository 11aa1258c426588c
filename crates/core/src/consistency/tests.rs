use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream;

use super::*;
use crate::errors::Error;
use crate::events::{ChangeFeed, StateEvent};
use crate::settings::{
    RecordSource, SettingKey, SettingValue, SettingsCacheTrait, SettingsRecord,
};
use crate::sync_jobs::{SyncEvent, SyncJobStatus};
use crate::test_support::{
    authoritative_record, group_settings, FakeRemote, FlakyCache, Gate, WriteMode,
};

fn coordinator(
    cache: Arc<FlakyCache>,
    remote: Arc<FakeRemote>,
) -> Arc<ConsistencyCoordinator> {
    Arc::new(ConsistencyCoordinator::new(
        cache,
        remote,
        ChangeFeed::new(64),
    ))
}

async fn next_event<F>(rx: &mut tokio::sync::broadcast::Receiver<StateEvent>, mut pred: F) -> StateEvent
where
    F: FnMut(&StateEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("feed open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event published in time")
}

#[tokio::test]
async fn first_load_without_cache_waits_for_the_remote() {
    let cache = Arc::new(FlakyCache::default());
    let remote = Arc::new(FakeRemote::new().with_settings("g1", group_settings(true, false)));
    let coordinator = coordinator(cache.clone(), remote);

    let record = coordinator.load_entity("g1").await.unwrap();

    assert_eq!(record.source, RecordSource::Authoritative);
    assert_eq!(record.revision, 1);
    assert_eq!(record.fields, group_settings(true, false));
    assert_eq!(coordinator.get_settings_snapshot("g1").unwrap(), record);
    assert_eq!(cache.read_cached_entity("g1").unwrap(), Some(record));
}

#[tokio::test]
async fn first_load_failure_is_load_failed_without_a_stale_copy() {
    let remote = Arc::new(FakeRemote::new());
    remote.set_fetch_fails(true);
    let coordinator = coordinator(Arc::new(FlakyCache::default()), remote);

    let err = coordinator.load_entity("g1").await.unwrap_err();

    assert!(matches!(err, Error::LoadFailed { stale: None, .. }));
    assert!(matches!(
        coordinator.get_settings_snapshot("g1"),
        Err(Error::NotLoaded(_))
    ));
}

#[tokio::test]
async fn cached_load_returns_immediately_then_refreshes_in_background() {
    let cache = Arc::new(FlakyCache::default());
    cache
        .inner
        .write_cached_entity("g1", &authoritative_record("g1", group_settings(false, false), 3))
        .unwrap();
    let remote = Arc::new(FakeRemote::new().with_settings("g1", group_settings(true, true)));
    let coordinator = coordinator(cache.clone(), remote.clone());
    let mut rx = coordinator.subscribe();

    let record = coordinator.load_entity("g1").await.unwrap();
    assert_eq!(record.source, RecordSource::Cached);
    assert_eq!(record.fields, group_settings(false, false));

    let event = next_event(&mut rx, |event| {
        matches!(event, StateEvent::SettingsChanged { record } if record.source == RecordSource::Authoritative)
    })
    .await;
    let StateEvent::SettingsChanged { record } = event else {
        unreachable!()
    };
    assert_eq!(record.revision, 4);
    assert_eq!(record.fields, group_settings(true, true));
    assert_eq!(cache.read_cached_entity("g1").unwrap(), Some(record));
    assert_eq!(remote.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn background_refresh_failure_keeps_cached_copy_and_notifies() {
    let cache = Arc::new(FlakyCache::default());
    cache
        .inner
        .write_cached_entity("g1", &authoritative_record("g1", group_settings(true, false), 2))
        .unwrap();
    let remote = Arc::new(FakeRemote::new());
    remote.set_fetch_fails(true);
    let coordinator = coordinator(cache, remote);
    let mut rx = coordinator.subscribe();

    coordinator.load_entity("g1").await.unwrap();

    let event = next_event(&mut rx, |event| {
        matches!(event, StateEvent::SettingsLoadFailed { .. })
    })
    .await;
    assert!(matches!(event, StateEvent::SettingsLoadFailed { entity_id, .. } if entity_id == "g1"));

    let visible = coordinator.get_settings_snapshot("g1").unwrap();
    assert_eq!(visible.source, RecordSource::Cached);
    assert_eq!(visible.fields, group_settings(true, false));
}

#[tokio::test]
async fn explicit_refresh_failure_carries_the_stale_record() {
    let remote = Arc::new(FakeRemote::new().with_settings("g1", group_settings(false, false)));
    let coordinator = coordinator(Arc::new(FlakyCache::default()), remote.clone());
    coordinator.load_entity("g1").await.unwrap();
    remote.set_fetch_fails(true);

    match coordinator.refresh_entity("g1").await {
        Err(Error::LoadFailed { stale: Some(stale), .. }) => {
            assert_eq!(stale.fields, group_settings(false, false));
        }
        other => panic!("expected LoadFailed with stale copy, got {:?}", other),
    }
}

#[tokio::test]
async fn corrupt_cache_entry_falls_back_to_the_remote() {
    struct BrokenCache;
    impl SettingsCacheTrait for BrokenCache {
        fn read_cached_entity(&self, entity_id: &str) -> crate::Result<Option<SettingsRecord>> {
            Err(crate::CacheError::InvalidRecord {
                entity_id: entity_id.to_string(),
                reason: "unknown field `theme`".to_string(),
            }
            .into())
        }
        fn write_cached_entity(&self, _: &str, _: &SettingsRecord) -> crate::Result<()> {
            Ok(())
        }
        fn delete_cached_entity(&self, _: &str) -> crate::Result<()> {
            Ok(())
        }
    }

    let remote = Arc::new(FakeRemote::new().with_settings("g1", group_settings(true, false)));
    let coordinator = Arc::new(ConsistencyCoordinator::new(
        Arc::new(BrokenCache),
        remote,
        ChangeFeed::default(),
    ));

    let record = coordinator.load_entity("g1").await.unwrap();
    assert_eq!(record.source, RecordSource::Authoritative);
}

#[tokio::test]
async fn refresh_never_clobbers_an_in_flight_change() {
    let write_gate = Gate::default();
    let remote = Arc::new(
        FakeRemote::new()
            .with_settings("g1", group_settings(false, false))
            .with_write_gate(write_gate.clone()),
    );
    let coordinator = coordinator(Arc::new(FlakyCache::default()), remote.clone());
    coordinator.load_entity("g1").await.unwrap();

    let proposing = coordinator.clone();
    let change = tokio::spawn(async move {
        proposing
            .propose_setting_change("g1", SettingKey::HideEmptyAccounts, SettingValue::Bool(true))
            .await
    });
    write_gate.entered.notified().await;
    assert!(coordinator.has_pending_change("g1"));

    let during = coordinator.refresh_entity("g1").await.unwrap();
    assert_eq!(during.source, RecordSource::Optimistic);
    assert!(during.fields.hide_empty_accounts);

    write_gate.release.notify_one();
    let record = change.await.unwrap().unwrap();
    assert!(record.fields.hide_empty_accounts);
    assert_eq!(coordinator.get_settings_snapshot("g1").unwrap(), record);
}

#[tokio::test]
async fn refresh_issued_before_a_confirmed_change_is_discarded() {
    let remote = Arc::new(FakeRemote::new().with_settings("g1", group_settings(false, false)));
    let coordinator = coordinator(Arc::new(FlakyCache::default()), remote.clone());
    coordinator.load_entity("g1").await.unwrap();

    let fetch_gate = Gate::default();
    remote.gate_next_fetch(fetch_gate.clone());
    let refreshing = coordinator.clone();
    let refresh = tokio::spawn(async move { refreshing.refresh_entity("g1").await });
    fetch_gate.entered.notified().await;

    let confirmed = coordinator
        .propose_setting_change("g1", SettingKey::HideEmptyAccounts, SettingValue::Bool(true))
        .await
        .unwrap();
    assert_eq!(confirmed.revision, 2);

    fetch_gate.release.notify_one();
    let after_refresh = refresh.await.unwrap().unwrap();

    assert_eq!(after_refresh, confirmed);
    assert_eq!(coordinator.get_settings_snapshot("g1").unwrap(), confirmed);
}

#[tokio::test]
async fn failed_change_then_deferred_refresh_shows_server_truth() {
    let write_gate = Gate::default();
    let remote = Arc::new(
        FakeRemote::new()
            .with_settings("g1", group_settings(false, false))
            .with_write_gate(write_gate.clone()),
    );
    remote.set_write_mode(WriteMode::Fail);
    let coordinator = coordinator(Arc::new(FlakyCache::default()), remote.clone());
    coordinator.load_entity("g1").await.unwrap();

    let proposing = coordinator.clone();
    let change = tokio::spawn(async move {
        proposing
            .propose_setting_change("g1", SettingKey::HideEmptyAccounts, SettingValue::Bool(true))
            .await
    });
    write_gate.entered.notified().await;

    // Another device changed a different key meanwhile.
    remote.set_stored("g1", group_settings(false, true));
    coordinator.refresh_entity("g1").await.unwrap();

    write_gate.release.notify_one();
    let err = change.await.unwrap().unwrap_err();
    let Error::MutationFailed { restored, .. } = err else {
        panic!("expected MutationFailed");
    };
    assert_eq!(restored.fields, group_settings(false, false));

    let visible = coordinator.get_settings_snapshot("g1").unwrap();
    assert_eq!(visible.fields, group_settings(false, true));
    assert_eq!(visible.source, RecordSource::Authoritative);
    assert_eq!(visible.revision, 2);
}

#[tokio::test]
async fn remove_entity_destroys_record_and_cache_row() {
    let cache = Arc::new(FlakyCache::default());
    let remote = Arc::new(FakeRemote::new().with_settings("g1", group_settings(false, false)));
    let coordinator = coordinator(cache.clone(), remote);
    coordinator.load_entity("g1").await.unwrap();
    assert!(coordinator.is_loaded("g1"));
    let mut rx = coordinator.subscribe();

    assert!(coordinator.remove_entity("g1").unwrap());
    assert!(!coordinator.remove_entity("g1").unwrap());

    assert!(!coordinator.is_loaded("g1"));
    assert!(coordinator.loaded_entities().is_empty());
    assert!(cache.read_cached_entity("g1").unwrap().is_none());
    assert!(matches!(
        rx.try_recv(),
        Ok(StateEvent::SettingsRemoved { entity_id }) if entity_id == "g1"
    ));
}

#[tokio::test]
async fn consume_events_applies_in_receipt_order() {
    let coordinator = coordinator(
        Arc::new(FlakyCache::default()),
        Arc::new(FakeRemote::new()),
    );
    let events = vec![
        SyncEvent::new("w1", SyncJobStatus::Queued).with_generation(1),
        SyncEvent::new("w1", SyncJobStatus::Syncing)
            .with_progress(40)
            .with_generation(1),
        SyncEvent::new("w1", SyncJobStatus::Syncing)
            .with_progress(40)
            .with_generation(1),
        SyncEvent::new("w2", SyncJobStatus::Failed).with_message("Invalid API key"),
        SyncEvent::new("w1", SyncJobStatus::Completed).with_generation(1),
        SyncEvent::new("w1", SyncJobStatus::SyncingDefi).with_generation(1),
    ];

    let summary = coordinator.consume_events(stream::iter(events)).await;

    assert_eq!(
        summary,
        EventStreamSummary {
            applied: 4,
            unchanged: 1,
            stale: 1
        }
    );
    assert_eq!(
        coordinator.get_sync_job_snapshot("w1").status,
        SyncJobStatus::Completed
    );
    assert_eq!(
        coordinator.get_sync_job_snapshot("w2").message.as_deref(),
        Some("Invalid API key")
    );
    assert_eq!(coordinator.sync_job_snapshots().len(), 2);

    let reset = coordinator.reset_sync_job("w1").expect("known job");
    assert_eq!(reset.status, SyncJobStatus::Idle);
    assert_eq!(coordinator.sync_job_tracker().active_count(), 0);
}

#[tokio::test]
async fn writes_only_reach_the_remote_once_per_change() {
    let remote = Arc::new(FakeRemote::new().with_settings("g1", group_settings(false, false)));
    let coordinator = coordinator(Arc::new(FlakyCache::default()), remote.clone());
    coordinator.load_entity("g1").await.unwrap();
    remote.set_write_mode(WriteMode::Fail);

    let _ = coordinator
        .propose_setting_change("g1", SettingKey::SortOrder, SettingValue::Number(4.0))
        .await;

    assert_eq!(remote.writes.load(Ordering::SeqCst), 1);
}
