use std::time::Duration;

use etl::destination::memory::MemoryDestination;
use etl::error::ErrorKind;
use etl::pipeline::Pipeline;
use etl::refresh::memory::MemoryRefresher;
use etl::source::memory::MemorySource;
use etl::state::{WindowBegin, WindowStatus};
use etl::store::state::memory::MemoryStore;
use etl::test_utils::event::PropertyPayload;
use etl::test_utils::faults::{FaultyDestination, FaultyRefresher, FaultyStateStore, SlowSource};
use etl::test_utils::pipeline::{
    create_memory_pipeline, create_pipeline, test_pipeline_config, test_window, within_window,
};
use etl::types::{EntityKey, Sign, WindowFingerprint};
use etl_telemetry::tracing::init_test_tracing;

fn key(property_id: &str) -> EntityKey {
    EntityKey::new("pb.amritsar", property_id)
}

fn payload(property_id: &str) -> PropertyPayload {
    PropertyPayload::new("pb.amritsar", property_id)
}

#[tokio::test]
async fn updates_in_later_window_cancel_state_written_by_earlier_window() {
    init_test_tracing();
    let (pipeline, source, destination, _store, refresher) = create_memory_pipeline("collapse");

    source
        .push(within_window(0, 10), payload("PT-1").usage("RESIDENTIAL").to_json())
        .await;
    source
        .push(within_window(0, 20), payload("PT-2").usage("RESIDENTIAL").to_json())
        .await;
    source
        .push(
            within_window(1, 10),
            payload("PT-1")
                .version(2)
                .modified_after(20)
                .usage("COMMERCIAL")
                .to_json(),
        )
        .await;

    let first = pipeline.run_window(&test_window(0)).await.unwrap();
    assert_eq!(first.records_processed, 2);
    assert_eq!(first.stats.inserts, 2);
    assert!(!first.replayed);

    let second = pipeline.run_window(&test_window(1)).await.unwrap();
    assert_eq!(second.records_processed, 2);
    assert_eq!(second.stats.updates, 1);
    assert_eq!(second.stats.fallback_inserts, 0);

    let sums = destination.sum_of_signs().await;
    assert_eq!(sums[&key("PT-1")], 1);
    assert_eq!(sums[&key("PT-2")], 1);

    let live = destination.live_rows().await;
    let pt1 = &live[&key("PT-1")];
    assert_eq!(pt1.len(), 1);
    assert_eq!(pt1[0].version, 2);
    assert_eq!(pt1[0].attributes.usage_category.as_deref(), Some("COMMERCIAL"));

    // The second window only looked up the updated key.
    assert_eq!(destination.lookups().await, vec![vec![key("PT-1")]]);
    assert_eq!(refresher.refresh_count(), 2);
}

#[tokio::test]
async fn completed_window_is_replayed_without_side_effects() {
    init_test_tracing();
    let (pipeline, source, destination, store, refresher) = create_memory_pipeline("replay");

    source.push(within_window(0, 1), payload("PT-1").to_json()).await;
    source.push(within_window(0, 2), payload("PT-2").to_json()).await;

    let first = pipeline.run_window(&test_window(0)).await.unwrap();
    let replay = pipeline.run_window(&test_window(0)).await.unwrap();

    assert!(replay.replayed);
    assert_eq!(replay.records_processed, first.records_processed);
    assert_eq!(replay.fingerprint, first.fingerprint);
    assert_eq!(source.fetch_count().await, 1);
    assert_eq!(destination.append_calls().await, 1);
    assert_eq!(destination.rows().await.len(), 2);
    assert_eq!(refresher.refresh_count(), 1);
    assert_eq!(store.history().await.len(), 2);
}

#[tokio::test]
async fn two_updates_without_prior_state_chain_within_one_window() {
    init_test_tracing();
    let (pipeline, source, destination, _store, _refresher) = create_memory_pipeline("chain");

    source
        .push(
            within_window(0, 1),
            payload("PT-1").version(1).modified_after(1).status("A").to_json(),
        )
        .await;
    source
        .push(
            within_window(0, 2),
            payload("PT-1").version(2).modified_after(2).status("B").to_json(),
        )
        .await;

    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();
    assert_eq!(outcome.records_processed, 3);
    // The first update had nothing to cancel and is only counted as a fallback insert.
    assert_eq!(outcome.stats.updates, 1);
    assert_eq!(outcome.stats.fallback_inserts, 1);

    let rows = destination.rows().await;
    let summary: Vec<_> = rows
        .iter()
        .map(|row| (row.version, row.sign, row.attributes.status.clone().unwrap()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, Sign::State, "A".to_string()),
            (1, Sign::Cancel, "A".to_string()),
            (2, Sign::State, "B".to_string()),
        ]
    );
    assert_eq!(destination.sum_of_signs().await[&key("PT-1")], 1);
}

#[tokio::test]
async fn insert_only_window_performs_no_lookup() {
    init_test_tracing();
    let (pipeline, source, destination, _store, _refresher) = create_memory_pipeline("inserts");

    for (second, property_id) in ["PT-1", "PT-2", "PT-3", "PT-4", "PT-5"].iter().enumerate() {
        source
            .push(within_window(0, second as i64), payload(property_id).to_json())
            .await;
    }

    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();

    assert_eq!(outcome.records_processed, 5);
    let rows = destination.rows().await;
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|row| row.sign == Sign::State));
    assert!(destination.lookups().await.is_empty());
}

#[tokio::test]
async fn malformed_payloads_are_dropped_without_failing_the_window() {
    init_test_tracing();
    let (pipeline, source, destination, _store, _refresher) = create_memory_pipeline("malformed");

    source.push(within_window(0, 1), "not json").await;
    source
        .push(within_window(0, 2), r#"{"property":{"propertyId":"PT-9","version":1}}"#)
        .await;
    source
        .push(within_window(0, 3), payload("PT-1").land_area("120.5").to_json())
        .await;

    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();

    assert_eq!(outcome.records_processed, 1);
    assert_eq!(outcome.stats.dropped_events, 2);
    let rows = destination.rows().await;
    assert_eq!(rows[0].key, key("PT-1"));
    assert_eq!(rows[0].attributes.land_area, Some(120.5));
}

#[tokio::test]
async fn events_outside_the_window_are_not_processed() {
    init_test_tracing();
    let (pipeline, source, destination, _store, _refresher) = create_memory_pipeline("bounds");

    source.push(within_window(0, 0), payload("PT-1").to_json()).await;
    // Exactly at the end of window 0, so it belongs to window 1.
    source.push(within_window(1, 0), payload("PT-2").to_json()).await;

    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();

    assert_eq!(outcome.records_processed, 1);
    assert_eq!(destination.rows().await[0].key, key("PT-1"));
}

#[tokio::test]
async fn empty_window_completes_without_refresh() {
    init_test_tracing();
    let (pipeline, _source, destination, store, refresher) = create_memory_pipeline("empty");

    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();

    assert_eq!(outcome.records_processed, 0);
    assert_eq!(destination.append_calls().await, 0);
    assert_eq!(refresher.refresh_count(), 0);
    let states = store.window_states().await;
    assert_eq!(states[&outcome.fingerprint].status, WindowStatus::Completed);
}

#[tokio::test]
async fn window_state_is_keyed_by_pipeline_and_window_end() {
    init_test_tracing();
    let (pipeline, _source, _destination, store, _refresher) = create_memory_pipeline("keyed");

    let window = test_window(3);
    let outcome = pipeline.run_window(&window).await.unwrap();

    let expected = WindowFingerprint::new("keyed", window.end());
    assert_eq!(outcome.fingerprint, expected);
    let state = &store.window_states().await[&expected];
    assert_eq!(state.window, window);
    assert_eq!(state.pipeline_name, "keyed");
    assert!(state.completed_at.is_some());
}

#[tokio::test]
async fn lookup_failure_leaves_window_running_and_writes_nothing() {
    init_test_tracing();
    let source = MemorySource::new();
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    let store = MemoryStore::new();
    let pipeline = create_pipeline(
        "lookup_failure",
        source.clone(),
        destination.clone(),
        store.clone(),
        MemoryRefresher::new(),
    );

    source
        .push(within_window(0, 1), payload("PT-1").version(2).modified_after(5).to_json())
        .await;
    destination.fail_lookups(true);

    let err = pipeline.run_window(&test_window(0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StateLookupFailed);
    assert!(destination.inner().rows().await.is_empty());
    let fingerprint = pipeline.fingerprint(&test_window(0));
    assert_eq!(
        store.window_states().await[&fingerprint].status,
        WindowStatus::Running
    );

    // A retry after the fault clears processes the window from scratch.
    destination.fail_lookups(false);
    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();
    assert!(!outcome.replayed);
    assert_eq!(outcome.records_processed, 1);
    assert_eq!(
        store.window_states().await[&fingerprint].status,
        WindowStatus::Completed
    );
}

#[tokio::test]
async fn write_failure_leaves_window_running() {
    init_test_tracing();
    let source = MemorySource::new();
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    let store = MemoryStore::new();
    let refresher = MemoryRefresher::new();
    let pipeline = create_pipeline(
        "write_failure",
        source.clone(),
        destination.clone(),
        store.clone(),
        refresher.clone(),
    );

    source.push(within_window(0, 1), payload("PT-1").to_json()).await;
    destination.fail_appends(true);

    let err = pipeline.run_window(&test_window(0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationWriteFailed);
    assert!(destination.inner().rows().await.is_empty());
    assert_eq!(refresher.refresh_count(), 0);
    let fingerprint = pipeline.fingerprint(&test_window(0));
    assert_eq!(
        store.window_states().await[&fingerprint].status,
        WindowStatus::Running
    );
}

#[tokio::test]
async fn completion_failure_leaves_window_running() {
    init_test_tracing();
    let source = MemorySource::new();
    let destination = MemoryDestination::new();
    let store = FaultyStateStore::wrap(MemoryStore::new());
    let refresher = MemoryRefresher::new();
    let pipeline = create_pipeline(
        "completion_failure",
        source.clone(),
        destination.clone(),
        store.clone(),
        refresher.clone(),
    );

    source.push(within_window(0, 1), payload("PT-1").to_json()).await;
    store.fail_completions(true);

    let err = pipeline.run_window(&test_window(0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StateStoreFailed);
    assert_eq!(refresher.refresh_count(), 0);
    let fingerprint = pipeline.fingerprint(&test_window(0));
    assert_eq!(
        store.inner().window_states().await[&fingerprint].status,
        WindowStatus::Running
    );
}

#[tokio::test]
async fn refresh_failure_is_reported_but_window_stays_completed() {
    init_test_tracing();
    let source = MemorySource::new();
    let destination = MemoryDestination::new();
    let store = MemoryStore::new();
    let refresher = FaultyRefresher::new();
    let pipeline = create_pipeline(
        "refresh_failure",
        source.clone(),
        destination.clone(),
        store.clone(),
        refresher.clone(),
    );

    source.push(within_window(0, 1), payload("PT-1").to_json()).await;
    refresher.fail(true);

    let err = pipeline.run_window(&test_window(0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AggregateRefreshFailed);
    assert_eq!(destination.rows().await.len(), 1);
    let fingerprint = pipeline.fingerprint(&test_window(0));
    let state = &store.window_states().await[&fingerprint];
    assert_eq!(state.status, WindowStatus::Completed);
    assert_eq!(state.records_processed, 1);

    // Re-running the completed window neither writes nor refreshes again.
    refresher.fail(false);
    let replay = pipeline.run_window(&test_window(0)).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(destination.rows().await.len(), 1);
    assert_eq!(refresher.refresh_count(), 1);
}

#[tokio::test]
async fn timed_out_window_is_left_running() {
    init_test_tracing();
    let source = MemorySource::new();
    let destination = MemoryDestination::new();
    let store = MemoryStore::new();
    let mut config = test_pipeline_config("timeout");
    config.execution_timeout_ms = 50;
    let pipeline = Pipeline::new(
        config,
        SlowSource::wrap(source.clone(), Duration::from_secs(5)),
        destination.clone(),
        store.clone(),
        MemoryRefresher::new(),
    );

    source.push(within_window(0, 1), payload("PT-1").to_json()).await;

    let err = pipeline.run_window(&test_window(0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WindowTimeout);
    assert!(destination.rows().await.is_empty());
    let fingerprint = pipeline.fingerprint(&test_window(0));
    assert_eq!(
        store.window_states().await[&fingerprint].status,
        WindowStatus::Running
    );
}

#[tokio::test]
async fn stages_can_be_driven_individually() {
    init_test_tracing();
    let (pipeline, source, destination, store, refresher) = create_memory_pipeline("stages");
    let window = test_window(0);

    source.push(within_window(0, 1), payload("PT-1").to_json()).await;

    let WindowBegin::Fresh(state) = pipeline.begin(&window).await.unwrap() else {
        panic!("expected a fresh window");
    };
    assert_eq!(state.status, WindowStatus::Running);

    let run = pipeline.run(&window).await.unwrap();
    assert_eq!(run.payloads_fetched, 1);
    assert_eq!(run.rows_written, 1);
    assert_eq!(destination.rows().await.len(), 1);

    let outcome = pipeline.complete(state, run).await.unwrap();
    assert_eq!(outcome.records_processed, 1);
    assert_eq!(
        store.window_states().await[&outcome.fingerprint].status,
        WindowStatus::Completed
    );
    // Refreshing is part of `run_window` only.
    assert_eq!(refresher.refresh_count(), 0);

    let again = pipeline.begin(&window).await.unwrap();
    assert_eq!(again.completed_records(), Some(1));
}

#[tokio::test]
async fn concurrent_windows_of_one_pipeline_are_serialized() {
    init_test_tracing();
    let (pipeline, source, destination, _store, _refresher) = create_memory_pipeline("serial");

    source
        .push(within_window(0, 1), payload("PT-1").status("A").to_json())
        .await;
    source
        .push(
            within_window(1, 1),
            payload("PT-1").version(2).modified_after(20).status("B").to_json(),
        )
        .await;

    let window_0 = test_window(0);
    let window_1 = test_window(1);
    let (first, second) = tokio::join!(
        pipeline.run_window(&window_0),
        pipeline.run_window(&window_1)
    );
    first.unwrap();
    second.unwrap();

    // Windows run in submission order, so the update chains onto the insert.
    assert_eq!(destination.sum_of_signs().await[&key("PT-1")], 1);
    let live = destination.live_rows().await;
    assert_eq!(live[&key("PT-1")].len(), 1);
    assert_eq!(live[&key("PT-1")][0].version, 2);
    assert_eq!(destination.lookups().await, vec![vec![key("PT-1")]]);
}
