#![cfg(all(feature = "clickhouse", feature = "test-utils"))]

use std::collections::BTreeMap;

use etl::pipeline::Pipeline;
use etl::state::WindowStatus;
use etl::store::state::WindowStateStore;
use etl::test_utils::event::PropertyPayload;
use etl::test_utils::pipeline::{test_pipeline_config, test_window, within_window};
use etl_destinations::clickhouse::PropertyCollapsingRow;
use etl_destinations::clickhouse::test_utils::{
    ClickHouseTestDatabase, setup_clickhouse_database, skip_if_missing_clickhouse_env_vars,
};
use etl_telemetry::tracing::init_test_tracing;

const TOPIC: &str = "property-events";

fn payload(property_id: &str) -> PropertyPayload {
    PropertyPayload::new("pb.amritsar", property_id)
}

async fn stage(db: &ClickHouseTestDatabase, window: u32, second: i64, payload: PropertyPayload) {
    let consumed_at = within_window(window, second).timestamp_millis();
    db.stage_payloads(TOPIC, &[(consumed_at, payload.to_json())])
        .await;
}

async fn collapsing_rows(db: &ClickHouseTestDatabase) -> Vec<PropertyCollapsingRow> {
    db.query(&format!(
        "SELECT ?fields FROM `{}` ORDER BY property_id, version, sign",
        db.tables().collapsing
    ))
    .await
}

fn sum_of_signs(rows: &[PropertyCollapsingRow]) -> BTreeMap<String, i64> {
    let mut sums = BTreeMap::new();
    for row in rows {
        *sums.entry(row.property_id.clone()).or_insert(0) += i64::from(row.sign);
    }
    sums
}

#[tokio::test(flavor = "multi_thread")]
async fn windows_collapse_updates_against_persisted_rows() {
    if skip_if_missing_clickhouse_env_vars() {
        return;
    }
    init_test_tracing();

    let db = setup_clickhouse_database().await;
    let config = test_pipeline_config("clickhouse_collapse");

    stage(&db, 0, 5, payload("PT-1").usage("RESIDENTIAL")).await;
    stage(&db, 0, 6, payload("PT-2").usage("RESIDENTIAL")).await;
    stage(
        &db,
        1,
        5,
        payload("PT-1")
            .version(2)
            .modified_after(20)
            .usage("COMMERCIAL"),
    )
    .await;
    stage(
        &db,
        1,
        6,
        payload("PT-1")
            .version(3)
            .modified_after(21)
            .usage("INDUSTRIAL"),
    )
    .await;

    let pipeline = Pipeline::new(
        config.clone(),
        db.build_source(TOPIC),
        db.build_destination(&config),
        db.build_state_store(),
        db.build_refresher(),
    );

    let first = pipeline.run_window(&test_window(0)).await.unwrap();
    assert_eq!(first.records_processed, 2);

    let second = pipeline.run_window(&test_window(1)).await.unwrap();
    assert_eq!(second.records_processed, 4);
    assert_eq!(second.stats.updates, 2);
    assert_eq!(second.stats.fallback_inserts, 0);

    let rows = collapsing_rows(&db).await;
    assert_eq!(rows.len(), 6);

    let sums = sum_of_signs(&rows);
    assert_eq!(sums["PT-1"], 1);
    assert_eq!(sums["PT-2"], 1);

    let live_pt1_versions: Vec<u64> = rows
        .iter()
        .filter(|row| row.property_id == "PT-1" && row.sign == 1)
        .map(|row| row.version)
        .collect();
    assert_eq!(live_pt1_versions, vec![1, 2, 3]);

    let state = db
        .build_state_store()
        .get_window_state(&pipeline.fingerprint(&test_window(1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.status, WindowStatus::Completed);
    assert_eq!(state.records_processed, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_window_is_not_written_twice() {
    if skip_if_missing_clickhouse_env_vars() {
        return;
    }
    init_test_tracing();

    let db = setup_clickhouse_database().await;
    let config = test_pipeline_config("clickhouse_replay");

    stage(&db, 0, 1, payload("PT-1")).await;

    let pipeline = Pipeline::new(
        config.clone(),
        db.build_source(TOPIC),
        db.build_destination(&config),
        db.build_state_store(),
        db.build_refresher(),
    );

    let first = pipeline.run_window(&test_window(0)).await.unwrap();
    assert!(!first.replayed);

    let replay = pipeline.run_window(&test_window(0)).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.records_processed, 1);

    assert_eq!(collapsing_rows(&db).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn staged_payloads_outside_the_window_are_ignored() {
    if skip_if_missing_clickhouse_env_vars() {
        return;
    }
    init_test_tracing();

    let db = setup_clickhouse_database().await;
    let config = test_pipeline_config("clickhouse_bounds");

    // Exactly at the end of window 0, so it belongs to window 1.
    let boundary = test_window(0).end().timestamp_millis();
    db.stage_payloads(TOPIC, &[(boundary, payload("PT-9").to_json())])
        .await;
    stage(&db, 0, 30, payload("PT-1")).await;
    db.stage_payloads(
        "other-topic",
        &[(
            within_window(0, 40).timestamp_millis(),
            payload("PT-2").to_json(),
        )],
    )
    .await;

    let pipeline = Pipeline::new(
        config.clone(),
        db.build_source(TOPIC),
        db.build_destination(&config),
        db.build_state_store(),
        db.build_refresher(),
    );

    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();
    assert_eq!(outcome.records_processed, 1);

    let rows = collapsing_rows(&db).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].property_id, "PT-1");
}
