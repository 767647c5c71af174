use etl::error::ErrorKind;
use etl::failpoints::{RUN_WINDOW_AFTER_BEGIN, RUN_WINDOW_BEFORE_COMPLETE};
use etl::policy::{RetryDirective, build_error_handling_policy};
use etl::state::WindowStatus;
use etl::test_utils::event::PropertyPayload;
use etl::test_utils::failpoints::CustomFailScenario;
use etl::test_utils::pipeline::{create_memory_pipeline, test_window, within_window};
use etl_telemetry::tracing::init_test_tracing;

#[tokio::test]
async fn failure_between_write_and_completion_leaves_window_running() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(RUN_WINDOW_BEFORE_COMPLETE, "1*return(timed_retry)")]);

    let (pipeline, source, destination, store, refresher) =
        create_memory_pipeline("before_complete");
    source
        .push(within_window(0, 1), PropertyPayload::new("t", "PT-1").to_json())
        .await;

    let err = pipeline.run_window(&test_window(0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WithTimedRetry);
    assert_eq!(
        build_error_handling_policy(&err).retry_directive(),
        RetryDirective::Timed
    );
    // Rows are durable but the window was never completed.
    assert_eq!(destination.rows().await.len(), 1);
    assert_eq!(refresher.refresh_count(), 0);
    let fingerprint = pipeline.fingerprint(&test_window(0));
    assert_eq!(
        store.window_states().await[&fingerprint].status,
        WindowStatus::Running
    );

    // The fail point fired once, the retry re-processes the window and completes it.
    let outcome = pipeline.run_window(&test_window(0)).await.unwrap();
    assert!(!outcome.replayed);
    assert_eq!(
        store.window_states().await[&fingerprint].status,
        WindowStatus::Completed
    );
    assert_eq!(refresher.refresh_count(), 1);
}

#[tokio::test]
async fn failure_after_begin_fetches_nothing() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(RUN_WINDOW_AFTER_BEGIN, "return")]);

    let (pipeline, source, destination, store, _refresher) = create_memory_pipeline("after_begin");
    source
        .push(within_window(0, 1), PropertyPayload::new("t", "PT-1").to_json())
        .await;

    let err = pipeline.run_window(&test_window(0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WithNoRetry);
    assert_eq!(
        build_error_handling_policy(&err).retry_directive(),
        RetryDirective::NoRetry
    );
    assert_eq!(source.fetch_count().await, 0);
    assert!(destination.rows().await.is_empty());
    let fingerprint = pipeline.fingerprint(&test_window(0));
    assert_eq!(
        store.window_states().await[&fingerprint].status,
        WindowStatus::Running
    );
}
