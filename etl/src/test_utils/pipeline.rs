use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use etl_config::shared::PipelineConfig;

use crate::destination::memory::MemoryDestination;
use crate::destination::{BatchWriter, LatestStateReader};
use crate::pipeline::Pipeline;
use crate::refresh::AggregateRefresher;
use crate::refresh::memory::MemoryRefresher;
use crate::source::EventSource;
use crate::source::memory::MemorySource;
use crate::store::state::WindowStateStore;
use crate::store::state::memory::MemoryStore;
use crate::test_utils::event::t0;
use crate::types::Window;

/// Pipeline over the in-memory collaborators.
pub type MemoryPipeline = Pipeline<MemorySource, MemoryDestination, MemoryStore, MemoryRefresher>;

/// Length of the windows used by tests.
pub const TEST_WINDOW_LENGTH: Duration = Duration::from_secs(15 * 60);

/// Pipeline configuration used by tests: 15 minute windows and a 10 second deadline.
pub fn test_pipeline_config(name: &str) -> PipelineConfig {
    let mut config = PipelineConfig::with_name(name);
    config.execution_timeout_ms = 10_000;
    config
}

/// Returns the `index`-th test window. Window 0 covers `[t0, t0 + 15m)`.
pub fn test_window(index: u32) -> Window {
    let end = t0() + TimeDelta::minutes(15 * (i64::from(index) + 1));
    Window::ending_at(end, TEST_WINDOW_LENGTH).unwrap()
}

/// Returns an instant `seconds` into the `index`-th test window.
pub fn within_window(index: u32, seconds: i64) -> DateTime<Utc> {
    test_window(index).start() + TimeDelta::seconds(seconds)
}

/// Creates a pipeline from the given collaborators with [`test_pipeline_config`].
pub fn create_pipeline<Src, D, S, A>(
    name: &str,
    source: Src,
    destination: D,
    state_store: S,
    refresher: A,
) -> Pipeline<Src, D, S, A>
where
    Src: EventSource + Send + Sync,
    D: LatestStateReader + BatchWriter + Clone + Send + Sync,
    S: WindowStateStore + Send + Sync,
    A: AggregateRefresher + Send + Sync,
{
    Pipeline::new(
        test_pipeline_config(name),
        source,
        destination,
        state_store,
        refresher,
    )
}

/// Creates a pipeline over fresh in-memory collaborators, returning handles to them.
pub fn create_memory_pipeline(
    name: &str,
) -> (
    MemoryPipeline,
    MemorySource,
    MemoryDestination,
    MemoryStore,
    MemoryRefresher,
) {
    let source = MemorySource::new();
    let destination = MemoryDestination::new();
    let store = MemoryStore::new();
    let refresher = MemoryRefresher::new();

    let pipeline = create_pipeline(
        name,
        source.clone(),
        destination.clone(),
        store.clone(),
        refresher.clone(),
    );

    (pipeline, source, destination, store, refresher)
}
