use std::sync::Once;

use etl_config::Environment;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT_TEST_TRACING: Once = Once::new();

/// Default directive used when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVE: &str = "info";

/// Error returned when a global subscriber is already installed.
pub type TracingInitError = tracing_subscriber::util::TryInitError;

/// Installs the global tracing subscriber of a service.
///
/// Production logs are JSON lines with the span fields flattened into every event. Other
/// environments get human readable output. Levels come from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(app_name: &str, environment: Environment) -> Result<(), TracingInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let registry = tracing_subscriber::registry().with(env_filter);
    if environment.is_prod() {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }

    ::tracing::info!(app_name, environment = %environment, "tracing initialized");

    Ok(())
}

/// Installs a subscriber writing to the test harness output.
///
/// Safe to call from every test, only the first call installs the subscriber.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

        let _ = fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    });
}
