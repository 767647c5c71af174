use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Interval at which histogram buckets of the exporter are drained.
const UPKEEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Installs the global Prometheus recorder and serves it on `[::]:{port}/metrics`.
///
/// Every metric carries the `pipeline` global label when `pipeline_name` is set. The recorder
/// can be installed once per process, a second call fails with [`BuildError`].
///
/// The HTTP listener and the upkeep task run on the current Tokio runtime when there is one.
pub fn init_metrics(port: u16, pipeline_name: Option<&str>) -> Result<(), BuildError> {
    let mut builder = PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        .upkeep_timeout(UPKEEP_TIMEOUT);

    if let Some(pipeline_name) = pipeline_name {
        builder = builder.add_global_label("pipeline", pipeline_name);
    }

    builder.install()?;

    Ok(())
}
