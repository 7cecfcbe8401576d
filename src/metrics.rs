use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the global Prometheus recorder. With an address the exporter
/// serves `/metrics` itself; without one nothing is recorded.
pub fn install(addr: Option<SocketAddr>) -> Result<()> {
    let Some(addr) = addr else {
        tracing::info!("METRICS_ADDR unset, metrics exporter disabled");
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;

    crate::fetch::ensure_metrics_described();
    crate::ingest::ensure_metrics_described();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
