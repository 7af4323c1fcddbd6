//! Prometheus metrics endpoint

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder; call once at startup
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics recorder already installed"))?;
    Ok(())
}

pub async fn metrics_handler() -> String {
    METRICS_HANDLE.get().map(|h| h.render()).unwrap_or_default()
}
