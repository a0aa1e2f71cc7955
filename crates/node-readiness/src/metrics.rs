use crate::evaluator::Evaluation;
use metrics_derive::Metrics;

#[derive(Metrics, Clone)]
#[metrics(scope = "node_readiness")]
pub struct ReadinessMetrics {
    /// Seconds between the wall clock and the latest block
    #[metric(describe = "Seconds the latest block is behind the wall clock")]
    pub block_lag_seconds: metrics::Gauge,

    /// Number of connected peers
    #[metric(describe = "Number of peers the node reports")]
    pub peers: metrics::Gauge,

    /// Is the node ready
    #[metric(describe = "Whether the node is ready (1 = ready, 0 = not ready)")]
    pub healthy: metrics::Gauge,

    #[metric(describe = "Number of readiness evaluations")]
    pub evaluations: metrics::Counter,

    #[metric(describe = "Number of readiness evaluations that reported not ready")]
    pub failed_evaluations: metrics::Counter,
}

impl ReadinessMetrics {
    pub fn record(&self, evaluation: &Evaluation) {
        self.evaluations.increment(1);

        if let Some(lag) = evaluation.lag_secs {
            self.block_lag_seconds.set(lag as f64);
        }
        if let Some(peers) = evaluation.peers {
            self.peers.set(peers as f64);
        }

        if evaluation.is_healthy() {
            self.healthy.set(1.0);
        } else {
            self.healthy.set(0.0);
            self.failed_evaluations.increment(1);
        }
    }
}

/// Installs the global Prometheus recorder and returns the handle used to
/// render the exposition.
pub fn install_prometheus_recorder() -> eyre::Result<metrics_exporter_prometheus::PrometheusHandle> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| eyre::eyre!("Failed to install Prometheus recorder: {}", e))
}
