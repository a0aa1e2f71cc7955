use crate::{evaluator::Evaluation, metrics::ReadinessMetrics, Readiness};
use arc_swap::ArcSwapOption;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use eyre::WrapErr;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// When the node gets evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every `/ready` request runs a fresh evaluation.
    OnDemand,
    /// A background task evaluates on a fixed period and `/ready` answers
    /// from the latest published evaluation.
    Polling(Duration),
}

#[derive(Clone)]
struct AppState {
    probe: Arc<dyn Readiness>,
    metrics: ReadinessMetrics,
    mode: Mode,
    latest: Arc<ArcSwapOption<Evaluation>>,
}

pub struct ReadinessServer {
    state: AppState,
    prometheus_handle: Option<PrometheusHandle>,
}

impl ReadinessServer {
    pub fn new(probe: impl Readiness + 'static, mode: Mode, nodename: Option<String>) -> Self {
        let metrics = if let Some(nodename) = nodename {
            ReadinessMetrics::new_with_labels(&[("nodename", nodename)])
        } else {
            ReadinessMetrics::default()
        };

        let state = AppState {
            probe: Arc::new(probe),
            metrics,
            mode,
            latest: Arc::new(ArcSwapOption::empty()),
        };

        Self {
            state,
            prometheus_handle: None,
        }
    }

    /// Serves the Prometheus exposition on `/metrics`.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus_handle = Some(handle);
        self
    }

    /// The evaluation published by the polling task, if any.
    pub fn latest(&self) -> Arc<ArcSwapOption<Evaluation>> {
        self.state.latest.clone()
    }

    pub fn router(self) -> Router {
        let mut router = Router::new().route("/ready", get(ready_handler));

        if let Some(prometheus_handle) = self.prometheus_handle {
            router = router.route("/metrics", get(move || metrics_handler(prometheus_handle)));
        }

        router.with_state(self.state)
    }

    /// Starts the polling task when running in [`Mode::Polling`].
    pub fn spawn_polling(&self) -> Option<JoinHandle<()>> {
        match self.state.mode {
            Mode::OnDemand => None,
            Mode::Polling(period) => {
                let state = self.state.clone();
                Some(tokio::spawn(async move {
                    Self::polling_loop(state, period).await;
                }))
            }
        }
    }

    pub async fn serve(self, addr: SocketAddr) -> eyre::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("Failed to bind {}", addr))?;
        tracing::info!("Readiness server listening on {}", addr);

        let polling = self.spawn_polling();

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(polling) = polling {
            polling.abort();
        }

        Ok(())
    }

    async fn polling_loop(state: AppState, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let evaluation = state.probe.evaluate().await;
            state.metrics.record(&evaluation);

            // Readers only ever see a complete evaluation.
            state.latest.store(Some(Arc::new(evaluation)));
        }
    }
}

async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    let healthy = match state.mode {
        Mode::OnDemand => {
            let evaluation = state.probe.evaluate().await;
            state.metrics.record(&evaluation);
            evaluation.is_healthy()
        }
        Mode::Polling(_) => state
            .latest
            .load_full()
            .is_some_and(|evaluation| evaluation.is_healthy()),
    };

    if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler(prometheus_handle: PrometheusHandle) -> String {
    prometheus_handle.render()
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
