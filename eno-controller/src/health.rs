//! `/healthz` and `/readyz` HTTP surface (spec.md §6), grounded on
//! `eosin-storage-operator`'s axum-based health server
//! (`storage/src/health.rs`). `/metrics` renders whatever
//! `PrometheusHandle` the bin crate installed at startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

/// One flag per reconciler; readiness is "every reconciler has completed at
/// least one successful list/watch pass" (spec.md §6 "`/readyz`").
#[derive(Clone, Default)]
pub struct Readiness {
    flags: Arc<[std::sync::atomic::AtomicBool]>,
}

impl Readiness {
    pub fn new(reconciler_count: usize) -> Self {
        Self {
            flags: (0..reconciler_count)
                .map(|_| std::sync::atomic::AtomicBool::new(false))
                .collect(),
        }
    }

    pub fn mark_ready(&self, index: usize) {
        if let Some(flag) = self.flags.get(index) {
            flag.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    }

    fn all_ready(&self) -> bool {
        self.flags
            .iter()
            .all(|f| f.load(std::sync::atomic::Ordering::Relaxed))
    }
}

#[derive(Clone)]
struct AppState {
    readiness: Readiness,
    prometheus: PrometheusHandle,
}

pub fn router(readiness: Readiness, prometheus: PrometheusHandle) -> Router {
    let state = AppState { readiness, prometheus };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    tracing::info!(%addr, "starting health/metrics server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.readiness.all_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.prometheus.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_every_reconciler_reports_in() {
        let r = Readiness::new(2);
        assert!(!r.all_ready());
        r.mark_ready(0);
        assert!(!r.all_ready());
        r.mark_ready(1);
        assert!(r.all_ready());
    }

    #[test]
    fn mark_ready_out_of_range_is_a_no_op() {
        let r = Readiness::new(1);
        r.mark_ready(5);
        assert!(!r.all_ready());
    }
}
