//! Process entrypoint: parses [`args::Config`], builds one [`kube::Client`],
//! and runs the four control-plane reconcilers (Synthesis Driver, Rollout
//! Coordinator, Symphony Aggregator, Status controller) as concurrent
//! `Controller` loops behind a single leader-election lease, alongside the
//! `/healthz`/`/readyz`/`/metrics` HTTP server (spec.md §6).
//!
//! Grounded on `eosin-platform-eosin/storage/src/main.rs`'s
//! `tokio::main` + `clap::Parser` + `tracing_subscriber::fmt().init()`
//! shape, generalized to a multi-controller `kube_runtime::Controller`
//! fleet instead of a single gRPC server.

mod args;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use eno_controller::controllers::{rollout, status, symphony, synthesis};
use eno_controller::health::Readiness;
use eno_controller::input_resolver::DynamicInputResolver;
use eno_controller::leader_election::LeaseLock;
use eno_controller::pod_executor::PodExecutor;
use eno_types::{Composition, ResourceSlice, Symphony, Synthesizer};
use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

const RECONCILER_COUNT: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = args::Config::parse();
    let client = Client::try_default().await.context("building Kubernetes client")?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;
    let readiness = Readiness::new(RECONCILER_COUNT);

    let health_router = eno_controller::health::router(readiness.clone(), prometheus);
    let health_addr = config.health_addr;
    tokio::spawn(async move {
        if let Err(e) = eno_controller::health::serve(health_addr, health_router).await {
            error!(error = %e, "health server exited");
        }
    });

    if config.disable_leader_election {
        info!("leader election disabled; assuming sole leadership");
    } else {
        let identity = std::env::var("HOSTNAME").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
        let lock = Arc::new(LeaseLock::new(
            client.clone(),
            &config.lease_namespace,
            &config.lease_name,
            &identity,
            config.lease_duration_secs,
        ));
        lock.acquire().await.context("acquiring leader-election lease")?;
        let renewer = lock.clone();
        tokio::spawn(async move {
            if let Err(e) = renewer.keep_renewed().await {
                error!(error = %e, "lost leader-election lease; exiting");
                std::process::exit(1);
            }
        });
    }

    let executor = Arc::new(PodExecutor::new(client.clone()));
    let input_resolver = Arc::new(DynamicInputResolver::new(client.clone()));

    let synthesis_ctx = Arc::new(synthesis::Context {
        client: client.clone(),
        executor,
        input_resolver,
        max_slice_resources: 500,
    });
    let rollout_ctx = Arc::new(rollout::Context { client: client.clone() });
    let symphony_ctx = Arc::new(symphony::Context { client: client.clone() });
    let status_ctx = Arc::new(status::Context { client: client.clone() });

    let compositions: Api<Composition> = Api::all(client.clone());
    let synthesizers: Api<Synthesizer> = Api::all(client.clone());
    let symphonies: Api<Symphony> = Api::all(client.clone());
    let slices: Api<ResourceSlice> = Api::all(client.clone());

    // Readiness per spec.md §6 is "every controller has completed its
    // initial list" — approximated as each controller yielding its first
    // reconcile result, since `Controller::run` only starts scheduling
    // workitems once its underlying reflector has finished relisting.
    let synthesis_ready = readiness.clone();
    let synthesis_fut = Controller::new(compositions.clone(), watcher::Config::default())
        .run(
            synthesis::reconcile::<PodExecutor, DynamicInputResolver>,
            synthesis::error_policy::<PodExecutor, DynamicInputResolver>,
            synthesis_ctx,
        )
        .for_each(move |res| {
            synthesis_ready.mark_ready(0);
            log_result("synthesis", res);
            async {}
        });

    let rollout_ready = readiness.clone();
    let rollout_fut = Controller::new(synthesizers, watcher::Config::default())
        .run(rollout::reconcile, rollout::error_policy, rollout_ctx)
        .for_each(move |res| {
            rollout_ready.mark_ready(1);
            log_result("rollout", res);
            async {}
        });

    let symphony_ready = readiness.clone();
    let symphony_fut = Controller::new(symphonies, watcher::Config::default())
        .owns(compositions.clone(), watcher::Config::default())
        .run(symphony::reconcile, symphony::error_policy, symphony_ctx)
        .for_each(move |res| {
            symphony_ready.mark_ready(2);
            log_result("symphony", res);
            async {}
        });

    let status_ready = readiness.clone();
    let status_fut = Controller::new(compositions, watcher::Config::default())
        .owns(slices, watcher::Config::default())
        .run(status::reconcile, status::error_policy, status_ctx)
        .for_each(move |res| {
            status_ready.mark_ready(3);
            log_result("status", res);
            async {}
        });

    tokio::join!(synthesis_fut, rollout_fut, symphony_fut, status_fut);
    Ok(())
}

fn log_result<K, E: std::fmt::Display>(reconciler: &str, res: Result<(K, kube::runtime::controller::Action), E>) {
    match res {
        Ok(_) => {}
        Err(e) => warn!(reconciler, error = %e, "reconcile failed"),
    }
}
