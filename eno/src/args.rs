//! Process configuration (spec.md §6 CLI surface, SPEC_FULL.md A.3): loaded
//! from environment variables via `clap`, the way
//! `eosin-platform-eosin/storage`'s `args.rs` does for its own server
//! command.

use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Eno control-plane reconcilers", long_about = None)]
pub struct Config {
    /// Address the `/healthz`, `/readyz`, and `/metrics` HTTP server binds to.
    #[arg(long, env = "ENO_HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    pub health_addr: SocketAddr,

    /// Maximum number of syntheses the executor may run concurrently
    /// fleet-wide (spec.md §5 "executor concurrency limit").
    #[arg(long, env = "ENO_EXECUTOR_CONCURRENCY", default_value_t = 8)]
    pub executor_concurrency: usize,

    /// Discovery Cache refresh rate limit, in requests per second (spec.md §4.6).
    #[arg(long, env = "ENO_DISCOVERY_REFRESH_QPS", default_value_t = 5)]
    pub discovery_refresh_qps: usize,

    /// Default `RolloutCooldown` applied when a Synthesizer leaves it unset.
    #[arg(long, env = "ENO_DEFAULT_ROLLOUT_COOLDOWN", default_value = "0s")]
    pub default_rollout_cooldown: String,

    /// Name of the `coordination.k8s.io/v1` `Lease` used for leader election.
    #[arg(long, env = "ENO_LEASE_NAME", default_value = "eno-controller")]
    pub lease_name: String,

    /// Namespace the leader-election lease lives in.
    #[arg(long, env = "ENO_LEASE_NAMESPACE", default_value = "eno-system")]
    pub lease_namespace: String,

    /// Seconds before an unrenewed lease is considered expired.
    #[arg(long, env = "ENO_LEASE_DURATION_SECS", default_value_t = 15)]
    pub lease_duration_secs: i64,

    /// Disables leader election (useful for local development / single replica).
    #[arg(long, env = "ENO_DISABLE_LEADER_ELECTION")]
    pub disable_leader_election: bool,
}
