//! Eno core control plane: the Synthesis Driver, Rollout Coordinator, and
//! status aggregators that together implement the Composition lifecycle
//! (spec.md §4). This crate has no `main` — it's wired up by the `eno`
//! binary crate, which owns process lifecycle, configuration, and the
//! health/metrics server.

pub mod aggregators;
pub mod controllers;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod health;
pub mod input_resolver;
pub mod leader_election;
pub mod pod_executor;
pub mod reconciliation_driver;
pub mod status_patch;

pub use error::Error;
