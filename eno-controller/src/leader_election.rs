//! Simplified leader election over a `coordination.k8s.io/v1` `Lease`,
//! grounded on `kube_runtime::lease::Elector`'s acquire/renew/release shape
//! (`kube-runtime/src/lease.rs`) but without its watch-driven renewal
//! scheduling — a plain poll-and-renew loop, since this workspace only
//! needs "exactly one replica reconciles at a time", not sub-second
//! failover.

use std::time::Duration as StdDuration;

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};

pub struct LeaseLock {
    api: Api<Lease>,
    name: String,
    identity: String,
    lease_duration: chrono::Duration,
}

impl LeaseLock {
    pub fn new(client: Client, namespace: &str, name: &str, identity: &str, lease_duration_secs: i64) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            identity: identity.to_string(),
            lease_duration: chrono::Duration::seconds(lease_duration_secs),
        }
    }

    /// Blocks (polling) until this identity holds the lease.
    pub async fn acquire(&self) -> kube::Result<()> {
        loop {
            if self.try_acquire().await? {
                tracing::info!(identity = %self.identity, lease = %self.name, "acquired leader lease");
                return Ok(());
            }
            tokio::time::sleep(StdDuration::from_secs(5)).await;
        }
    }

    /// Renews the lease forever at half its duration; intended to run as a
    /// background task alongside the controllers it's guarding.
    pub async fn keep_renewed(&self) -> kube::Result<()> {
        let interval = (self.lease_duration / 2).to_std().unwrap_or(StdDuration::from_secs(5));
        loop {
            tokio::time::sleep(interval).await;
            if !self.try_acquire().await? {
                return Err(kube::Error::Api(kube::core::ErrorResponse {
                    status: "Failure".into(),
                    message: format!("lost leader lease {}", self.name),
                    reason: "LeaseLost".into(),
                    code: 409,
                }));
            }
        }
    }

    /// Attempts to create, or patch-renew, the lease for `self.identity`.
    /// Returns `true` iff this identity holds the lease afterward.
    async fn try_acquire(&self) -> kube::Result<bool> {
        let now = Utc::now();
        match self.api.get_opt(&self.name).await? {
            None => {
                let lease = Lease {
                    metadata: kube::api::ObjectMeta { name: Some(self.name.clone()), ..Default::default() },
                    spec: Some(self.spec_for_self(now)),
                };
                match self.api.create(&PostParams::default(), &lease).await {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Some(existing) => {
                let spec = existing.spec.unwrap_or_default();
                let held_by_other = spec
                    .holder_identity
                    .as_deref()
                    .is_some_and(|holder| holder != self.identity);
                let expired = spec
                    .renew_time
                    .as_ref()
                    .map(|MicroTime(t)| now - *t > self.lease_duration)
                    .unwrap_or(true);

                if held_by_other && !expired {
                    return Ok(false);
                }

                let patch = serde_json::json!({ "spec": self.spec_for_self(now) });
                self.api
                    .patch(&self.name, &PatchParams::apply("eno-controller").force(), &Patch::Merge(patch))
                    .await?;
                Ok(true)
            }
        }
    }

    fn spec_for_self(&self, now: chrono::DateTime<Utc>) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration.num_seconds() as i32),
            renew_time: Some(MicroTime(now)),
            acquire_time: Some(MicroTime(now)),
            ..Default::default()
        }
    }
}
