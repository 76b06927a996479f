//! Error taxonomy shared by every reconciler, grounded on `kube_runtime`'s
//! per-module `Error` enums (`finalizer::Error`, `controller::Error`) and the
//! flat operator-style `Error` used by `eosin-storage-operator`.
//!
//! Variants map onto spec.md §7's policy table: transient store errors are
//! retried with jittered backoff by the caller (never constructed as fatal
//! here); [`Error::InvariantViolation`] is the only variant meant to halt a
//! reconcile loop outright.

use eno_types::ObjectRef;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("missing input binding for key {key:?}")]
    MissingInput { key: String },

    #[error("input {key:?} refers to {object:?} which was not found")]
    InputNotFound { key: String, object: ObjectRef },

    #[error("synthesizer-execution subsystem failed: {0}")]
    Executor(String),

    #[error("executor output could not be parsed: {0}")]
    ExecutorOutput(#[from] eno_types::resource_list::ParseError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("object has no name")]
    UnnamedObject,

    #[error("object has no namespace")]
    UnnamespacedObject,
}

impl Error {
    /// Transient store errors (conflicts, timeouts, server-side throttling)
    /// per spec.md §7 — callers requeue these with jittered backoff instead
    /// of surfacing them as a `Result{severity=error}`.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(e) => is_transient_kube_error(e),
            _ => false,
        }
    }
}

fn is_transient_kube_error(e: &kube::Error) -> bool {
    match e {
        kube::Error::Api(resp) => resp.code == 409 || resp.code == 429 || resp.code >= 500,
        kube::Error::Service(_) | kube::Error::HyperError(_) => true,
        _ => false,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
