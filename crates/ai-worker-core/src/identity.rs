use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix identifying the implementation behind a worker id
pub const WORKER_KIND: &str = "rust-worker";

/// Language announced in the registration event
pub const WORKER_LANGUAGE: &str = "Rust";

/// Process-lifetime worker identifier, formatted `<kind>-<host>-<suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    /// Generate the identity for this process from the local host name.
    ///
    /// An unreadable host name yields an empty host segment; generation
    /// never fails.
    pub fn generate() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_default();

        Self::for_host(WORKER_KIND, &host)
    }

    /// Build an identity for an explicit kind and host. The random suffix
    /// keeps workers started together on one host distinct.
    pub fn for_host(kind: &str, host: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        WorkerIdentity(format!("{}-{}-{}", kind, host, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
