use crate::ResourceKind;
use std::time::Duration;

/// Why a read from the cluster failed.
///
/// The classification is made where the error is produced so that callers
/// can decide whether a failure is worth reporting without inspecting opaque
/// errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The object does not exist, typically because it was deleted between
    /// being listed and being fetched.
    #[error("not found")]
    NotFound,

    /// The API server rejected the request.
    #[error("API error: {0}")]
    Api(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Read access to a cluster's resources.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Lists the names of all objects of a kind. `namespace` must be set for
    /// namespaced kinds.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<String>, FetchError>;

    /// Fetches a single object as JSON.
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<serde_json::Value, FetchError>;

    /// Fetches the API server's version information.
    async fn server_version(&self) -> Result<serde_json::Value, FetchError>;

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String, FetchError>;

    /// Waits up to `timeout` for a pod to reach a terminal phase. Returns
    /// `false` if the pod was still running when the timeout elapsed.
    async fn await_pod_terminated(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<bool, FetchError>;
}

impl FetchError {
    pub fn other(error: impl Into<anyhow::Error>) -> Self {
        Self::Other(error.into())
    }
}
