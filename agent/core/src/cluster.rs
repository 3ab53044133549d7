use serde::{Deserialize, Serialize};

/// Describes the cluster the agent runs in. Reported once per cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub provider: String,

    /// The API server's version information, as returned by the cluster.
    pub data: serde_json::Value,
}
