//! Discovers the state of a cluster and reports it as documents.
//!
//! A [`Probe`] walks every supported resource kind, evaluates policy rules
//! against pods, and collects the output of the scanner pods that run next
//! to the agent. Reads go through [`ClusterApi`] so that the walk can be
//! exercised without an API server.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod kind;
mod policy;
pub mod rules;
mod scan;
mod source;
mod walk;


pub use self::{
    client::KubeCluster,
    kind::ResourceKind,
    scan::{ScanError, ScannerConfig},
    source::{ClusterApi, FetchError},
    walk::WalkSummary,
};
use ahash::AHashSet;
use anyhow::{bail, Context, Result};
use collie_agent_core::{ClusterInfo, Report};

pub const DEFAULT_IGNORED_NAMESPACES: [&str; 3] = ["kube-node-lease", "kube-public", "kube-system"];

pub struct Probe<C> {
    cluster: C,
    ignored_namespaces: AHashSet<String>,
    scanners: ScannerConfig,
}

// === impl Probe ===

impl<C: ClusterApi> Probe<C> {
    pub fn new(
        cluster: C,
        ignored_namespaces: impl IntoIterator<Item = String>,
        scanners: ScannerConfig,
    ) -> Self {
        Self {
            cluster,
            ignored_namespaces: ignored_namespaces.into_iter().collect(),
            scanners,
        }
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Reports the API server's version information.
    pub async fn discover_cluster(
        &self,
        provider: &str,
        sink: &dyn Report,
    ) -> Result<(), FetchError> {
        let data = self.cluster.server_version().await?;
        tracing::debug!(%provider, "Discovered cluster");
        sink.report(
            ClusterInfo {
                provider: provider.to_string(),
                data,
            }
            .into(),
        )
        .await;
        Ok(())
    }

    fn is_ignored(&self, namespace: &str) -> bool {
        self.ignored_namespaces.contains(namespace)
    }
}

/// Identifies the cluster by the system UUID of the first node.
pub async fn cluster_id(cluster: &dyn ClusterApi) -> Result<String> {
    let nodes = cluster
        .list(ResourceKind::Nodes, None)
        .await
        .context("failed to list nodes")?;
    let Some(node) = nodes.first() else {
        bail!("cluster has no nodes");
    };
    let obj = cluster
        .get(ResourceKind::Nodes, None, node)
        .await
        .with_context(|| format!("failed to get node {node}"))?;
    match obj
        .pointer("/status/nodeInfo/systemUUID")
        .and_then(|id| id.as_str())
    {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => bail!("node {node} has no system UUID"),
    }
}
