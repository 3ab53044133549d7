use crate::{ClusterApi, FetchError, Probe, ResourceKind};
use collie_agent_core::{ComplianceFinding, Report};
use collie_agent_scanners::{bench, hunter, ParseError};
use std::time::Duration;

/// Locates the scanner pods whose logs are parsed into findings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannerConfig {
    pub namespace: String,

    /// How long to wait for the hunter to finish before reading its logs.
    pub hunter_wait: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("no pod named {prefix}* in namespace {namespace}")]
    MissingPod {
        prefix: &'static str,
        namespace: String,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

const BENCH_POD_PREFIX: &str = "kube-bench-";
const HUNTER_POD_PREFIX: &str = "kube-hunter-";

// === impl ScannerConfig ===

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            namespace: "collie-agent".to_string(),
            hunter_wait: Duration::from_secs(30),
        }
    }
}

// === impl Probe ===

impl<C: ClusterApi> Probe<C> {
    /// Reports the findings of the most recent benchmark run.
    pub async fn discover_compliance(&self, sink: &dyn Report) -> Result<usize, ScanError> {
        let pod = self.scanner_pod(BENCH_POD_PREFIX).await?;
        let logs = self
            .cluster
            .pod_logs(&self.scanners.namespace, &pod)
            .await?;
        let findings = bench::parse(&logs);
        tracing::info!(%pod, findings = findings.len(), "Parsed benchmark results");
        Ok(report_all(findings, sink).await)
    }

    /// Reports the vulnerabilities found by the most recent hunter run.
    pub async fn discover_compliance_for_hunter(
        &self,
        sink: &dyn Report,
    ) -> Result<usize, ScanError> {
        let ns = &self.scanners.namespace;
        let pod = self.scanner_pod(HUNTER_POD_PREFIX).await?;

        let wait = self.scanners.hunter_wait;
        if !self.cluster.await_pod_terminated(ns, &pod, wait).await? {
            tracing::warn!(%pod, ?wait, "Hunter has not finished; reading partial output");
        }

        let logs = self.cluster.pod_logs(ns, &pod).await?;
        let findings = hunter::parse(&logs)?;
        tracing::info!(%pod, findings = findings.len(), "Parsed hunter results");
        Ok(report_all(findings, sink).await)
    }

    async fn scanner_pod(&self, prefix: &'static str) -> Result<String, ScanError> {
        let ns = &self.scanners.namespace;
        self.cluster
            .list(ResourceKind::Pods, Some(ns))
            .await?
            .into_iter()
            .find(|name| name.starts_with(prefix))
            .ok_or_else(|| ScanError::MissingPod {
                prefix,
                namespace: ns.clone(),
            })
    }
}

async fn report_all(findings: Vec<ComplianceFinding>, sink: &dyn Report) -> usize {
    let n = findings.len();
    for finding in findings {
        sink.report(finding.into()).await;
    }
    n
}
