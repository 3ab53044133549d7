use crate::{CycleMetrics, Interval, Scheduler};
use anyhow::{bail, Context, Result};
use clap::Parser;
use collie_agent_core::Envelope;
use collie_agent_index::{
    index_name, Backoff, BulkConfig, Credentials, DocumentSink, ElasticBackend,
    HttpReportingApi, SinkMetrics, DEFAULT_INDEX_PREFIX,
};
use collie_agent_k8s_probe::{self as probe, KubeCluster, Probe, ScannerConfig};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "collie-agent", about = "Discovers cluster state and reports it to Collie")]
pub struct Args {
    #[clap(long, default_value = "collie=info,warn", env = "COLLIE_AGENT_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Base URL of the reporting API. `https` is assumed when no scheme is
    /// given.
    #[clap(long, env = "API_URL")]
    api_url: String,

    #[clap(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    #[clap(long, env = "ES_URL")]
    es_url: String,

    /// Search backend credentials as `<org-id>:<password>`, optionally base64
    /// encoded.
    #[clap(long, env = "ES_KEY", hide_env_values = true)]
    es_key: String,

    #[clap(long, env = "AGENTID")]
    agent_id: String,

    /// The cloud provider the cluster runs on, as reported to the index.
    #[clap(long, env = "PROVIDER", default_value = "")]
    provider: String,

    /// Overrides the cluster id, which otherwise is the system UUID of the
    /// first node.
    #[clap(long, env = "CLUSTER_ID")]
    cluster_id: Option<String>,

    #[clap(long, default_value = DEFAULT_INDEX_PREFIX)]
    index_prefix: String,

    #[clap(long, default_value = "12h")]
    sync_interval: Interval,

    #[clap(long, default_value = "2")]
    bulk_workers: usize,

    #[clap(long, default_value = "5000000")]
    bulk_flush_bytes: usize,

    #[clap(long, default_value = "30s")]
    bulk_flush_interval: Interval,

    /// The namespace the scanner pods run in.
    #[clap(long, default_value = "collie-agent")]
    scanner_namespace: String,

    /// How long to wait for kube-hunter to finish before reading its logs.
    #[clap(long, default_value = "30s")]
    hunter_wait: Interval,

    /// Namespaces excluded from policy evaluation.
    #[clap(long, default_value = "kube-node-lease,kube-public,kube-system")]
    ignored_namespaces: Namespaces,

    /// Disables certificate verification for the search backend.
    #[clap(long)]
    insecure_skip_tls_verify: bool,
}

#[derive(Clone, Debug)]
struct Namespaces(Vec<String>);

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            api_url,
            api_key,
            es_url,
            es_key,
            agent_id,
            provider,
            cluster_id,
            index_prefix,
            sync_interval,
            bulk_workers,
            bulk_flush_bytes,
            bulk_flush_interval,
            scanner_namespace,
            hunter_wait,
            ignored_namespaces: Namespaces(ignored_namespaces),
            insecure_skip_tls_verify,
        } = self;

        let credentials = es_key
            .parse::<Credentials>()
            .context("invalid search backend credentials")?;
        let index = index_name(&index_prefix, credentials.org_id());

        let mut prom = <Registry>::default();
        let sink_metrics = SinkMetrics::register(prom.sub_registry_with_prefix("index"));
        let cycle_metrics = CycleMetrics::register(prom.sub_registry_with_prefix("cycle"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let cluster = KubeCluster::new(runtime.client());
        let cluster_id = match cluster_id {
            Some(id) => id,
            None => probe::cluster_id(&cluster)
                .await
                .context("failed to identify cluster")?,
        };
        info!(%agent_id, %cluster_id, %index, "Starting agent");

        let backend = ElasticBackend::new(
            &es_url,
            credentials,
            insecure_skip_tls_verify,
            Backoff::default(),
        )?;
        let api = HttpReportingApi::new(&api_url, api_key)?;
        let sink = DocumentSink::new(
            Envelope::new(agent_id, cluster_id),
            index,
            Arc::new(backend),
            Arc::new(api),
            BulkConfig {
                workers: bulk_workers,
                flush_bytes: bulk_flush_bytes,
                flush_interval: bulk_flush_interval.into(),
            },
            sink_metrics,
        );

        let probe = Probe::new(
            cluster,
            ignored_namespaces,
            ScannerConfig {
                namespace: scanner_namespace,
                hunter_wait: hunter_wait.into(),
            },
        );
        let scheduler = Scheduler::new(
            probe,
            sink,
            provider,
            sync_interval.into(),
            cycle_metrics,
        );

        let shutdown = runtime.shutdown_handle();
        tokio::spawn(
            scheduler
                .run(async move {
                    let _ = shutdown.signaled().await;
                })
                .instrument(info_span!("scheduler")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait
        // for an in-progress cycle to finish.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

impl std::str::FromStr for Namespaces {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(
            s.split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(String::from)
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const REQUIRED: [&str; 11] = [
        "collie-agent",
        "--api-url=api.collie.example.com",
        "--api-key=key",
        "--es-url=https://es.collie.example.com",
        "--es-key=org:pw",
        "--agent-id=agent-1",
        "--log-level=collie=info,warn",
        "--log-format=plain",
        "--provider=eks",
        "--index-prefix=collie-k8s-",
        "--scanner-namespace=collie-agent",
    ];

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(REQUIRED).unwrap();
        assert_eq!(Duration::from(args.sync_interval), Duration::from_secs(12 * 60 * 60));
        assert_eq!(Duration::from(args.hunter_wait), Duration::from_secs(30));
        assert_eq!(Duration::from(args.bulk_flush_interval), Duration::from_secs(30));
        assert_eq!(args.bulk_workers, 2);
        assert_eq!(args.bulk_flush_bytes, 5_000_000);
        assert_eq!(args.cluster_id, None);
        assert_eq!(
            args.ignored_namespaces.0,
            vec!["kube-node-lease", "kube-public", "kube-system"]
        );
        assert!(!args.insecure_skip_tls_verify);
    }

    #[test]
    fn overrides() {
        let args = Args::try_parse_from(REQUIRED.into_iter().chain([
            "--sync-interval=1h30m",
            "--ignored-namespaces=kube-system, monitoring",
            "--cluster-id=prod-1",
        ]))
        .unwrap();
        assert_eq!(Duration::from(args.sync_interval), Duration::from_secs(90 * 60));
        assert_eq!(args.ignored_namespaces.0, vec!["kube-system", "monitoring"]);
        assert_eq!(args.cluster_id.as_deref(), Some("prod-1"));
    }

    #[test]
    fn rejects_zero_interval() {
        let res = Args::try_parse_from(REQUIRED.into_iter().chain(["--sync-interval=0s"]));
        assert!(res.is_err());
    }

    #[test]
    fn rejects_huge_interval() {
        let res = Args::try_parse_from(
            REQUIRED
                .into_iter()
                .chain(["--sync-interval=99999999999999999999h"]),
        );
        assert!(res.is_err());
    }
}
