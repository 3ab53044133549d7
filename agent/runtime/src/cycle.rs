use crate::CycleMetrics;
use chrono::{SubsecRound, Utc};
use collie_agent_core::{Activity, Report};
use collie_agent_index::DocumentSink;
use collie_agent_k8s_probe::{ClusterApi, Probe};
use std::{fmt, future::Future, time::Duration};
use tokio::time::{self, Instant};
use tracing::{info_span, Instrument};

const CONNECTIVITY: &str = "connectivity";

/// Runs discovery cycles on a fixed interval.
pub struct Scheduler<C> {
    probe: Probe<C>,
    sink: DocumentSink,
    provider: String,
    interval: Duration,
    metrics: CycleMetrics,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,

    /// The reporting API or the search backend could not be reached, so
    /// nothing was discovered.
    Unreachable,
}

// === impl Scheduler ===

impl<C: ClusterApi> Scheduler<C> {
    pub fn new(
        probe: Probe<C>,
        sink: DocumentSink,
        provider: String,
        interval: Duration,
        metrics: CycleMetrics,
    ) -> Self {
        Self {
            probe,
            sink,
            provider,
            interval,
            metrics,
        }
    }

    /// Runs cycles until `shutdown` completes.
    ///
    /// Shutdown is only observed between cycles; a cycle that is in progress
    /// runs to completion.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            let outcome = self.run_cycle().instrument(info_span!("cycle")).await;
            tracing::info!(?outcome, next_in = ?self.interval, "Cycle finished");

            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("Shutting down");
                    return;
                }
            }
        }
    }

    /// Discovers and reports the cluster's state once.
    pub async fn run_cycle(&self) -> Outcome {
        let started = Instant::now();
        // Documents are stamped with millisecond precision.
        let start = Utc::now().trunc_subsecs(3);

        if let Err(error) = self.sink.check_connectivity().await {
            tracing::warn!(%error, "Backends are unreachable; skipping cycle");
            self.sink
                .report(Activity::error(CONNECTIVITY, "", &error).into())
                .await;
            self.metrics.unreachable();
            return Outcome::Unreachable;
        }

        let cluster = self
            .probe
            .discover_cluster(&self.provider, &self.sink)
            .instrument(info_span!("cluster"))
            .await;
        self.stage("DiscoverCluster", cluster).await;

        let bulk = self.sink.bulk();
        let resources = self
            .probe
            .discover_resources(&bulk)
            .instrument(info_span!("resources"))
            .await;
        let stats = bulk.close().await;
        tracing::debug!(?stats, "Flushed resources");
        self.stage("DiscoverResources", resources).await;

        let policies = self
            .probe
            .discover_policies(&self.sink)
            .instrument(info_span!("policies"))
            .await;
        self.stage("DiscoverPolicies", policies).await;

        let bench = self
            .probe
            .discover_compliance(&self.sink)
            .instrument(info_span!("bench"))
            .await;
        self.stage("DiscoverCompliance", bench).await;

        let hunter = self
            .probe
            .discover_compliance_for_hunter(&self.sink)
            .instrument(info_span!("hunter"))
            .await;
        self.stage("DiscoverComplianceForHunter", hunter).await;

        let evicted = self.sink.evict(start).await;
        tracing::debug!(%evicted, "Evicted stale documents");

        self.sink.complete_cycle().await;
        self.metrics.completed(started.elapsed());
        Outcome::Completed
    }

    /// Reports a failed stage. Later stages run regardless.
    async fn stage<T, E: fmt::Display>(&self, name: &'static str, res: Result<T, E>) {
        if let Err(error) = res {
            tracing::warn!(stage = %name, %error, "Stage failed");
            self.sink
                .report(Activity::error(name, "", &error).into())
                .await;
            self.metrics.stage_failed(name);
        }
    }
}
