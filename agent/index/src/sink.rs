use crate::{
    BulkConfig, BulkIndexer, BulkItem, BulkStats, Error, EvictionQuery, ReportingApi,
    SearchBackend, SinkMetrics,
};
use chrono::{DateTime, Utc};
use collie_agent_core::{
    activity::{CYCLE_COMPLETE, CYCLE_START},
    Activity, DocType, Document, Envelope, Report,
};
use std::sync::Arc;

/// Writes documents to the agent's index and checks in with the reporting
/// API.
///
/// A sink is built once at startup and shared by every cycle.
pub struct DocumentSink {
    envelope: Envelope,
    index: String,
    backend: Arc<dyn SearchBackend>,
    api: Arc<dyn ReportingApi>,
    bulk: BulkConfig,
    metrics: SinkMetrics,
}

/// Reports documents through a bulk indexer. Must be closed to flush.
pub struct BulkReporter {
    indexer: BulkIndexer,
    envelope: Envelope,
    metrics: SinkMetrics,
}

/// Names the index an organization's documents are written to.
pub fn index_name(prefix: &str, org_id: &str) -> String {
    format!("{prefix}{org_id}")
}

// === impl DocumentSink ===

impl DocumentSink {
    pub fn new(
        envelope: Envelope,
        index: String,
        backend: Arc<dyn SearchBackend>,
        api: Arc<dyn ReportingApi>,
        bulk: BulkConfig,
        metrics: SinkMetrics,
    ) -> Self {
        Self {
            envelope,
            index,
            backend,
            api,
            bulk,
            metrics,
        }
    }

    /// Verifies that the reporting API and the search backend are reachable
    /// and, if so, records the start of a cycle.
    pub async fn check_connectivity(&self) -> Result<(), Error> {
        if let Err(error) = self.ping().await {
            self.metrics.connectivity_failed();
            return Err(error);
        }
        self.report(Activity::new(CYCLE_START, "").into()).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        self.api.onboarding_status().await?;
        let info = self.backend.info().await?;
        let health = self.backend.cluster_health().await?;
        tracing::debug!(
            version = ?info.pointer("/version/number"),
            status = ?health.get("status"),
            "Search backend is reachable"
        );
        Ok(())
    }

    /// Starts a bulk indexer on the current runtime.
    pub fn bulk(&self) -> BulkReporter {
        BulkReporter {
            indexer: BulkIndexer::spawn(self.backend.clone(), &self.index, self.bulk),
            envelope: self.envelope.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Removes this agent's snapshot documents written before `cycle_start`.
    pub async fn evict(&self, cycle_start: DateTime<Utc>) -> u64 {
        let mut total = 0;
        for doc_type in DocType::SNAPSHOT {
            let query = EvictionQuery {
                before: cycle_start,
                agent_id: self.envelope.agent_id.clone(),
                doc_type,
            };
            match self.backend.delete_stale(&self.index, &query).await {
                Ok(n) => {
                    tracing::debug!(%doc_type, evicted = n, "Evicted stale documents");
                    self.metrics.evicted(doc_type, n);
                    total += n;
                }
                Err(error) => tracing::warn!(%doc_type, %error, "Failed to evict stale documents"),
            }
        }
        total
    }

    /// Notifies the reporting API that a cycle finished and records it.
    pub async fn complete_cycle(&self) {
        if let Err(error) = self.api.sync_complete().await {
            tracing::warn!(%error, "Failed to report cycle completion");
        }
        self.report(Activity::new(CYCLE_COMPLETE, "").into()).await;
    }
}

#[async_trait::async_trait]
impl Report for DocumentSink {
    async fn report(&self, doc: Document) {
        let doc_type = doc.doc_type();
        let res = match self.envelope.encode(Utc::now(), &doc) {
            Ok(value) => self.backend.index(&self.index, value).await,
            Err(error) => Err(error.into()),
        };
        match res {
            Ok(()) => self.metrics.indexed(doc_type),
            Err(error) => {
                tracing::warn!(doc = %doc.describe(), %error, "Failed to index document");
                self.metrics.failed(doc_type);
            }
        }
    }
}

// === impl BulkReporter ===

impl BulkReporter {
    pub async fn close(self) -> BulkStats {
        self.indexer.close().await
    }
}

#[async_trait::async_trait]
impl Report for BulkReporter {
    async fn report(&self, doc: Document) {
        let doc_type = doc.doc_type();
        let value = match self.envelope.encode(Utc::now(), &doc) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(doc = %doc.describe(), %error, "Failed to encode document");
                self.metrics.failed(doc_type);
                return;
            }
        };

        let indexed = self.metrics.clone();
        let failed = self.metrics.clone();
        let describe = doc.describe();
        let item = BulkItem::new(value)
            .on_success(move || indexed.indexed(doc_type))
            .on_failure(move |reason| {
                tracing::debug!(doc = %describe, %reason, "Failed to index document");
                failed.failed(doc_type);
            });
        self.indexer.add(item).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use chrono::{Duration, TimeZone};
    use collie_agent_core::{document::format_timestamp, ResourceDocument};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const INDEX: &str = "collie-k8s-org";

    #[derive(Debug, Default)]
    struct FakeApi {
        calls: Mutex<Vec<&'static str>>,
        down: bool,
    }

    #[async_trait::async_trait]
    impl ReportingApi for FakeApi {
        async fn onboarding_status(&self) -> Result<(), Error> {
            self.calls.lock().push("onboarding-status");
            self.result()
        }

        async fn sync_complete(&self) -> Result<(), Error> {
            self.calls.lock().push("sync-complete");
            self.result()
        }
    }

    impl FakeApi {
        fn result(&self) -> Result<(), Error> {
            if self.down {
                return Err(Error::Unavailable("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn mk_sink(backend: Arc<MemoryBackend>, api: Arc<FakeApi>) -> (DocumentSink, SinkMetrics) {
        let metrics = SinkMetrics::default();
        let sink = DocumentSink::new(
            Envelope::new("agent-1", "cluster-1"),
            INDEX.to_string(),
            backend,
            api,
            BulkConfig::default(),
            metrics.clone(),
        );
        (sink, metrics)
    }

    fn operations(docs: &[Value]) -> Vec<&str> {
        docs.iter()
            .filter_map(|doc| doc.pointer("/activity/operation")?.as_str())
            .collect()
    }

    #[tokio::test]
    async fn connectivity_records_cycle_start() {
        let backend = Arc::new(MemoryBackend::default());
        let api = Arc::new(FakeApi::default());
        let (sink, metrics) = mk_sink(backend.clone(), api.clone());

        sink.check_connectivity().await.unwrap();

        let docs = backend.documents(INDEX);
        assert_eq!(operations(&docs), vec![CYCLE_START]);
        assert_eq!(docs[0]["a"], "agent-1");
        assert_eq!(docs[0]["c"], "cluster-1");
        assert_eq!(*api.calls.lock(), vec!["onboarding-status"]);
        assert_eq!(metrics.indexed_count(DocType::Activity), 1);
    }

    #[tokio::test]
    async fn connectivity_failures_write_nothing() {
        let backend = Arc::new(MemoryBackend::default());
        backend.set_unavailable(Some("cluster health is red"));
        let (sink, _) = mk_sink(backend.clone(), Arc::new(FakeApi::default()));
        assert!(sink.check_connectivity().await.is_err());

        backend.set_unavailable(None);
        let api = Arc::new(FakeApi {
            down: true,
            ..Default::default()
        });
        let (sink, _) = mk_sink(backend.clone(), api);
        assert!(sink.check_connectivity().await.is_err());

        assert!(backend.documents(INDEX).is_empty());
    }

    #[tokio::test]
    async fn evicts_stale_snapshot_documents() {
        let backend = Arc::new(MemoryBackend::default());
        let (sink, _) = mk_sink(backend.clone(), Arc::new(FakeApi::default()));

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let doc = |agent: &str, at: DateTime<Utc>, doc_type: &str, name: &str| {
            json!({
                "@timestamp": format_timestamp(at),
                "a": agent,
                "c": "cluster-1",
                doc_type: { "name": name },
            })
        };
        let earlier = start - Duration::hours(12);
        for d in [
            doc("agent-1", earlier, "resource", "stale-resource"),
            doc("agent-1", earlier, "compliance", "stale-finding"),
            doc("agent-1", earlier, "cluster", "stale-cluster"),
            doc("agent-1", earlier, "activity", "history"),
            doc("agent-2", earlier, "resource", "other-agent"),
            doc("agent-1", start, "resource", "at-start"),
            doc("agent-1", start + Duration::milliseconds(1), "resource", "fresh"),
        ] {
            backend.insert(INDEX, d);
        }

        assert_eq!(sink.evict(start).await, 3);

        let remaining = backend
            .documents(INDEX)
            .iter()
            .filter_map(|doc| {
                ["resource", "compliance", "cluster", "activity"]
                    .iter()
                    .find_map(|t| doc.get(*t)?.get("name")?.as_str().map(String::from))
            })
            .collect::<Vec<_>>();
        assert_eq!(remaining, vec!["history", "other-agent", "at-start", "fresh"]);
    }

    #[tokio::test]
    async fn bulk_reports_are_flushed_on_close() {
        let backend = Arc::new(MemoryBackend::default());
        backend.reject_when(|doc| doc["resource"]["name"] == "bad");
        let (sink, metrics) = mk_sink(backend.clone(), Arc::new(FakeApi::default()));

        let reporter = sink.bulk();
        for name in ["web", "bad", "db"] {
            let doc = ResourceDocument {
                kind: "pods".to_string(),
                namespace: Some("default".to_string()),
                name: name.to_string(),
                raw_spec: json!({"metadata": {"labels": {"app.kubernetes.io/name": name}}}),
            };
            reporter.report(doc.into()).await;
        }
        let stats = reporter.close().await;

        assert_eq!(stats.flushed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(metrics.indexed_count(DocType::Resource), 2);
        assert_eq!(metrics.failed_count(DocType::Resource), 1);
        let docs = backend.documents(INDEX);
        assert!(docs.iter().all(|doc| doc["resource"]["rawSpec"]["metadata"]["labels"]
            .get("app_kubernetes_io/name")
            .is_some()));
    }

    #[tokio::test]
    async fn completion_is_recorded_even_if_api_fails() {
        let backend = Arc::new(MemoryBackend::default());
        let api = Arc::new(FakeApi {
            down: true,
            ..Default::default()
        });
        let (sink, _) = mk_sink(backend.clone(), api.clone());

        sink.complete_cycle().await;

        assert_eq!(*api.calls.lock(), vec!["sync-complete"]);
        assert_eq!(operations(&backend.documents(INDEX)), vec![CYCLE_COMPLETE]);
    }
}
