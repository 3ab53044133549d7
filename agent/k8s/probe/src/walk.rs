use crate::{ClusterApi, FetchError, Probe, ResourceKind};
use collie_agent_core::{resource::reference, Activity, Report, ResourceDocument};
use tracing::{info_span, Instrument};

const LIST: &str = "list-res";
const GET: &str = "get-res";

/// Counts the outcomes of a resource walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub namespaces: usize,
    pub documents: usize,

    /// Objects that vanished or were rejected by the API server between
    /// being listed and being fetched.
    pub skipped: usize,

    /// Failures reported as activities.
    pub failures: usize,
}

// === impl Probe ===

impl<C: ClusterApi> Probe<C> {
    /// Reports every object of every supported kind.
    ///
    /// Cluster-scoped kinds are walked first, then each namespace's kinds in
    /// turn. A kind that fails to list is reported and skipped; failing to
    /// list namespaces ends the walk once the remaining cluster-scoped kinds
    /// have been reported.
    pub async fn discover_resources(&self, sink: &dyn Report) -> Result<WalkSummary, FetchError> {
        let mut summary = WalkSummary::default();

        let mut namespaces = Ok(Vec::new());
        for kind in ResourceKind::CLUSTER {
            let walk = self
                .walk(kind, None, sink, &mut summary)
                .instrument(info_span!("walk", %kind));
            match walk.await {
                Ok(names) if kind == ResourceKind::Namespaces => namespaces = Ok(names),
                Ok(_) => {}
                Err(error) if kind == ResourceKind::Namespaces => {
                    tracing::warn!(%error, "Failed to list namespaces");
                    namespaces = Err(error);
                }
                Err(error) => self.list_failed(kind, None, error, sink, &mut summary).await,
            }
        }

        let namespaces = namespaces?;
        for ns in &namespaces {
            summary.namespaces += 1;
            for kind in ResourceKind::NAMESPACED {
                let walk = self
                    .walk(kind, Some(ns), sink, &mut summary)
                    .instrument(info_span!("walk", %kind, %ns));
                if let Err(error) = walk.await {
                    self.list_failed(kind, Some(ns), error, sink, &mut summary)
                        .await;
                }
            }
        }

        tracing::info!(
            namespaces = summary.namespaces,
            documents = summary.documents,
            skipped = summary.skipped,
            failures = summary.failures,
            "Discovered resources"
        );
        Ok(summary)
    }

    /// Lists a kind and reports each object, returning the listed names.
    async fn walk(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        sink: &dyn Report,
        summary: &mut WalkSummary,
    ) -> Result<Vec<String>, FetchError> {
        let names = self.cluster.list(kind, namespace).await?;
        tracing::debug!(items = names.len(), "Listed");

        for name in &names {
            match self.cluster.get(kind, namespace, name).await {
                Ok(raw_spec) => {
                    let doc = ResourceDocument {
                        kind: kind.to_string(),
                        namespace: namespace.map(Into::into),
                        name: name.clone(),
                        raw_spec,
                    };
                    sink.report(doc.into()).await;
                    summary.documents += 1;
                }
                Err(FetchError::NotFound) => {
                    tracing::debug!(%name, "Resource no longer exists");
                    summary.skipped += 1;
                }
                Err(FetchError::Api(error)) => {
                    tracing::info!(%name, %error, "Failed to get resource");
                    summary.skipped += 1;
                }
                Err(error) => {
                    tracing::warn!(%name, %error, "Failed to get resource");
                    let resource = reference(kind.as_str(), namespace, name);
                    sink.report(Activity::error(GET, resource, &error).into())
                        .await;
                    summary.failures += 1;
                }
            }
        }

        Ok(names)
    }

    async fn list_failed(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        error: FetchError,
        sink: &dyn Report,
        summary: &mut WalkSummary,
    ) {
        tracing::warn!(%kind, ns = ?namespace, %error, "Failed to list resources");
        let resource = match namespace {
            Some(ns) => format!("{kind}#{ns}"),
            None => kind.to_string(),
        };
        sink.report(Activity::error(LIST, resource, &error).into())
            .await;
        summary.failures += 1;
    }
}
