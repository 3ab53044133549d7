use crate::{rules, ClusterApi, FetchError, Probe, ResourceKind};
use collie_agent_core::{resource::reference, Activity, Report};
use k8s_openapi::api::core::v1::Pod;
use tracing::{info_span, Instrument};

const LIST: &str = "list-res";
const GET: &str = "get-pod";

// === impl Probe ===

impl<C: ClusterApi> Probe<C> {
    /// Evaluates the pod rules against every pod outside the ignored
    /// namespaces, returning the number of records reported.
    pub async fn discover_policies(&self, sink: &dyn Report) -> Result<usize, FetchError> {
        let namespaces = self.cluster.list(ResourceKind::Namespaces, None).await?;

        let mut records = 0;
        for ns in namespaces.iter().filter(|ns| !self.is_ignored(ns)) {
            records += self
                .evaluate_namespace(ns, sink)
                .instrument(info_span!("policies", %ns))
                .await;
        }

        tracing::info!(%records, "Evaluated policies");
        Ok(records)
    }

    async fn evaluate_namespace(&self, ns: &str, sink: &dyn Report) -> usize {
        let kind = ResourceKind::Pods;
        let pods = match self.cluster.list(kind, Some(ns)).await {
            Ok(pods) => pods,
            Err(error) => {
                tracing::warn!(%error, "Failed to list pods");
                sink.report(Activity::error(LIST, format!("{kind}#{ns}"), &error).into())
                    .await;
                return 0;
            }
        };

        let mut records = 0;
        for name in &pods {
            let pod = match self.get_pod(ns, name).await {
                Ok(pod) => pod,
                Err(FetchError::NotFound) => {
                    tracing::debug!(%name, "Pod no longer exists");
                    continue;
                }
                Err(FetchError::Api(error)) => {
                    tracing::info!(%name, %error, "Failed to get pod");
                    continue;
                }
                Err(error) => {
                    tracing::warn!(%name, %error, "Failed to get pod");
                    let resource = reference(kind.as_str(), Some(ns), name);
                    sink.report(Activity::error(GET, resource, &error).into())
                        .await;
                    continue;
                }
            };

            for record in rules::evaluate(&pod) {
                tracing::debug!(pod = %name, rule = %record.rule_id, "Policy violated");
                sink.report(record.into()).await;
                records += 1;
            }
        }
        records
    }

    async fn get_pod(&self, ns: &str, name: &str) -> Result<Pod, FetchError> {
        let obj = self
            .cluster
            .get(ResourceKind::Pods, Some(ns), name)
            .await?;
        serde_json::from_value(obj).map_err(FetchError::other)
    }
}
