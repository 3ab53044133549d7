use crate::{ClusterApi, FetchError, ResourceKind};
use k8s_openapi::api::{
    apps::v1 as apps, autoscaling::v2 as autoscaling, batch::v1 as batch,
    coordination::v1 as coordination, core::v1 as corev1, storage::v1 as storage,
};
use kube::{
    api::{Api, ApiResource, DynamicObject, ListParams, LogParams},
    Client,
};
use std::time::Duration;
use tokio::time;

/// Reads cluster state through the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

// === impl KubeCluster ===

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = api_resource(kind);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeCluster {
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<String>, FetchError> {
        let list = self
            .api(kind, namespace)
            .list_metadata(&ListParams::default())
            .await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|obj| obj.metadata.name)
            .collect())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<serde_json::Value, FetchError> {
        let obj = self.api(kind, namespace).get(name).await?;
        serde_json::to_value(obj).map_err(FetchError::other)
    }

    async fn server_version(&self) -> Result<serde_json::Value, FetchError> {
        let info = self.client.apiserver_version().await?;
        serde_json::to_value(info).map_err(FetchError::other)
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String, FetchError> {
        let api = Api::<corev1::Pod>::namespaced(self.client.clone(), namespace);
        let logs = api.logs(name, &LogParams::default()).await?;
        Ok(logs)
    }

    async fn await_pod_terminated(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<bool, FetchError> {
        let api = Api::<corev1::Pod>::namespaced(self.client.clone(), namespace);
        let terminated = kube::runtime::wait::await_condition(api, name, is_terminated);
        match time::timeout(timeout, terminated).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(error)) => Err(FetchError::other(error)),
            Err(_timeout) => Ok(false),
        }
    }
}

fn is_terminated(pod: Option<&corev1::Pod>) -> bool {
    let phase = pod
        .and_then(|pod| pod.status.as_ref())
        .and_then(|status| status.phase.as_deref());
    matches!(phase, Some("Succeeded" | "Failed"))
}

fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Nodes => ApiResource::erase::<corev1::Node>(&()),
        ResourceKind::Namespaces => ApiResource::erase::<corev1::Namespace>(&()),
        ResourceKind::PersistentVolumes => ApiResource::erase::<corev1::PersistentVolume>(&()),
        ResourceKind::CsiDrivers => ApiResource::erase::<storage::CSIDriver>(&()),
        ResourceKind::CsiNodes => ApiResource::erase::<storage::CSINode>(&()),
        ResourceKind::StorageClasses => ApiResource::erase::<storage::StorageClass>(&()),
        ResourceKind::Pods => ApiResource::erase::<corev1::Pod>(&()),
        ResourceKind::ReplicationControllers => {
            ApiResource::erase::<corev1::ReplicationController>(&())
        }
        ResourceKind::CsiStorageCapacities => {
            ApiResource::erase::<storage::CSIStorageCapacity>(&())
        }
        ResourceKind::Jobs => ApiResource::erase::<batch::Job>(&()),
        ResourceKind::CronJobs => ApiResource::erase::<batch::CronJob>(&()),
        ResourceKind::DaemonSets => ApiResource::erase::<apps::DaemonSet>(&()),
        ResourceKind::Deployments => ApiResource::erase::<apps::Deployment>(&()),
        ResourceKind::Services => ApiResource::erase::<corev1::Service>(&()),
        ResourceKind::StatefulSets => ApiResource::erase::<apps::StatefulSet>(&()),
        ResourceKind::Events => ApiResource::erase::<corev1::Event>(&()),
        ResourceKind::HorizontalPodAutoscalers => {
            ApiResource::erase::<autoscaling::HorizontalPodAutoscaler>(&())
        }
        ResourceKind::Leases => ApiResource::erase::<coordination::Lease>(&()),
        ResourceKind::PersistentVolumeClaims => {
            ApiResource::erase::<corev1::PersistentVolumeClaim>(&())
        }
        ResourceKind::ReplicaSets => ApiResource::erase::<apps::ReplicaSet>(&()),
    }
}

impl From<kube::Error> for FetchError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(rsp) if rsp.code == 404 => Self::NotFound,
            kube::Error::Api(rsp) => Self::Api(rsp.message),
            error => Self::Other(error.into()),
        }
    }
}
