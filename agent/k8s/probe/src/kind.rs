use std::fmt;

/// The resource kinds the agent enumerates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Nodes,
    Namespaces,
    PersistentVolumes,
    CsiDrivers,
    CsiNodes,
    StorageClasses,

    Pods,
    ReplicationControllers,
    CsiStorageCapacities,
    Jobs,
    CronJobs,
    DaemonSets,
    Deployments,
    Services,
    StatefulSets,
    Events,
    HorizontalPodAutoscalers,
    Leases,
    PersistentVolumeClaims,
    ReplicaSets,
}

// === impl ResourceKind ===

impl ResourceKind {
    /// Cluster-scoped kinds, in walk order.
    pub const CLUSTER: [ResourceKind; 6] = [
        Self::Nodes,
        Self::Namespaces,
        Self::PersistentVolumes,
        Self::CsiDrivers,
        Self::CsiNodes,
        Self::StorageClasses,
    ];

    /// Namespaced kinds, in the order they are walked within each namespace.
    pub const NAMESPACED: [ResourceKind; 14] = [
        Self::Pods,
        Self::ReplicationControllers,
        Self::CsiStorageCapacities,
        Self::Jobs,
        Self::CronJobs,
        Self::DaemonSets,
        Self::Deployments,
        Self::Services,
        Self::StatefulSets,
        Self::Events,
        Self::HorizontalPodAutoscalers,
        Self::Leases,
        Self::PersistentVolumeClaims,
        Self::ReplicaSets,
    ];

    /// The plural, lowercase resource name, as used in API paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Namespaces => "namespaces",
            Self::PersistentVolumes => "persistentvolumes",
            Self::CsiDrivers => "csidrivers",
            Self::CsiNodes => "csinodes",
            Self::StorageClasses => "storageclasses",
            Self::Pods => "pods",
            Self::ReplicationControllers => "replicationcontrollers",
            Self::CsiStorageCapacities => "csistoragecapacities",
            Self::Jobs => "jobs",
            Self::CronJobs => "cronjobs",
            Self::DaemonSets => "daemonsets",
            Self::Deployments => "deployments",
            Self::Services => "services",
            Self::StatefulSets => "statefulsets",
            Self::Events => "events",
            Self::HorizontalPodAutoscalers => "horizontalpodautoscalers",
            Self::Leases => "leases",
            Self::PersistentVolumeClaims => "persistentvolumeclaims",
            Self::ReplicaSets => "replicasets",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
