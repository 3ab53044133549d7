//! Policy rules evaluated against live pods.

use collie_agent_core::{ComplianceRecord, Severity};
use k8s_openapi::api::core::v1::{ContainerPort, Pod};

pub type PodRule = fn(&Pod) -> Option<ComplianceRecord>;

pub const DEPRECATE_HOST_PORT: &str = "deprecate-host-port";
pub const DEPRECATE_HOST_IP: &str = "deprecate-host-ip";

/// Every rule is evaluated against every pod, in this order.
pub const POD_RULES: [PodRule; 2] = [deprecate_host_port, deprecate_host_ip];

/// Evaluates all pod rules, returning one record per violated rule, each
/// decorated with the pod's name and namespace.
pub fn evaluate(pod: &Pod) -> Vec<ComplianceRecord> {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    POD_RULES
        .iter()
        .filter_map(|rule| rule(pod))
        .map(|mut record| {
            record.decorate([("pod", name.clone()), ("namespace", namespace.clone())]);
            record
        })
        .collect()
}

pub fn deprecate_host_port(pod: &Pod) -> Option<ComplianceRecord> {
    any_port(pod, |port| port.host_port.is_some_and(|p| p != 0))
        .then(|| ComplianceRecord::new(DEPRECATE_HOST_PORT, Severity::Info))
}

pub fn deprecate_host_ip(pod: &Pod) -> Option<ComplianceRecord> {
    any_port(pod, |port| port.host_ip.as_deref().is_some_and(|ip| !ip.is_empty()))
        .then(|| ComplianceRecord::new(DEPRECATE_HOST_IP, Severity::Info))
}

fn any_port(pod: &Pod, f: impl Fn(&ContainerPort) -> bool) -> bool {
    pod.spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .flat_map(|container| container.ports.iter().flatten())
        .any(f)
}
