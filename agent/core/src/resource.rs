use serde::{Deserialize, Serialize};

/// A cluster object as it was read during a resource walk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDocument {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub raw_spec: serde_json::Value,
}

impl ResourceDocument {
    /// Formats the `kind#name` or `kind#namespace/name` reference used in logs
    /// and activity events.
    pub fn reference(&self) -> String {
        reference(&self.kind, self.namespace.as_deref(), &self.name)
    }
}

pub fn reference(kind: &str, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{kind}#{ns}/{name}"),
        None => format!("{kind}#{name}"),
    }
}
