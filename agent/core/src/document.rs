use crate::{Activity, ClusterInfo, ComplianceFinding, ComplianceRecord, ResourceDocument};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// Partitions the documents of one index by shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocType {
    Cluster,
    Resource,
    Compliance,
    Activity,
}

/// Everything the agent writes to the search index.
#[derive(Clone, Debug, PartialEq)]
pub enum Document {
    Cluster(ClusterInfo),
    Resource(ResourceDocument),
    Finding(ComplianceFinding),
    Record(ComplianceRecord),
    Activity(Activity),
}

/// Identifies the writer of a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub agent_id: String,
    pub cluster_id: String,
}

pub const TIMESTAMP_FIELD: &str = "@timestamp";
pub const AGENT_FIELD: &str = "a";
pub const CLUSTER_FIELD: &str = "c";

// === impl DocType ===

impl DocType {
    /// Doc types that are replaced by every cycle. Activities accumulate as
    /// history and are never evicted.
    pub const SNAPSHOT: [DocType; 3] = [Self::Cluster, Self::Resource, Self::Compliance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Resource => "resource",
            Self::Compliance => "compliance",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Document ===

impl Document {
    pub fn doc_type(&self) -> DocType {
        match self {
            Self::Cluster(_) => DocType::Cluster,
            Self::Resource(_) => DocType::Resource,
            Self::Finding(_) | Self::Record(_) => DocType::Compliance,
            Self::Activity(_) => DocType::Activity,
        }
    }

    /// A short, human-readable name for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Cluster(info) => format!("cluster#{}", info.provider),
            Self::Resource(res) => res.reference(),
            Self::Finding(f) => format!("{}#{}", f.plugin, f.rule_id),
            Self::Record(r) => match (r.data.get("namespace"), r.data.get("pod")) {
                (Some(ns), Some(pod)) => format!("{}#{ns}/{pod}", r.rule_id),
                _ => r.rule_id.clone(),
            },
            Self::Activity(a) => format!("{}#{}", a.operation, a.resource),
        }
    }

    fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::Cluster(info) => serde_json::to_value(info),
            Self::Resource(res) => serde_json::to_value(res),
            Self::Finding(finding) => serde_json::to_value(finding),
            Self::Record(record) => serde_json::to_value(record),
            Self::Activity(activity) => serde_json::to_value(activity),
        }
    }
}

impl From<ClusterInfo> for Document {
    fn from(info: ClusterInfo) -> Self {
        Self::Cluster(info)
    }
}

impl From<ResourceDocument> for Document {
    fn from(res: ResourceDocument) -> Self {
        Self::Resource(res)
    }
}

impl From<ComplianceFinding> for Document {
    fn from(finding: ComplianceFinding) -> Self {
        Self::Finding(finding)
    }
}

impl From<ComplianceRecord> for Document {
    fn from(record: ComplianceRecord) -> Self {
        Self::Record(record)
    }
}

impl From<Activity> for Document {
    fn from(activity: Activity) -> Self {
        Self::Activity(activity)
    }
}

// === impl Envelope ===

impl Envelope {
    pub fn new(agent_id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            cluster_id: cluster_id.into(),
        }
    }

    /// Wraps a document in the index's wire shape:
    ///
    /// ```json
    /// {"@timestamp": "...", "a": "<agent>", "c": "<cluster>", "<doc type>": {...}}
    /// ```
    ///
    /// Index field names may not contain dots, so every key in the payload has
    /// its dots replaced with underscores.
    pub fn encode(&self, timestamp: DateTime<Utc>, doc: &Document) -> serde_json::Result<Value> {
        let payload = underscore_keys(doc.payload()?);

        let mut obj = Map::with_capacity(4);
        obj.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::String(format_timestamp(timestamp)),
        );
        obj.insert(
            AGENT_FIELD.to_string(),
            Value::String(self.agent_id.clone()),
        );
        obj.insert(
            CLUSTER_FIELD.to_string(),
            Value::String(self.cluster_id.clone()),
        );
        obj.insert(doc.doc_type().as_str().to_string(), payload);
        Ok(Value::Object(obj))
    }
}

/// Formats timestamps the way documents and eviction queries compare them.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Recursively replaces `.` with `_` in every object key of a JSON tree.
pub fn underscore_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let k = if k.contains('.') { k.replace('.', "_") } else { k };
                    (k, underscore_keys(v))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(underscore_keys).collect()),
        value => value,
    }
}
