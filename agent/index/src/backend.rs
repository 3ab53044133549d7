use crate::Error;
use chrono::{DateTime, SubsecRound, Utc};
use collie_agent_core::{
    document::{format_timestamp, AGENT_FIELD, TIMESTAMP_FIELD},
    DocType,
};
use serde_json::{json, Value};

/// The index the agent writes documents to.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    /// Fetches basic information about the backend.
    async fn info(&self) -> Result<Value, Error>;

    async fn cluster_health(&self) -> Result<Value, Error>;

    async fn index(&self, index: &str, doc: Value) -> Result<(), Error>;

    /// Writes a batch of documents. The request as a whole fails only when
    /// the batch could not be submitted; otherwise one result is returned per
    /// document, in order.
    async fn bulk(&self, index: &str, docs: Vec<Value>) -> Result<Vec<ItemResult>, Error>;

    /// Deletes the documents matching `query`, returning how many were
    /// removed.
    async fn delete_stale(&self, index: &str, query: &EvictionQuery) -> Result<u64, Error>;
}

/// The outcome of one document in a bulk request. Failures carry the
/// backend's reason.
pub type ItemResult = Result<(), String>;

/// Selects an agent's documents of one type written before a cycle started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictionQuery {
    pub before: DateTime<Utc>,
    pub agent_id: String,
    pub doc_type: DocType,
}

// === impl EvictionQuery ===

impl EvictionQuery {
    pub fn to_json(&self) -> Value {
        json!({
            "query": {
                "bool": {
                    "must": [
                        { "range": { TIMESTAMP_FIELD: { "lt": format_timestamp(self.before) } } },
                        { "term": { AGENT_FIELD: self.agent_id } },
                    ],
                    "filter": [
                        { "exists": { "field": self.doc_type.as_str() } },
                    ],
                }
            }
        })
    }

    /// Evaluates the query against an encoded document.
    pub fn matches(&self, doc: &Value) -> bool {
        let before = self.before.trunc_subsecs(3);
        let stamped_before = doc
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .is_some_and(|ts| ts.with_timezone(&Utc) < before);
        let same_agent =
            doc.get(AGENT_FIELD).and_then(Value::as_str) == Some(self.agent_id.as_str());
        let has_type = doc.get(self.doc_type.as_str()).is_some();
        stamped_before && same_agent && has_type
    }
}
