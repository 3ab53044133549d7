//! Delivers the agent's documents to its search index.
//!
//! The [`DocumentSink`] owns every outbound client: the search backend that
//! stores documents and the reporting API the agent checks in with. It is
//! constructed once and passed explicitly to each stage of a cycle.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backend;
pub mod bulk;
mod credentials;
mod elasticsearch;
mod error;
pub mod memory;
mod metrics;
mod reporting;
mod sink;

#[cfg(test)]
mod test_server;

pub use self::{
    backend::{EvictionQuery, ItemResult, SearchBackend},
    bulk::{BulkConfig, BulkIndexer, BulkItem, BulkStats},
    credentials::{Credentials, CredentialsError},
    elasticsearch::{Backoff, ElasticBackend},
    error::Error,
    memory::MemoryBackend,
    metrics::SinkMetrics,
    reporting::{HttpReportingApi, ReportingApi},
    sink::{index_name, BulkReporter, DocumentSink},
};

pub const DEFAULT_INDEX_PREFIX: &str = "collie-k8s-";
