use collie_agent_core::DocType;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct SinkMetrics {
    indexed: Family<DocLabels, Counter>,
    failed: Family<DocLabels, Counter>,
    evicted: Family<DocLabels, Counter>,
    connectivity_failures: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct DocLabels {
    doc_type: &'static str,
}

// === impl SinkMetrics ===

impl SinkMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let indexed = Family::<DocLabels, Counter>::default();
        reg.register(
            "indexed_documents",
            "Total number of documents written to the index",
            indexed.clone(),
        );

        let failed = Family::<DocLabels, Counter>::default();
        reg.register(
            "failed_documents",
            "Total number of documents that could not be written to the index",
            failed.clone(),
        );

        let evicted = Family::<DocLabels, Counter>::default();
        reg.register(
            "evicted_documents",
            "Total number of stale documents removed from the index",
            evicted.clone(),
        );

        let connectivity_failures = Counter::default();
        reg.register(
            "connectivity_failures",
            "Total number of cycles aborted because a backend was unreachable",
            connectivity_failures.clone(),
        );

        Self {
            indexed,
            failed,
            evicted,
            connectivity_failures,
        }
    }

    pub(crate) fn indexed(&self, doc_type: DocType) {
        self.indexed.get_or_create(&DocLabels::from(doc_type)).inc();
    }

    pub(crate) fn failed(&self, doc_type: DocType) {
        self.failed.get_or_create(&DocLabels::from(doc_type)).inc();
    }

    pub(crate) fn evicted(&self, doc_type: DocType, n: u64) {
        self.evicted
            .get_or_create(&DocLabels::from(doc_type))
            .inc_by(n);
    }

    pub(crate) fn connectivity_failed(&self) {
        self.connectivity_failures.inc();
    }

    #[cfg(test)]
    pub(crate) fn indexed_count(&self, doc_type: DocType) -> u64 {
        self.indexed.get_or_create(&DocLabels::from(doc_type)).get()
    }

    #[cfg(test)]
    pub(crate) fn failed_count(&self, doc_type: DocType) -> u64 {
        self.failed.get_or_create(&DocLabels::from(doc_type)).get()
    }
}

impl From<DocType> for DocLabels {
    fn from(doc_type: DocType) -> Self {
        Self {
            doc_type: doc_type.as_str(),
        }
    }
}
