use crate::{DocType, Document};
use parking_lot::Mutex;
use std::sync::Arc;

/// Accepts documents produced during a cycle.
///
/// Reporting never fails from the caller's point of view: sinks log and count
/// their own write failures so that a single bad document cannot abort a
/// cycle.
#[async_trait::async_trait]
pub trait Report: Send + Sync {
    async fn report(&self, doc: Document);
}

/// Collects reported documents in memory.
#[derive(Debug, Default)]
pub struct Recorder(Mutex<Vec<Document>>);

#[async_trait::async_trait]
impl<R: Report + ?Sized> Report for Arc<R> {
    async fn report(&self, doc: Document) {
        (**self).report(doc).await
    }
}

// === impl Recorder ===

impl Recorder {
    pub fn documents(&self) -> Vec<Document> {
        self.0.lock().clone()
    }

    pub fn of_type(&self, doc_type: DocType) -> Vec<Document> {
        self.0
            .lock()
            .iter()
            .filter(|doc| doc.doc_type() == doc_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl Report for Recorder {
    async fn report(&self, doc: Document) {
        self.0.lock().push(doc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Activity;

    #[tokio::test]
    async fn records_through_shared_handles() {
        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn Report> = recorder.clone();
        sink.report(Activity::new("cycle-start", "").into()).await;
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.of_type(DocType::Activity).len(), 1);
        assert!(recorder.of_type(DocType::Resource).is_empty());
    }
}
