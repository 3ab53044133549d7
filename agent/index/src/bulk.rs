//! Batches documents into bulk requests.
//!
//! Documents are distributed across a fixed pool of workers. Each worker
//! owns a bounded queue, so producers wait when a worker falls behind, and
//! flushes its batch when it grows past a size threshold or when the flush
//! interval elapses, whichever comes first.

use crate::SearchBackend;
use serde_json::Value;
use std::{
    mem,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

pub(crate) const ACTION_LINE: &str = "{\"index\":{}}\n";

const QUEUE_CAPACITY: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BulkConfig {
    pub workers: usize,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
}

/// A document to be indexed along with callbacks notified of its outcome.
pub struct BulkItem {
    doc: Value,
    on_success: Option<Box<dyn FnOnce() + Send>>,
    on_failure: Option<Box<dyn FnOnce(&str) + Send>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkStats {
    pub added: u64,
    pub flushed: u64,
    pub failed: u64,
    pub requests: u64,
}

pub struct BulkIndexer {
    queues: Vec<mpsc::Sender<BulkItem>>,
    next: AtomicUsize,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    started: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    added: AtomicU64,
    flushed: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
}

struct Worker {
    backend: Arc<dyn SearchBackend>,
    index: Arc<str>,
    counters: Arc<Counters>,
    flush_bytes: usize,
    batch: Vec<BulkItem>,
    bytes: usize,
}

// === impl BulkConfig ===

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            flush_bytes: 5_000_000,
            flush_interval: Duration::from_secs(30),
        }
    }
}

// === impl BulkItem ===

impl BulkItem {
    pub fn new(doc: Value) -> Self {
        Self {
            doc,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn on_success(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnOnce(&str) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    fn succeed(self) {
        if let Some(f) = self.on_success {
            f();
        }
    }

    fn fail(self, reason: &str) {
        if let Some(f) = self.on_failure {
            f(reason);
        }
    }

    /// The number of bytes this item adds to a bulk request body.
    fn encoded_len(&self) -> usize {
        ACTION_LINE.len() + self.doc.to_string().len() + 1
    }
}

// === impl BulkIndexer ===

impl BulkIndexer {
    /// Spawns the worker pool on the current runtime.
    pub fn spawn(backend: Arc<dyn SearchBackend>, index: &str, config: BulkConfig) -> Self {
        let counters = Arc::new(Counters::default());
        let index = Arc::<str>::from(index);

        let (queues, workers) = (0..config.workers.max(1))
            .map(|_| {
                let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
                let worker = Worker {
                    backend: backend.clone(),
                    index: index.clone(),
                    counters: counters.clone(),
                    flush_bytes: config.flush_bytes,
                    batch: Vec::new(),
                    bytes: 0,
                };
                (tx, tokio::spawn(worker.run(rx, config.flush_interval)))
            })
            .unzip();

        Self {
            queues,
            next: AtomicUsize::new(0),
            workers,
            counters,
            started: Instant::now(),
        }
    }

    /// Queues an item, waiting while the selected worker's queue is full.
    pub async fn add(&self, item: BulkItem) {
        self.counters.added.fetch_add(1, Ordering::Relaxed);
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        if let Err(mpsc::error::SendError(item)) = self.queues[i].send(item).await {
            tracing::warn!(worker = %i, "Bulk worker stopped; dropping document");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            item.fail("bulk worker stopped");
        }
    }

    pub fn stats(&self) -> BulkStats {
        self.counters.snapshot()
    }

    /// Flushes all queued items and stops the workers.
    pub async fn close(self) -> BulkStats {
        drop(self.queues);
        for worker in self.workers {
            if let Err(error) = worker.await {
                tracing::warn!(%error, "Bulk worker failed");
            }
        }

        let stats = self.counters.snapshot();
        let elapsed = self.started.elapsed();
        let rate = stats.flushed as f64 / elapsed.as_secs_f64().max(0.001);
        tracing::info!(
            documents = stats.flushed,
            failures = stats.failed,
            requests = stats.requests,
            ?elapsed,
            rate = %format_args!("{rate:.0}/s"),
            "Bulk indexing complete"
        );
        stats
    }
}

// === impl Worker ===

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<BulkItem>, flush_interval: Duration) {
        let mut flush = time::interval_at(Instant::now() + flush_interval, flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(item) => {
                        self.bytes += item.encoded_len();
                        self.batch.push(item);
                        if self.bytes >= self.flush_bytes {
                            self.flush().await;
                        }
                    }
                    None => break,
                },
                _ = flush.tick() => self.flush().await,
            }
        }

        self.flush().await;
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = mem::take(&mut self.batch);
        let bytes = mem::take(&mut self.bytes);
        tracing::debug!(items = batch.len(), %bytes, "Flushing");

        let (docs, items): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .map(|mut item| (mem::take(&mut item.doc), item))
            .unzip();
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        match self.backend.bulk(&self.index, docs).await {
            Ok(results) => {
                for (item, result) in items.into_iter().zip(results) {
                    match result {
                        Ok(()) => {
                            self.counters.flushed.fetch_add(1, Ordering::Relaxed);
                            item.succeed();
                        }
                        Err(reason) => {
                            tracing::debug!(%reason, "Document rejected");
                            self.counters.failed.fetch_add(1, Ordering::Relaxed);
                            item.fail(&reason);
                        }
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%error, items = items.len(), "Bulk request failed");
                let reason = error.to_string();
                for item in items {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    item.fail(&reason);
                }
            }
        }
    }
}

// === impl Counters ===

impl Counters {
    fn snapshot(&self) -> BulkStats {
        BulkStats {
            added: self.added.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }
}
