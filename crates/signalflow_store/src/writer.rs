// SPDX-License-Identifier: MIT OR Apache-2.0
//! Write-behind worker.
//!
//! Cache updates happen synchronously on the caller's thread; the durable
//! write is queued here and performed by a tokio current-thread runtime on
//! a dedicated thread. Backend calls run on the runtime's blocking pool one
//! at a time, so operations reach the backend in the order they were
//! queued. Failures are recorded as [`StoreNotice`]s that the owner drains
//! later, so a slow or failing backend never blocks or fails graph
//! propagation.

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

/// Which durable operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeOp {
    /// A put
    Write,
    /// A delete
    Delete,
}

/// A background persistence failure
#[derive(Debug, Clone)]
pub struct StoreNotice {
    /// Operation that failed
    pub op: NoticeOp,
    /// Collection name
    pub collection: String,
    /// Record key
    pub key: String,
    /// Error message
    pub message: String,
}

enum Op {
    Write {
        collection: String,
        key: String,
        payload: String,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    Delete {
        collection: String,
        key: String,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle used by collections to enqueue durable operations
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::UnboundedSender<Op>,
}

impl WriterHandle {
    /// Queue a write without waiting for it
    pub(crate) fn write(&self, collection: &str, key: &str, payload: String) {
        let op = Op::Write {
            collection: collection.to_string(),
            key: key.to_string(),
            payload,
            ack: None,
        };
        if self.tx.send(op).is_err() {
            tracing::error!("Dropped write of {}/{}: writer has shut down", collection, key);
        }
    }

    /// Queue a delete without waiting for it
    pub(crate) fn delete(&self, collection: &str, key: &str) {
        let op = Op::Delete {
            collection: collection.to_string(),
            key: key.to_string(),
            ack: None,
        };
        if self.tx.send(op).is_err() {
            tracing::error!("Dropped delete of {}/{}: writer has shut down", collection, key);
        }
    }

    /// Write and wait for the backend result
    pub(crate) fn write_now(&self, collection: &str, key: &str, payload: String) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Op::Write {
                collection: collection.to_string(),
                key: key.to_string(),
                payload,
                ack: Some(ack),
            })
            .map_err(|_| StoreError::WriterClosed)?;
        done.blocking_recv().map_err(|_| StoreError::WriterClosed)?
    }

    /// Delete and wait for the backend result
    pub(crate) fn delete_now(&self, collection: &str, key: &str) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Op::Delete {
                collection: collection.to_string(),
                key: key.to_string(),
                ack: Some(ack),
            })
            .map_err(|_| StoreError::WriterClosed)?;
        done.blocking_recv().map_err(|_| StoreError::WriterClosed)?
    }

    /// Block until every previously queued operation has been applied
    pub(crate) fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx.send(Op::Flush(ack)).map_err(|_| StoreError::WriterClosed)?;
        done.blocking_recv().map_err(|_| StoreError::WriterClosed)
    }
}

/// Owner of the background thread
pub(crate) struct Writer {
    handle: WriterHandle,
    notices: Arc<Mutex<Vec<StoreNotice>>>,
    thread: Option<JoinHandle<()>>,
}

impl Writer {
    /// Spawn the worker for a backend
    pub(crate) fn spawn(backend: Arc<dyn Backend>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let notices = Arc::new(Mutex::new(Vec::new()));
        let worker_notices = Arc::clone(&notices);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .thread_name("signalflow-store-io")
            .build()?;

        let thread = std::thread::Builder::new()
            .name("signalflow-store-writer".to_string())
            .spawn(move || runtime.block_on(run(backend, rx, worker_notices)))?;

        Ok(Self {
            handle: WriterHandle { tx },
            notices,
            thread: Some(thread),
        })
    }

    pub(crate) fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Take all failures recorded since the last call
    pub(crate) fn drain_notices(&self) -> Vec<StoreNotice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Op::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Persistence writer thread panicked");
            }
        }
    }
}

async fn run(
    backend: Arc<dyn Backend>,
    mut rx: mpsc::UnboundedReceiver<Op>,
    notices: Arc<Mutex<Vec<StoreNotice>>>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            Op::Write {
                collection,
                key,
                payload,
                ack,
            } => {
                let result = blocking(&backend, {
                    let (collection, key) = (collection.clone(), key.clone());
                    move |b| b.write(&collection, &key, &payload)
                })
                .await;
                settle(result, ack, &notices, NoticeOp::Write, collection, key);
            }
            Op::Delete {
                collection,
                key,
                ack,
            } => {
                let result = blocking(&backend, {
                    let (collection, key) = (collection.clone(), key.clone());
                    move |b| b.delete(&collection, &key)
                })
                .await;
                settle(result, ack, &notices, NoticeOp::Delete, collection, key);
            }
            Op::Flush(ack) => {
                let _ = ack.send(());
            }
            Op::Shutdown => break,
        }
    }
}

/// Run a backend call on the blocking pool and wait for it
async fn blocking<F>(backend: &Arc<dyn Backend>, call: F) -> Result<()>
where
    F: FnOnce(&dyn Backend) -> Result<()> + Send + 'static,
{
    let backend = Arc::clone(backend);
    tokio::task::spawn_blocking(move || call(backend.as_ref()))
        .await
        .map_err(|e| StoreError::Backend(format!("Backend task failed: {e}")))?
}

/// Hand the result to a waiting caller, or record it as a notice
fn settle(
    result: Result<()>,
    ack: Option<oneshot::Sender<Result<()>>>,
    notices: &Mutex<Vec<StoreNotice>>,
    op: NoticeOp,
    collection: String,
    key: String,
) {
    match (result, ack) {
        (result, Some(ack)) => {
            let _ = ack.send(result);
        }
        (Ok(()), None) => tracing::trace!("Persisted {}/{}", collection, key),
        (Err(e), None) => {
            tracing::error!("Background {:?} of {}/{} failed: {}", op, collection, key, e);
            notices.lock().push(StoreNotice {
                op,
                collection,
                key,
                message: e.to_string(),
            });
        }
    }
}
