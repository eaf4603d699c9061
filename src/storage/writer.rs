use super::persistence::RecordPersistence;
use crate::core::ScopeKey;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Level, event};

enum WriterCommand {
    Save {
        key: ScopeKey,
        records: Vec<serde_json::Value>,
    },
    Flush(oneshot::Sender<()>),
}

/// Background task that applies queued partition writes in order.
///
/// Callers enqueue and move on. A single task per store keeps writes ordered,
/// so the last enqueued list is the last one written. Failures are logged and
/// dropped: the in-memory ledger stays the source of truth for the session.
pub struct PersistenceWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
    join_handle: Option<JoinHandle<()>>,
}

impl PersistenceWriter {
    /// Spawns the writer on the current tokio runtime.
    pub fn spawn(persistence: Arc<dyn RecordPersistence>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterCommand>();

        let join_handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriterCommand::Save { key, records } => {
                        let count = records.len();
                        match persistence.save_records(&key, records).await {
                            Ok(()) => {
                                event!(Level::TRACE, scope = %key, records = count, "queue persisted");
                            }
                            Err(err) => {
                                event!(Level::WARN, scope = %key, error = %err, "queue persist failed");
                            }
                        }
                    }
                    WriterCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self {
            tx,
            join_handle: Some(join_handle),
        }
    }

    /// Queues a full overwrite of one partition. Never blocks, never fails.
    pub fn enqueue(&self, key: ScopeKey, records: Vec<serde_json::Value>) {
        if self.tx.send(WriterCommand::Save { key, records }).is_err() {
            event!(Level::WARN, "queue writer stopped; dropping persist request");
        }
    }

    /// Waits until every write queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Drains outstanding writes and stops the task.
    pub async fn shutdown(self) {
        let Self { tx, join_handle } = self;
        drop(tx);
        if let Some(join_handle) = join_handle {
            if let Err(err) = join_handle.await {
                event!(Level::WARN, error = %err, "queue writer join failed");
            }
        }
    }
}

impl std::fmt::Debug for PersistenceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWriter")
            .field("running", &self.join_handle.is_some())
            .finish()
    }
}
