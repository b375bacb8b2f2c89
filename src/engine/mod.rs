mod error;
mod mutations;
mod queries;
mod store;
pub mod validator;

pub use error::{EngineError, Missing};
pub use mutations::admitted_count;
pub use store::{RequestStore, SharedEventRequests};

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::directory::{Directory, DirectoryError};
use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

/// Write record to WAL via the background group-commit writer.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, record: &Record) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            record: record.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::WalError(e.to_string()))
}

pub(super) enum WalCommand {
    Append {
        record: Record,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<Record>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    #[cfg(test)]
    FailNextFlush {
        written: usize,
        response: oneshot::Sender<()>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { record, response } => {
                let mut batch = vec![(record, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { record, response }) => {
                            batch.push((record, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Record, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::warn!("WAL flush failed for {} records: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

/// The batch is durable as a whole or not at all: every caller is told the same result.
fn flush_batch(wal: &mut Wal, batch: &[(Record, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    for (record, _) in batch {
        if let Err(e) = wal.append_buffered(record) {
            wal.discard_staged();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn respond_batch(batch: &mut Vec<(Record, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        #[cfg(test)]
        WalCommand::FailNextFlush { written, response } => {
            wal.fail_next_flush(written);
            let _ = response.send(());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Admission engine: owns the request store, the WAL writer and the directory handle.
///
/// Every mutation of an event's requests runs under that event's write lock,
/// from reading the confirmed count until the record is durable and applied.
pub struct Engine {
    pub(super) store: Arc<RequestStore>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) directory: Arc<dyn Directory>,
    source_timeout: Duration,
    /// Mutations hold this shared; compaction holds it exclusively so the
    /// snapshot it writes cannot miss a concurrently appended record.
    pub(super) compaction: Arc<RwLock<()>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        directory: Arc<dyn Directory>,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let records = Wal::replay(&config.wal_path)?;
        let store = RequestStore::from_records(&records);
        tracing::info!(
            "replayed {} records for {} events from {}",
            records.len(),
            store.event_count(),
            config.wal_path.display()
        );
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(store.event_count() as f64);

        let wal = Wal::open(&config.wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            store: Arc::new(store),
            wal_tx,
            notify,
            directory,
            source_timeout: config.source_timeout,
            compaction: Arc::new(RwLock::new(())),
        })
    }

    /// Shared hold on the compaction gate, owned so a commit task can keep it.
    pub(super) async fn enter_mutation(&self) -> OwnedRwLockReadGuard<()> {
        self.compaction.clone().read_owned().await
    }

    /// WAL-append + apply + notify. Nothing is applied unless the append is durable.
    ///
    /// Runs as its own task holding both guards: once the record is handed to the
    /// writer, it is applied to memory even if the caller stops waiting.
    pub(super) async fn persist_and_apply(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut guard: OwnedRwLockWriteGuard<EventRequests>,
        record: Record,
    ) -> Result<OwnedRwLockWriteGuard<EventRequests>, EngineError> {
        let wal_tx = self.wal_tx.clone();
        let store = self.store.clone();
        let notify = self.notify.clone();
        let commit = tokio::spawn(async move {
            let _gate = gate;
            wal_append(&wal_tx, &record).await?;
            store.apply_record(&mut guard, &record);
            notify.send(guard.event_id, &record);
            Ok::<_, EngineError>(guard)
        });
        commit
            .await
            .map_err(|e| EngineError::WalError(format!("commit task failed: {e}")))?
    }

    /// Make the WAL writer fail its next flush after writing `written` bytes.
    #[cfg(test)]
    pub(super) async fn fail_next_wal_flush(&self, written: usize) {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::FailNextFlush { written, response: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Lookup request → event, acquire that event's write lock.
    pub(super) async fn resolve_request_write(
        &self,
        request_id: &Ulid,
    ) -> Result<(EventId, OwnedRwLockWriteGuard<EventRequests>), EngineError> {
        let event_id = self
            .store
            .event_for_request(request_id)
            .ok_or(EngineError::NotFound(Missing::Request(*request_id)))?;
        let er = self
            .store
            .get_event(&event_id)
            .ok_or(EngineError::NotFound(Missing::Event(event_id)))?;
        let guard = er.write_owned().await;
        Ok((event_id, guard))
    }

    fn timeout_ms(&self) -> u64 {
        self.source_timeout.as_millis() as u64
    }

    /// Fetch an event definition, bounded by the source timeout.
    pub(super) async fn lookup_event(&self, event_id: EventId) -> Result<EventDefinition, EngineError> {
        let definition = tokio::time::timeout(self.source_timeout, self.directory.event(event_id))
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout_ms()))??;
        definition.ok_or(EngineError::NotFound(Missing::Event(event_id)))
    }

    pub(super) async fn ensure_user(&self, user_id: UserId) -> Result<(), EngineError> {
        let exists = tokio::time::timeout(self.source_timeout, self.directory.user_exists(user_id))
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout_ms()))??;
        if exists {
            Ok(())
        } else {
            Err(EngineError::NotFound(Missing::User(user_id)))
        }
    }

    pub fn event_count(&self) -> usize {
        self.store.event_count()
    }
}
