//! Background writer that saves dataset snapshots without blocking the caller.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use super::{DatasetSnapshot, KeyValueStore, encode_records};
use crate::status::StatusReporter;

enum PersistCommand {
    Save(DatasetSnapshot),
    Remove,
    Flush(Sender<()>),
}

/// Owns the writer thread; queued work is finished before the thread exits on drop.
pub struct PersistenceWriter {
    tx: Option<Sender<PersistCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl PersistenceWriter {
    pub fn spawn(store: Arc<dyn KeyValueStore>, key: String, status: StatusReporter) -> Self {
        let (tx, rx) = channel();
        let thread = thread::Builder::new()
            .name("dataset-persist".into())
            .spawn(move || run_writer(rx, store.as_ref(), &key, &status));
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!("Failed to start dataset writer thread: {err}");
                None
            }
        };
        Self {
            tx: Some(tx),
            thread,
        }
    }

    pub fn save(&self, snapshot: DatasetSnapshot) {
        self.send(PersistCommand::Save(snapshot));
    }

    pub fn remove(&self) {
        self.send(PersistCommand::Remove);
    }

    /// Block until every write queued before this call has been attempted.
    pub fn flush(&self) {
        let (done_tx, done_rx) = channel();
        if self.send(PersistCommand::Flush(done_tx)) {
            let _ = done_rx.recv();
        }
    }

    fn send(&self, command: PersistCommand) -> bool {
        match &self.tx {
            Some(tx) if self.thread.is_some() => tx.send(command).is_ok(),
            _ => false,
        }
    }
}

impl Drop for PersistenceWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

fn run_writer(
    rx: Receiver<PersistCommand>,
    store: &dyn KeyValueStore,
    key: &str,
    status: &StatusReporter,
) {
    while let Ok(first) = rx.recv() {
        let mut latest_write = None;
        let mut waiting = Vec::new();
        // Only the newest save/remove in a burst matters; earlier ones are superseded.
        for command in std::iter::once(first).chain(rx.try_iter()) {
            match command {
                PersistCommand::Flush(done) => waiting.push(done),
                write => latest_write = Some(write),
            }
        }
        match latest_write {
            Some(PersistCommand::Save(snapshot)) => write_snapshot(store, key, &snapshot, status),
            Some(PersistCommand::Remove) => {
                if let Err(err) = store.delete(key) {
                    status.warn(format!("Failed to remove saved dataset: {err}"));
                }
            }
            Some(PersistCommand::Flush(_)) | None => {}
        }
        for done in waiting {
            let _ = done.send(());
        }
    }
}

fn write_snapshot(
    store: &dyn KeyValueStore,
    key: &str,
    snapshot: &DatasetSnapshot,
    status: &StatusReporter,
) {
    let bytes = match encode_records(snapshot) {
        Ok(bytes) => bytes,
        Err(err) => {
            status.warn(format!("Failed to encode dataset for saving: {err}"));
            return;
        }
    };
    match store.set(key, &bytes) {
        Ok(()) => tracing::debug!("Saved {} training examples", snapshot.len()),
        Err(err) => status.warn(format!("Failed to save dataset: {err}")),
    }
}
