//! Asynchronous record writer
//!
//! Snapshots are queued on an unbounded channel and written by a dedicated
//! thread, so a slow disk never delays a tick. [`LogSink::finish`] is the
//! flush barrier: it returns only after every queued snapshot has been
//! written and the store closed.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::error::StorageError;
use crate::record::{RecordLayout, RecordStore};
use crate::snapshot::Snapshot;

/// Outcome of a finished sink
#[derive(Debug, Default)]
pub struct SinkReport {
    /// Rows written, header excluded
    pub records: u64,
    /// First storage failure; nothing was written after it
    pub error: Option<StorageError>,
}

/// Owner of the record writer thread
#[derive(Debug)]
pub struct LogSink {
    tx: Sender<Arc<Snapshot>>,
    worker: JoinHandle<SinkReport>,
}

impl LogSink {
    pub fn spawn(store: Box<dyn RecordStore>, layout: RecordLayout) -> Result<Self, StorageError> {
        let (tx, rx) = channel::<Arc<Snapshot>>();
        let worker = thread::Builder::new()
            .name("record-writer".into())
            .spawn(move || write_records(rx, store, layout))
            .map_err(StorageError::Spawn)?;
        Ok(Self { tx, worker })
    }

    /// Producer handle for another thread.
    ///
    /// Every handle must be dropped before [`finish`](Self::finish) can
    /// return.
    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn submit(&self, snapshot: Arc<Snapshot>) {
        submit(&self.tx, snapshot);
    }

    /// Close the queue and wait until it is drained and the store closed.
    pub fn finish(self) -> SinkReport {
        let Self { tx, worker } = self;
        drop(tx);
        worker.join().unwrap_or_else(|_| {
            error!("record writer panicked");
            SinkReport {
                records: 0,
                error: Some(StorageError::WorkerDisconnected),
            }
        })
    }
}

/// Cloneable producer side of a [`LogSink`]
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: Sender<Arc<Snapshot>>,
}

impl SinkHandle {
    /// Queue a snapshot for writing. Never blocks.
    pub fn submit(&self, snapshot: Arc<Snapshot>) {
        submit(&self.tx, snapshot);
    }
}

fn submit(tx: &Sender<Arc<Snapshot>>, snapshot: Arc<Snapshot>) {
    if tx.send(snapshot).is_err() {
        debug!("record writer gone, snapshot dropped");
    }
}

fn write_records(
    rx: Receiver<Arc<Snapshot>>,
    mut store: Box<dyn RecordStore>,
    layout: RecordLayout,
) -> SinkReport {
    let mut report = SinkReport::default();

    for snapshot in rx {
        if report.error.is_some() {
            continue;
        }
        match store.append(&layout.row(&snapshot)) {
            Ok(()) => report.records += 1,
            Err(e) => {
                error!("recording disabled for this session: {e}");
                report.error = Some(e);
            }
        }
    }

    if let Err(e) = store.close() {
        error!("cannot close record file: {e}");
        report.error.get_or_insert(e);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;
    use crate::snapshot::tests::snapshot;
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    struct MemoryStore {
        rows: Arc<Mutex<Vec<Vec<String>>>>,
        closed: Arc<Mutex<bool>>,
        fail_after: Option<usize>,
    }

    impl RecordStore for MemoryStore {
        fn append(&mut self, row: &[String]) -> Result<(), StorageError> {
            let mut rows = self.rows.lock().unwrap();
            if self.fail_after.is_some_and(|n| rows.len() >= n) {
                return Err(StorageError::Flush(std::io::Error::other("disk full")));
            }
            rows.push(row.to_vec());
            Ok(())
        }

        fn close(&mut self) -> Result<(), StorageError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn layout() -> RecordLayout {
        RecordLayout::new(vec![Column::Raw, Column::Velocity("raw".into())])
    }

    #[test]
    fn test_finish_drains_every_snapshot() {
        let store = MemoryStore::default();
        let sink = LogSink::spawn(Box::new(store.clone()), layout()).unwrap();
        for i in 0..1000 {
            sink.submit(Arc::new(snapshot(i)));
        }
        let report = sink.finish();

        assert_eq!(report.records, 1000);
        assert!(report.error.is_none());
        assert!(*store.closed.lock().unwrap());

        let rows = store.rows.lock().unwrap();
        assert_eq!(rows.len(), 1000);
        assert!(rows.iter().all(|row| row.len() == layout().header().len()));
    }

    #[test]
    fn test_storage_failure_stops_writing() {
        let store = MemoryStore {
            fail_after: Some(5),
            ..Default::default()
        };
        let sink = LogSink::spawn(Box::new(store.clone()), layout()).unwrap();
        for i in 0..20 {
            sink.submit(Arc::new(snapshot(i)));
        }
        let report = sink.finish();

        assert_eq!(report.records, 5);
        assert!(report.error.is_some());
        assert_eq!(store.rows.lock().unwrap().len(), 5);
        assert!(*store.closed.lock().unwrap());
    }

    #[test]
    fn test_finish_waits_for_handles_from_other_threads() {
        let store = MemoryStore::default();
        let sink = LogSink::spawn(Box::new(store.clone()), layout()).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let handle = sink.handle();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        handle.submit(Arc::new(snapshot(i)));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(sink.finish().records, 1000);
        assert_eq!(store.rows.lock().unwrap().len(), 1000);
    }

    #[test]
    fn test_empty_session() {
        let store = MemoryStore::default();
        let report = LogSink::spawn(Box::new(store.clone()), layout()).unwrap().finish();
        assert_eq!(report.records, 0);
        assert!(*store.closed.lock().unwrap());
    }
}
