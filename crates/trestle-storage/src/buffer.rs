//! Background write buffer.
//!
//! Callers enqueue [`BufferedWrite`]s and return immediately; one dedicated
//! worker thread (`trestle-writer`) drains the queue in batches through a
//! [`BatchSink`]. A batch is written when the queue reaches the batch size,
//! when a caller asks for a flush, or when the buffer shuts down.
//!
//! The queue and its flags live behind one mutex; a single condition
//! variable wakes the worker when there is work and wakes flushing callers
//! when the worker makes progress.
//!
//! # Failures
//!
//! A batch that fails is rolled back by the sink and its entries are dropped.
//! The worker keeps running. The failure is returned to every `flush()` that
//! was waiting when it happened and to the next `flush()` call after it.
//! [`WriteBuffer::settle`] waits the same way but never reports failures.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use trestle_core::Triple;

use crate::error::StorageError;
use crate::lock::acquire_lock;
use crate::types::{BufferedWrite, GraphId, WriteOp};

/// Name of the worker thread.
pub const WORKER_NAME: &str = "trestle-writer";

/// Destination of drained batches.
pub trait BatchSink: Send + Sync {
    /// Writes every entry of `batch` in order, atomically if possible.
    fn write_batch(&self, batch: &[BufferedWrite]) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<BufferedWrite>,
    flush_requested: bool,
    terminate: bool,
    stopped: bool,
    in_flight: usize,
    batches: u64,
    failures: u64,
    /// Most recent failure, for callers that were waiting when it happened.
    last_failure: Option<(usize, Arc<StorageError>)>,
    /// Failure not yet returned by any flush.
    pending_failure: Option<(usize, Arc<StorageError>)>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    signal: Condvar,
    batch_size: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        acquire_lock(&self.state)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, QueueState>) -> MutexGuard<'a, QueueState> {
        self.signal
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO of pending writes drained by a background worker.
#[derive(Debug)]
pub struct WriteBuffer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteBuffer {
    /// Starts the worker thread.
    pub fn start<S>(sink: Arc<S>, batch_size: usize) -> Result<Self, StorageError>
    where
        S: BatchSink + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            signal: Condvar::new(),
            batch_size: batch_size.max(1),
        });
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(&worker_shared, sink.as_ref()))
            .map_err(StorageError::WorkerSpawn)?;

        Ok(WriteBuffer {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Appends a write to the queue.
    pub fn push(&self, entry: BufferedWrite) -> Result<(), StorageError> {
        let mut state = self.shared.lock();
        if state.stopped || state.terminate {
            return Err(StorageError::WriterStopped);
        }
        state.queue.push_back(entry);
        if state.queue.len() >= self.shared.batch_size {
            self.shared.signal.notify_all();
        }
        Ok(())
    }

    /// Removes queued inserts of `triple` into `graph`. Returns how many were
    /// removed.
    pub fn purge(&self, triple: &Triple, graph: GraphId) -> usize {
        let mut state = self.shared.lock();
        let before = state.queue.len();
        state
            .queue
            .retain(|w| !(w.op == WriteOp::Insert && w.graph == graph && &w.triple == triple));
        before - state.queue.len()
    }

    /// Removes every queued write targeting `graph`.
    pub fn purge_graph(&self, graph: GraphId) -> usize {
        let mut state = self.shared.lock();
        let before = state.queue.len();
        state.queue.retain(|w| w.graph != graph);
        before - state.queue.len()
    }

    /// Blocks until every write queued before the call has been processed.
    ///
    /// Returns [`StorageError::BatchFailed`] if a batch failed since the
    /// previous flush.
    pub fn flush(&self) -> Result<(), StorageError> {
        let (mut state, failures_at_entry) = self.drain()?;
        let pending = state.pending_failure.take();
        let failure = if state.failures > failures_at_entry {
            state.last_failure.clone()
        } else {
            pending
        };
        match failure {
            Some((entries, source)) => Err(StorageError::BatchFailed { entries, source }),
            None => Ok(()),
        }
    }

    /// Like [`flush`](Self::flush), but leaves batch failures for the next
    /// flush to report. For readers that only need queued writes applied.
    pub fn settle(&self) -> Result<(), StorageError> {
        self.drain().map(|_| ())
    }

    /// Requests a flush and waits for the queue to empty. Returns the locked
    /// state and the failure count seen on entry.
    fn drain(&self) -> Result<(MutexGuard<'_, QueueState>, u64), StorageError> {
        let mut state = self.shared.lock();
        if state.stopped || state.terminate {
            return Err(StorageError::WriterStopped);
        }
        let failures_at_entry = state.failures;
        state.flush_requested = true;
        self.shared.signal.notify_all();

        while !state.queue.is_empty() || state.in_flight > 0 || state.flush_requested {
            if state.stopped {
                return Err(StorageError::WriterStopped);
            }
            state = self.shared.wait(state);
        }
        Ok((state, failures_at_entry))
    }

    /// Flushes, stops the worker and waits for it to exit.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<(), StorageError> {
        let flushed = match self.flush() {
            Err(StorageError::WriterStopped) => Ok(()),
            other => other,
        };

        {
            let mut state = self.shared.lock();
            state.terminate = true;
            self.shared.signal.notify_all();
        }

        let handle = acquire_lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("background writer panicked");
            }
        }
        flushed
    }

    /// `true` if nothing is queued or being written.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.lock();
        state.queue.is_empty() && state.in_flight == 0
    }

    /// Number of queued writes.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Number of batches written successfully.
    pub fn batches_written(&self) -> u64 {
        self.shared.lock().batches
    }

    pub fn is_running(&self) -> bool {
        let state = self.shared.lock();
        !state.stopped && !state.terminate
    }
}

impl Drop for WriteBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "background writer shut down with a failed batch");
        }
    }
}

fn run_worker(shared: &Shared, sink: &dyn BatchSink) {
    loop {
        let batch: Vec<BufferedWrite> = {
            let mut state = shared.lock();
            loop {
                let ready = state.flush_requested
                    || state.terminate
                    || state.queue.len() >= shared.batch_size;
                if !state.queue.is_empty() && ready {
                    break;
                }
                if state.queue.is_empty() {
                    if state.flush_requested {
                        state.flush_requested = false;
                        shared.signal.notify_all();
                    }
                    if state.terminate {
                        state.stopped = true;
                        shared.signal.notify_all();
                        return;
                    }
                }
                state = shared.wait(state);
            }
            let take = state.queue.len().min(shared.batch_size);
            state.in_flight = take;
            state.queue.drain(..take).collect()
        };

        let started = Instant::now();
        let result = sink.write_batch(&batch);

        let mut state = shared.lock();
        state.in_flight = 0;
        match result {
            Ok(()) => {
                state.batches += 1;
                tracing::debug!(
                    entries = batch.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "batch written"
                );
            }
            Err(e) => {
                tracing::warn!(entries = batch.len(), error = %e, "batch failed and was rolled back");
                let failure = (batch.len(), Arc::new(e));
                state.failures += 1;
                state.last_failure = Some(failure.clone());
                state.pending_failure = Some(failure);
            }
        }
        if state.queue.is_empty() {
            state.flush_requested = false;
        }
        shared.signal.notify_all();
    }
}
