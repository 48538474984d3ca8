//! The batching pipeline between request threads and a record sink.
//!
//! Any number of producers enqueue records onto one bounded channel with a
//! non-blocking attempt; a small fixed pool of workers drains it, batches
//! greedily up to a size limit, and flushes immediately whenever anything
//! was pulled, favoring lower latency over maximal batching. On a full
//! queue the record is dropped and a warning logged; the caller is never
//! blocked or failed.

use std::cmp::min;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use std::{env, str::FromStr};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::warn;

use crate::error::{TraceError, TraceResult};
use crate::record::SpanRecord;
use crate::recorder::{RecordExporter, Recorder};

/// Maximum queue size.
pub(crate) const TRACEPIPE_MAX_QUEUE_SIZE: &str = "TRACEPIPE_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub(crate) const TRACEPIPE_MAX_QUEUE_SIZE_DEFAULT: usize = 50_000;
/// Maximum batch size, must be less than or equal to the queue size.
pub(crate) const TRACEPIPE_MAX_BATCH_SIZE: &str = "TRACEPIPE_MAX_BATCH_SIZE";
/// Default maximum batch size.
pub(crate) const TRACEPIPE_MAX_BATCH_SIZE_DEFAULT: usize = 100;
/// Interval (milliseconds) a worker waits on an empty queue before
/// re-checking.
pub(crate) const TRACEPIPE_POLL_INTERVAL: &str = "TRACEPIPE_POLL_INTERVAL";
/// Default empty-queue poll interval in milliseconds.
pub(crate) const TRACEPIPE_POLL_INTERVAL_DEFAULT: u64 = 500;
/// Number of pipeline worker threads.
pub(crate) const TRACEPIPE_NUM_WORKERS: &str = "TRACEPIPE_NUM_WORKERS";
/// Default number of pipeline worker threads.
pub(crate) const TRACEPIPE_NUM_WORKERS_DEFAULT: usize = 5;

/// Messages exchanged between producers and the worker pool.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
enum BatchMessage {
    Record(SpanRecord),
    Shutdown,
}

/// A [`Recorder`] that ships records to a [`RecordExporter`] through the
/// batching pipeline.
#[derive(Debug)]
pub struct BatchRecorder {
    sender: Sender<BatchMessage>,
    exporter: Arc<dyn RecordExporter>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    dropped_record_count: AtomicUsize,
}

impl BatchRecorder {
    /// Start the worker pool and return the recorder.
    pub fn new<E>(exporter: E, config: BatchConfig) -> Self
    where
        E: RecordExporter,
    {
        let exporter: Arc<dyn RecordExporter> = Arc::new(exporter);
        let (sender, receiver) = crossbeam_channel::bounded(config.max_queue_size);

        let workers = (0..config.num_workers)
            .map(|i| {
                let receiver = receiver.clone();
                let exporter = Arc::clone(&exporter);
                let max_batch_size = config.max_batch_size;
                let poll_interval = config.poll_interval;
                thread::Builder::new()
                    .name(format!("tracepipe-recorder-{i}"))
                    .spawn(move || worker_loop(receiver, exporter, max_batch_size, poll_interval))
                    .expect("failed to spawn recorder worker")
            })
            .collect();

        BatchRecorder {
            sender,
            exporter,
            workers: Mutex::new(workers),
            is_shutdown: AtomicBool::new(false),
            dropped_record_count: AtomicUsize::new(0),
        }
    }

    /// Number of records dropped so far because the queue was full.
    pub fn dropped_records(&self) -> usize {
        self.dropped_record_count.load(Ordering::Relaxed)
    }

    /// Records currently buffered in the queue.
    #[cfg(test)]
    pub(crate) fn queue_depth(&self) -> usize {
        self.sender.len()
    }
}

impl Recorder for BatchRecorder {
    fn send(&self, record: SpanRecord) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        if self.sender.try_send(BatchMessage::Record(record)).is_err() {
            // Warn once on the first drop; the total is reported at
            // shutdown to avoid flooding the log while saturated.
            if self.dropped_record_count.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!(
                    "span record queue is full; dropping records \
                     (further drops reported only at shutdown)"
                );
            }
        }
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let mut workers = self.workers.lock()?;
        for _ in 0..workers.len() {
            self.sender
                .send(BatchMessage::Shutdown)
                .map_err(|_| TraceError::Other("recorder workers already stopped".to_owned()))?;
        }
        for handle in workers.drain(..) {
            handle
                .join()
                .map_err(|_| TraceError::Other("recorder worker panicked".to_owned()))?;
        }
        let dropped = self.dropped_record_count.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "span records were dropped due to a full queue");
        }
        self.exporter.shutdown();
        Ok(())
    }
}

fn worker_loop(
    receiver: Receiver<BatchMessage>,
    exporter: Arc<dyn RecordExporter>,
    max_batch_size: usize,
    poll_interval: Duration,
) {
    let mut shutting_down = false;
    while !shutting_down {
        let mut batch = Vec::with_capacity(max_batch_size);
        match receiver.recv_timeout(poll_interval) {
            Ok(BatchMessage::Record(record)) => batch.push(record),
            // Each worker consumes exactly one stop message, so exit here
            // without draining further: a greedy drain could swallow a
            // sibling's stop message and leave it joining forever.
            Ok(BatchMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => continue,
        }

        // Greedily pull whatever is immediately available, then flush even
        // if the batch never reached the size limit.
        while batch.len() < max_batch_size {
            match receiver.try_recv() {
                Ok(BatchMessage::Record(record)) => batch.push(record),
                Ok(BatchMessage::Shutdown) => {
                    shutting_down = true;
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if batch.is_empty() {
            continue;
        }
        let batch_size = batch.len();
        if let Err(error) = exporter.export(batch) {
            // Best-effort delivery: the batch is gone, no retry.
            warn!(%error, batch_size, "failed to flush span record batch; discarding it");
        }
    }
}

/// Batching pipeline configuration.
/// Use [`BatchConfigBuilder`] to configure your own instance.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Capacity of the bounded record queue. Once full, records are
    /// dropped. Defaults to 50 000.
    pub(crate) max_queue_size: usize,

    /// Maximum number of records a worker pulls before flushing. Defaults
    /// to 100.
    pub(crate) max_batch_size: usize,

    /// How long a worker waits on an empty queue before re-checking.
    /// Defaults to 500 milliseconds.
    pub(crate) poll_interval: Duration,

    /// Number of worker threads draining the queue. Defaults to 5.
    pub(crate) num_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// A builder for creating [`BatchConfig`] instances.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    max_batch_size: usize,
    poll_interval: Duration,
    num_workers: usize,
}

impl Default for BatchConfigBuilder {
    /// Create a builder initialized with the default pipeline values,
    /// overridden by environment variables if set:
    /// * `TRACEPIPE_MAX_QUEUE_SIZE`
    /// * `TRACEPIPE_MAX_BATCH_SIZE`
    /// * `TRACEPIPE_POLL_INTERVAL` (milliseconds)
    /// * `TRACEPIPE_NUM_WORKERS`
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: TRACEPIPE_MAX_QUEUE_SIZE_DEFAULT,
            max_batch_size: TRACEPIPE_MAX_BATCH_SIZE_DEFAULT,
            poll_interval: Duration::from_millis(TRACEPIPE_POLL_INTERVAL_DEFAULT),
            num_workers: TRACEPIPE_NUM_WORKERS_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set the capacity of the bounded record queue.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the maximum number of records flushed in one batch.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set how long a worker waits on an empty queue before re-checking.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the number of worker threads draining the queue.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Build a `BatchConfig`, enforcing that the batch size never exceeds
    /// the queue size and at least one worker runs.
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size,
            max_batch_size: min(self.max_batch_size, self.max_queue_size),
            poll_interval: self.poll_interval,
            num_workers: self.num_workers.max(1),
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = env::var(TRACEPIPE_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        if let Some(max_batch_size) = env::var(TRACEPIPE_MAX_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(&batch_size).ok())
        {
            self.max_batch_size = max_batch_size;
        }

        if let Some(poll_interval) = env::var(TRACEPIPE_POLL_INTERVAL)
            .ok()
            .and_then(|millis| u64::from_str(&millis).ok())
        {
            self.poll_interval = Duration::from_millis(poll_interval);
        }

        if let Some(num_workers) = env::var(TRACEPIPE_NUM_WORKERS)
            .ok()
            .and_then(|workers| usize::from_str(&workers).ok())
        {
            self.num_workers = num_workers;
        }

        self
    }
}
