//! Tracer runtime: lifecycle, drain task and the public capture surface
//!
//! A [`Tracer`] owns the capture queue, the thread registry and the string
//! table. Guards borrow it; nothing here is reached through hidden globals,
//! so tests can run independent tracers side by side. The crate-level
//! `init`/`shutdown` functions wrap one lazily created process-wide tracer.
//!
//! # Lifecycle
//!
//! ```text
//!            init(path)                 shutdown()
//! Uninitialized ──────▶ Initialized ──────────────▶ ShuttingDown ──▶ Uninitialized
//!       ▲                   │  init again: Ok, no-op                      │
//!       └───────────────────┴─────────────────────────────────────────────┘
//! ```
//!
//! While initialized, a dedicated drain thread is the only consumer of the
//! queue and the only writer to the transport:
//!
//! ```text
//! loop {
//!     batch = queue.drain_into(batch_size)
//!     transport.write(serialize(batch))     // whole records only
//!     idle? flush + park(drain_interval)
//! }
//! ```
//!
//! If the transport cannot be opened or a write fails, the drain thread logs
//! it, stops dequeuing, and retries after `retry_interval`; events keep
//! accumulating in the queue under its drop-new policy. `shutdown` signals
//! the thread, which makes one final pass over everything queued at that
//! moment, flushes and closes the transport before it exits. Records that
//! were dequeued but never accepted by a transport are handed back to the
//! `Tracer` and go out first on the next `init`; `RuntimeStats::unsent_records`
//! counts them in the meantime.

use crate::capture_queue::{CaptureQueue, QueueStats};
use crate::config::TracerConfig;
use crate::error::{Result, TraceError};
use crate::event::{Event, LogLevel};
use crate::event_factory::make_log_event;
use crate::guards::{LockGuard, Lockable, ThreadGuard};
use crate::string_table::StringTable;
use crate::thread_registry::ThreadRegistry;
use crate::transport::{self, Transport, TransportFactory};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle state of a [`Tracer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initialized,
    ShuttingDown,
}

impl RuntimeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RuntimeState::Initialized,
            2 => RuntimeState::ShuttingDown,
            _ => RuntimeState::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RuntimeState::Uninitialized => 0,
            RuntimeState::Initialized => 1,
            RuntimeState::ShuttingDown => 2,
        }
    }
}

#[derive(Default)]
struct DrainCounters {
    records_written: AtomicU64,
    transport_errors: AtomicU64,
}

/// Queue and transport statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStats {
    pub queue: QueueStats,
    pub records_written: u64,
    pub transport_errors: u64,
    /// Records dequeued but not yet accepted by a transport when the last
    /// drain thread stopped; the next `init` sends them first
    pub unsent_records: u64,
}

struct DrainTask {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    path: String,
}

/// Capture context shared by all instrumented threads
pub struct Tracer {
    config: TracerConfig,
    queue: Arc<CaptureQueue>,
    registry: ThreadRegistry,
    strings: StringTable,
    state: AtomicU8,
    drain: Mutex<Option<DrainTask>>,
    factory: Arc<TransportFactory>,
    counters: Arc<DrainCounters>,
    /// Serialized records a stopped drain thread could not deliver
    unsent: Arc<Mutex<Vec<u8>>>,
}

impl Tracer {
    /// Create a tracer that opens transports with [`transport::open`]
    ///
    /// # Panics
    ///
    /// Panics if `config.queue_capacity` is 0; use [`Tracer::try_new`] to
    /// validate first.
    pub fn new(config: TracerConfig) -> Self {
        Self::with_transport_factory(config, transport::open)
    }

    pub fn try_new(config: TracerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Create a tracer with a custom transport constructor
    pub fn with_transport_factory<F>(config: TracerConfig, factory: F) -> Self
    where
        F: Fn(&str) -> Result<Box<dyn Transport>> + Send + Sync + 'static,
    {
        Self {
            queue: Arc::new(CaptureQueue::new(config.queue_capacity)),
            registry: ThreadRegistry::new(),
            strings: StringTable::new(),
            state: AtomicU8::new(RuntimeState::Uninitialized.as_u8()),
            drain: Mutex::new(None),
            factory: Arc::new(factory),
            counters: Arc::new(DrainCounters::default()),
            unsent: Arc::new(Mutex::new(Vec::new())),
            config,
        }
    }

    /// Start draining to `transport_path`
    ///
    /// Calling this while already initialized succeeds without touching the
    /// running transport, whatever path is passed. A transport that cannot
    /// be opened is not an error here: the drain thread keeps retrying.
    pub fn init(&self, transport_path: &str) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        match self.start(transport_path) {
            Err(TraceError::AlreadyInitialized) => Ok(()),
            other => other,
        }
    }

    /// [`Tracer::init`] with the configured transport path
    pub fn init_default(&self) -> Result<()> {
        let path = self.config.transport_path.clone();
        self.init(&path)
    }

    /// Start draining, reporting a second start as [`TraceError::AlreadyInitialized`]
    pub fn start(&self, transport_path: &str) -> Result<()> {
        let mut drain = self.drain.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = drain.as_ref() {
            tracing::debug!(running = %task.path, requested = transport_path, "tracer already initialized");
            return Err(TraceError::AlreadyInitialized);
        }

        let transport = match (self.factory)(transport_path) {
            Ok(transport) => Some(transport),
            Err(e) => {
                self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "transport unavailable, drain task will retry");
                None
            }
        };

        let pending = std::mem::take(&mut *self.unsent.lock().unwrap_or_else(|e| e.into_inner()));
        let batch_size = self.config.batch_size.max(1);
        let stop = Arc::new(AtomicBool::new(false));
        let worker = DrainWorker {
            queue: self.queue.clone(),
            factory: self.factory.clone(),
            counters: self.counters.clone(),
            stop: stop.clone(),
            path: transport_path.to_owned(),
            unsent: self.unsent.clone(),
            batch_size,
            drain_interval: self.config.drain_interval,
            retry_interval: self.config.retry_interval,
            next_attempt: Instant::now() + self.config.retry_interval,
            transport,
            batch: Vec::with_capacity(batch_size),
            pending,
            dirty: false,
        };

        let handle = thread::Builder::new()
            .name("ucdbg-drain".into())
            .spawn(move || worker.run())?;

        *drain = Some(DrainTask {
            handle,
            stop,
            path: transport_path.to_owned(),
        });
        self.set_state(RuntimeState::Initialized);
        tracing::info!(path = transport_path, "tracer initialized");
        Ok(())
    }

    /// Stop the drain thread after a final drain and flush
    ///
    /// No-op when not initialized.
    pub fn shutdown(&self) {
        // held across the join so a concurrent init cannot start a second consumer
        let mut drain = self.drain.lock().unwrap_or_else(|e| e.into_inner());
        let Some(task) = drain.take() else {
            return;
        };

        self.set_state(RuntimeState::ShuttingDown);
        task.stop.store(true, Ordering::Release);
        task.handle.thread().unpark();
        if task.handle.join().is_err() {
            tracing::error!("drain thread panicked");
        }
        self.set_state(RuntimeState::Uninitialized);
        tracing::info!(
            written = self.counters.records_written.load(Ordering::Relaxed),
            dropped = self.queue.dropped(),
            "tracer shut down"
        );
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RuntimeState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == RuntimeState::Initialized
    }

    /// Enqueue an event; a full queue drops it and counts the drop
    pub fn capture(&self, event: Event) {
        let _ = self.queue.push(event);
    }

    /// Intern `message` and capture a log event for it, returning the id
    pub fn log(&self, level: LogLevel, message: &str) -> u32 {
        let id = self.strings.intern(message);
        self.capture(make_log_event(level, id));
        id
    }

    /// Capture a log event for an already interned message
    pub fn log_id(&self, level: LogLevel, message_id: u32) {
        self.capture(make_log_event(level, message_id));
    }

    pub fn set_thread_name(&self, name: &str) -> Result<()> {
        self.registry.set_name(name)
    }

    /// Name of the calling thread
    pub fn get_thread_name(&self) -> Option<String> {
        self.registry.current_name()
    }

    /// Name of any thread by id
    pub fn thread_name(&self, thread_id: u64) -> Option<String> {
        self.registry.get_name(thread_id)
    }

    pub fn thread_guard(&self) -> ThreadGuard<'_> {
        ThreadGuard::new(self)
    }

    pub fn lock_guard<'a, L: Lockable + ?Sized>(&'a self, lockable: &'a L) -> LockGuard<'a, L> {
        LockGuard::new(self, lockable)
    }

    pub fn lock_guard_with_id<'a, L: Lockable + ?Sized>(
        &'a self,
        lockable: &'a L,
        lock_id: u64,
    ) -> LockGuard<'a, L> {
        LockGuard::with_id(self, lockable, lock_id)
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            queue: self.queue.stats(),
            records_written: self.counters.records_written.load(Ordering::Relaxed),
            transport_errors: self.counters.transport_errors.load(Ordering::Relaxed),
            unsent_records: (self.unsent.lock().unwrap_or_else(|e| e.into_inner()).len()
                / crate::event::EVENT_SIZE) as u64,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn queue(&self) -> &CaptureQueue {
        &self.queue
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the drain thread
struct DrainWorker {
    queue: Arc<CaptureQueue>,
    factory: Arc<TransportFactory>,
    counters: Arc<DrainCounters>,
    stop: Arc<AtomicBool>,
    unsent: Arc<Mutex<Vec<u8>>>,
    path: String,
    batch_size: usize,
    drain_interval: Duration,
    retry_interval: Duration,
    next_attempt: Instant,
    transport: Option<Box<dyn Transport>>,
    batch: Vec<Event>,
    /// Serialized records not yet accepted by the transport
    pending: Vec<u8>,
    dirty: bool,
}

impl DrainWorker {
    fn run(mut self) {
        loop {
            if self.stop.load(Ordering::Acquire) {
                self.finish();
                break;
            }

            if self.pass(false) == 0 {
                self.flush_if_dirty();
                thread::park_timeout(self.drain_interval);
            }
        }
    }

    /// One drain cycle, returning the number of events dequeued
    fn pass(&mut self, force_reconnect: bool) -> usize {
        if !self.ensure_transport(force_reconnect) || !self.write_pending() {
            return 0;
        }

        self.batch.clear();
        let moved = self.queue.drain_into(&mut self.batch, self.batch_size);
        if moved == 0 {
            return 0;
        }

        for event in &self.batch {
            self.pending.extend_from_slice(&event.to_bytes());
        }
        self.write_pending();
        moved
    }

    fn ensure_transport(&mut self, force: bool) -> bool {
        if self.transport.is_some() {
            return true;
        }
        if !force && Instant::now() < self.next_attempt {
            return false;
        }

        match (self.factory)(&self.path) {
            Ok(transport) => {
                tracing::info!(path = %self.path, "transport connected");
                self.transport = Some(transport);
                true
            }
            Err(e) => {
                self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "transport unavailable, retrying");
                self.next_attempt = Instant::now() + self.retry_interval;
                false
            }
        }
    }

    fn write_pending(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };

        match transport.write(&self.pending) {
            Ok(()) => {
                let records = (self.pending.len() / crate::event::EVENT_SIZE) as u64;
                self.counters
                    .records_written
                    .fetch_add(records, Ordering::Relaxed);
                self.pending.clear();
                self.dirty = true;
                true
            }
            Err(e) => {
                self.transport_failed(e);
                false
            }
        }
    }

    fn flush_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            match transport.flush() {
                Ok(()) => self.dirty = false,
                Err(e) => self.transport_failed(e),
            }
        }
    }

    fn transport_failed(&mut self, error: io::Error) {
        self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(%error, path = %self.path, "transport write failed, reconnecting");
        self.transport = None;
        self.dirty = false;
        self.next_attempt = Instant::now() + self.retry_interval;
    }

    /// Final pass over everything queued when the stop signal arrived
    fn finish(&mut self) {
        let mut budget = self.queue.len();
        loop {
            let moved = self.pass(true);
            if moved == 0 || moved >= budget {
                break;
            }
            budget -= moved;
        }
        // a pass that dequeued nothing may still owe a retried batch
        self.write_pending();

        if !self.pending.is_empty() || !self.queue.is_empty() {
            tracing::warn!(
                unsent = self.pending.len() / crate::event::EVENT_SIZE,
                queued = self.queue.len(),
                "transport unavailable at shutdown, events kept for the next init"
            );
        }
        if !self.pending.is_empty() {
            self.unsent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .append(&mut self.pending);
        }

        if let Some(mut transport) = self.transport.take() {
            if let Err(error) = transport.close() {
                tracing::warn!(%error, "closing transport failed");
            }
        }
        tracing::debug!(path = %self.path, "drain thread stopped");
    }
}
