//! ucdbg - low-overhead concurrency event capture
//!
//! Instrumented threads record thread start/end, lock acquire/release and
//! log events into a lock-free queue; a background drain thread serializes
//! them as fixed 32-byte records and writes them to a socket or file for an
//! out-of-process analyzer.
//!
//! ```no_run
//! use parking_lot::lock_api::RawMutex as _;
//! use ucdbg::{Tracer, TracerConfig};
//!
//! let tracer = Tracer::new(TracerConfig::default());
//! tracer.init("/tmp/ucdbg.sock").unwrap();
//!
//! let mutex = parking_lot::RawMutex::INIT;
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         let _thread = tracer.thread_guard();
//!         tracer.set_thread_name("worker_0").unwrap();
//!         let _held = tracer.lock_guard(&mutex);
//!     });
//! });
//!
//! tracer.shutdown();
//! ```
//!
//! The free functions below drive one process-wide tracer created on first
//! use from [`TracerConfig::from_env`].

pub mod capture_queue;
pub mod cli;
pub mod config;
pub mod dump;
pub mod error;
pub mod event;
pub mod event_factory;
pub mod guards;
pub mod reader;
pub mod string_table;
pub mod thread_id;
pub mod thread_registry;
pub mod timestamp;
pub mod tracer;
pub mod transport;

pub use config::TracerConfig;
pub use error::{Result, TraceError};
pub use event::{ConcurrencyType, Event, EventKind, LogLevel, Payload, TRACE_FORMAT_VERSION};
pub use guards::{LockGuard, Lockable, ThreadGuard};
pub use tracer::{RuntimeState, RuntimeStats, Tracer};

use std::sync::OnceLock;

static GLOBAL_TRACER: OnceLock<Tracer> = OnceLock::new();

/// The process-wide tracer
pub fn global() -> &'static Tracer {
    GLOBAL_TRACER.get_or_init(|| {
        let config = TracerConfig::from_env().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring invalid tracer environment, using defaults");
            TracerConfig::default()
        });
        Tracer::new(config)
    })
}

/// Initialize the process-wide tracer; true on success or if already running
pub fn init(transport_path: &str) -> bool {
    match global().init(transport_path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "tracer initialization failed");
            false
        }
    }
}

/// Drain, flush and stop the process-wide tracer
pub fn shutdown() {
    if let Some(tracer) = GLOBAL_TRACER.get() {
        tracer.shutdown();
    }
}

pub fn set_thread_name(name: &str) -> Result<()> {
    global().set_thread_name(name)
}

pub fn get_thread_name() -> Option<String> {
    global().get_thread_name()
}

/// Thread lifecycle guard on the process-wide tracer
pub fn thread_guard() -> ThreadGuard<'static> {
    ThreadGuard::new(global())
}

/// Lock guard on the process-wide tracer
pub fn lock_guard<L: Lockable + ?Sized>(lockable: &L) -> LockGuard<'_, L> {
    LockGuard::new(global(), lockable)
}

/// Lock guard with an explicit lock id on the process-wide tracer
pub fn lock_guard_with_id<L: Lockable + ?Sized>(lockable: &L, lock_id: u64) -> LockGuard<'_, L> {
    LockGuard::with_id(global(), lockable, lock_id)
}

/// Log `message` at `level` on the process-wide tracer
pub fn log(level: LogLevel, message: &str) -> u32 {
    global().log(level, message)
}
