//! Thread names and lifecycle timestamps
//!
//! The registry is a side table the analyzer and the drain path consult to
//! put names on thread ids. Renames are rare, so the shared map sits behind
//! one mutex; a thread-local cache serves a thread asking for its own name
//! without touching that mutex.
//!
//! Entries are only ever inserted or updated, never removed, so a reader
//! can never observe a half-destroyed entry.

use crate::error::{Result, TraceError};
use crate::thread_id::current_thread_id;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// (registry id, name) for the registry this thread last named itself in
    static NAME_CACHE: RefCell<Option<(u64, String)>> = const { RefCell::new(None) };
}

/// One observed thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub thread_id: u64,
    pub thread_name: Option<String>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

impl ThreadInfo {
    fn new(thread_id: u64) -> Self {
        Self {
            thread_id,
            thread_name: None,
            start_time: None,
            end_time: None,
        }
    }
}

/// Append-only table of [`ThreadInfo`] entries
pub struct ThreadRegistry {
    id: u64,
    threads: Mutex<HashMap<u64, ThreadInfo>>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            threads: Mutex::new(HashMap::new()),
        }
    }

    fn with_entry<F>(&self, thread_id: u64, update: F)
    where
        F: FnOnce(&mut ThreadInfo),
    {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        update(
            threads
                .entry(thread_id)
                .or_insert_with(|| ThreadInfo::new(thread_id)),
        );
    }

    /// Process-unique identity of this registry
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name the calling thread
    ///
    /// A thread can only name itself; there is no cross-thread rename.
    pub fn set_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(TraceError::InvalidThreadName);
        }

        let thread_id = current_thread_id();
        self.with_entry(thread_id, |info| info.thread_name = Some(name.to_owned()));

        NAME_CACHE.with(|cache| *cache.borrow_mut() = Some((self.id, name.to_owned())));

        tracing::debug!(thread_id, name, "thread named");
        Ok(())
    }

    /// Name of the calling thread, if it set one
    pub fn current_name(&self) -> Option<String> {
        let cached = NAME_CACHE.with(|cache| {
            cache
                .borrow()
                .as_ref()
                .filter(|(registry, _)| *registry == self.id)
                .map(|(_, name)| name.clone())
        });
        cached.or_else(|| self.get_name(current_thread_id()))
    }

    /// Name of any thread, for the drain/analysis side
    pub fn get_name(&self, thread_id: u64) -> Option<String> {
        let threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        threads.get(&thread_id).and_then(|info| info.thread_name.clone())
    }

    pub fn record_start(&self, thread_id: u64, timestamp_ns: u64) {
        self.with_entry(thread_id, |info| {
            info.start_time.get_or_insert(timestamp_ns);
        });
    }

    pub fn record_end(&self, thread_id: u64, timestamp_ns: u64) {
        self.with_entry(thread_id, |info| info.end_time = Some(timestamp_ns));
    }

    pub fn get(&self, thread_id: u64) -> Option<ThreadInfo> {
        let threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        threads.get(&thread_id).cloned()
    }

    /// Copy of every entry, ordered by thread id
    pub fn snapshot(&self) -> Vec<ThreadInfo> {
        let threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = threads.values().cloned().collect();
        all.sort_by_key(|info| info.thread_id);
        all
    }

    pub fn len(&self) -> usize {
        self.threads.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
