//! Cached OS thread identifier
//!
//! The id is queried once per thread and kept in thread-local storage, so
//! building an event never costs a syscall for the thread id.

#[cfg(not(target_os = "linux"))]
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    static THREAD_ID: u64 = query_thread_id();
}

#[cfg(target_os = "linux")]
fn query_thread_id() -> u64 {
    nix::unistd::gettid().as_raw() as u64
}

#[cfg(not(target_os = "linux"))]
fn query_thread_id() -> u64 {
    // no portable kernel tid: hand out process-unique ids instead
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifier of the calling thread, stable for the thread's lifetime
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
