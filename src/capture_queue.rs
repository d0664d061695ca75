//! Lock-free capture queue between instrumented threads and the drain task
//!
//! Instrumented threads push events from inside their critical sections, so
//! the push must never take a lock the producers share. The queue is a
//! bounded ring of pre-allocated slots with atomic head/tail indices
//! (`crossbeam::queue::ArrayQueue`); pushing copies the 32-byte event into a
//! slot and never allocates.
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │ APPLICATION THREADS (hot path)                    │
//! │   guard → make_*_event() → queue.push(event)      │
//! └───────────────────────────────────────────────────┘
//!                       │  ArrayQueue<Event>
//!                       ▼
//! ┌───────────────────────────────────────────────────┐
//! │ DRAIN THREAD (cold path)                          │
//! │   queue.drain_into(batch, n) → serialize → write  │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! # Ordering
//!
//! Events pushed by one thread come out in push order. Interleaving across
//! threads is whatever the queue linearized; use timestamps to reason about
//! it.
//!
//! # Backpressure
//!
//! When the queue is full the NEW event is dropped and `total_dropped` is
//! incremented. Already-queued events are never evicted and the producer is
//! never blocked.

use crate::error::{Result, TraceError};
use crate::event::Event;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Log every Nth drop after the first one
const DROP_LOG_EVERY: u64 = 1024;

/// Bounded multi-producer queue of captured events
pub struct CaptureQueue {
    queue: ArrayQueue<Event>,
    total_pushed: AtomicU64,
    total_dropped: AtomicU64,
}

impl CaptureQueue {
    /// Create a queue with `capacity` pre-allocated slots
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capture queue capacity must be > 0");

        Self {
            queue: ArrayQueue::new(capacity),
            total_pushed: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event without blocking
    ///
    /// Returns [`TraceError::QueueFull`] when the event was dropped. Callers
    /// on the instrumented path ignore it; the drop is already counted.
    pub fn push(&self, event: Event) -> Result<()> {
        self.total_pushed.fetch_add(1, Ordering::Relaxed);

        match self.queue.push(event) {
            Ok(()) => Ok(()),
            Err(_rejected) => {
                let dropped = self.total_dropped.fetch_add(1, Ordering::Relaxed);
                if dropped % DROP_LOG_EVERY == 0 {
                    tracing::warn!(
                        dropped = dropped + 1,
                        capacity = self.queue.capacity(),
                        "capture queue full, dropping new events"
                    );
                }
                Err(TraceError::QueueFull)
            }
        }
    }

    /// Pop up to `max` events into `out`, returning how many were moved
    ///
    /// Reuses `out`'s allocation; only the single drain task calls this.
    pub fn drain_into(&self, out: &mut Vec<Event>, max: usize) -> usize {
        let mut moved = 0;
        while moved < max {
            match self.queue.pop() {
                Some(event) => {
                    out.push(event);
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }

    /// Pop up to `max` events
    pub fn drain(&self, max: usize) -> Vec<Event> {
        let mut out = Vec::with_capacity(max.min(self.queue.len()));
        self.drain_into(&mut out, max);
        out
    }

    /// Pop everything currently queued
    pub fn drain_all(&self) -> Vec<Event> {
        self.drain(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Monotonic count of events rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}

/// Capture queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub total_pushed: u64,
    pub total_dropped: u64,
    pub current_size: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// Calculate drop rate (0.0 to 1.0)
    pub fn drop_rate(&self) -> f64 {
        if self.total_pushed == 0 {
            0.0
        } else {
            self.total_dropped as f64 / self.total_pushed as f64
        }
    }

    /// Calculate queue utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.current_size as f64 / self.capacity as f64
    }
}
