//! Amortized per-thread timestamp source
//!
//! Converting a monotonic clock reading into nanoseconds on every lock
//! acquisition is measurable overhead. Each thread instead caches an epoch
//! value and refreshes it only when more than [`REFRESH_INTERVAL`] has passed
//! since the last refresh. Between refreshes a 16-bit sequence counter is
//! added to the cached epoch so consecutive calls still return distinct,
//! increasing values.
//!
//! # Precision
//!
//! ```text
//! returned = cached_epoch + (seq & 0xFFFF)
//! ```
//!
//! The result orders events produced by one thread. It is NOT a faithful
//! wall-clock reading between refreshes and must not be used to measure
//! sub-microsecond latency across threads.
//!
//! The epoch is measured from a process-wide origin shared by every thread,
//! so timestamps from different threads are comparable at refresh
//! granularity.

use std::cell::Cell;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Minimum age of the cached epoch before it is refreshed
pub const REFRESH_INTERVAL: Duration = Duration::from_micros(100);

/// Bound on the intra-period sequence counter
pub const SEQUENCE_MASK: u32 = 0xFFFF;

#[derive(Clone, Copy)]
struct ClockState {
    epoch_ns: u64,
    refreshed_at: Option<Instant>,
    seq: u32,
    last: u64,
}

thread_local! {
    static CLOCK: Cell<ClockState> = const {
        Cell::new(ClockState {
            epoch_ns: 0,
            refreshed_at: None,
            seq: 0,
            last: 0,
        })
    };
}

fn origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

fn monotonic_ns(at: Instant) -> u64 {
    u64::try_from(at.saturating_duration_since(origin()).as_nanos()).unwrap_or(u64::MAX)
}

/// Current timestamp for the calling thread, in nanoseconds
///
/// Strictly increasing across calls from the same thread.
pub fn now_ns() -> u64 {
    CLOCK.with(|cell| {
        let mut state = cell.get();
        let now = Instant::now();

        let stale = match state.refreshed_at {
            None => true,
            Some(at) => now.duration_since(at) > REFRESH_INTERVAL || state.seq >= SEQUENCE_MASK,
        };

        if stale {
            // never step back below what this thread already handed out
            state.epoch_ns = monotonic_ns(now).max(state.last);
            state.refreshed_at = Some(now);
            state.seq = 0;
        }

        state.seq += 1;
        let value = state.epoch_ns + u64::from(state.seq & SEQUENCE_MASK);
        state.last = value;
        cell.set(state);
        value
    })
}
