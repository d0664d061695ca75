//! Event constructors used on the hot path
//!
//! Both functions are allocation-free: they read the per-thread timestamp
//! and the cached thread id and fill a fixed-size [`Event`]. Reserved bytes
//! are implicit in the encoding, so identical logical inputs always produce
//! identical records.

use crate::event::{ConcurrencyType, Event, LogLevel, Payload, TRACE_FORMAT_VERSION};
use crate::thread_id::current_thread_id;
use crate::timestamp;

/// Build a concurrency event for the calling thread
///
/// Thread lifecycle events carry `lock_id == 0`.
pub fn make_concurrency_event(kind: ConcurrencyType, lock_id: u64) -> Event {
    Event {
        timestamp_ns: timestamp::now_ns(),
        thread_id: current_thread_id(),
        format_version: TRACE_FORMAT_VERSION,
        payload: Payload::Concurrency { kind, lock_id },
    }
}

/// Build a log event referring to an interned message
pub fn make_log_event(level: LogLevel, message_id: u32) -> Event {
    Event {
        timestamp_ns: timestamp::now_ns(),
        thread_id: current_thread_id(),
        format_version: TRACE_FORMAT_VERSION,
        payload: Payload::Log { level, message_id },
    }
}
