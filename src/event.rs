//! Fixed-size binary event record and its codec
//!
//! Every observation (thread start/end, lock acquire/release, log line) is a
//! single 32-byte little-endian record. There is no framing on the wire: a
//! consumer reads the stream in 32-byte chunks.
//!
//! # Layout
//!
//! ```text
//! offset  size  field
//! ──────  ────  ─────────────────────────────────────────────
//!  0       8    timestamp_ns      u64
//!  8       8    thread_id         u64
//! 16       1    format_version    u8
//! 17       1    kind              u8   (0 = Concurrency, 1 = Log)
//! 18       2    reserved          zero
//! 20      12    payload
//!
//! Concurrency payload            Log payload
//! 20  1  type    u8              20  1  level       u8
//! 21  3  zero                    21  3  zero
//! 24  8  lock_id u64             24  4  message_id  u32
//!                                28  4  zero
//! ```
//!
//! Encoding never allocates and never depends on the host's struct layout,
//! so the record size is the same on every platform. Big-endian hosts still
//! produce little-endian records; mixed-endian consumers are not supported.
//!
//! # Forward compatibility
//!
//! A record whose `format_version` is above [`MAX_SUPPORTED_VERSION`] fails
//! [`is_valid`] and must be skipped by readers. Unknown `type`/`level` values
//! inside a known kind decode to `Unknown(n)` instead of failing.

use crate::error::{Result, TraceError};
use serde::Serialize;

/// Size of one encoded record
pub const EVENT_SIZE: usize = 32;

/// Protocol version stamped on every record this crate produces
pub const TRACE_FORMAT_VERSION: u8 = 1;

/// Highest version this reader can parse
pub const MAX_SUPPORTED_VERSION: u8 = TRACE_FORMAT_VERSION;

const OFF_TIMESTAMP: usize = 0;
const OFF_THREAD: usize = 8;
const OFF_VERSION: usize = 16;
const OFF_KIND: usize = 17;
const OFF_PAYLOAD_TAG: usize = 20;
const OFF_PAYLOAD_VALUE: usize = 24;

/// Payload discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Concurrency,
    Log,
}

impl EventKind {
    pub fn as_u8(self) -> u8 {
        match self {
            EventKind::Concurrency => 0,
            EventKind::Log => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EventKind::Concurrency),
            1 => Some(EventKind::Log),
            _ => None,
        }
    }
}

/// Concurrency observation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConcurrencyType {
    ThreadStart,
    ThreadEnd,
    LockAcquire,
    LockRelease,
    /// Value written by a newer producer; kept so the record is not lost
    Unknown(u8),
}

impl ConcurrencyType {
    pub fn as_u8(self) -> u8 {
        match self {
            ConcurrencyType::ThreadStart => 0,
            ConcurrencyType::ThreadEnd => 1,
            ConcurrencyType::LockAcquire => 2,
            ConcurrencyType::LockRelease => 3,
            ConcurrencyType::Unknown(raw) => raw,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConcurrencyType::ThreadStart,
            1 => ConcurrencyType::ThreadEnd,
            2 => ConcurrencyType::LockAcquire,
            3 => ConcurrencyType::LockRelease,
            raw => ConcurrencyType::Unknown(raw),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConcurrencyType::ThreadStart => "ThreadStart",
            ConcurrencyType::ThreadEnd => "ThreadEnd",
            ConcurrencyType::LockAcquire => "LockAcquire",
            ConcurrencyType::LockRelease => "LockRelease",
            ConcurrencyType::Unknown(_) => "Unknown",
        }
    }
}

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
    Unknown(u8),
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            LogLevel::Trace => 0,
            LogLevel::Debug => 1,
            LogLevel::Info => 2,
            LogLevel::Warning => 3,
            LogLevel::Error => 4,
            LogLevel::Fatal => 5,
            LogLevel::Unknown(raw) => raw,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            5 => LogLevel::Fatal,
            raw => LogLevel::Unknown(raw),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Fatal => "Fatal",
            LogLevel::Unknown(_) => "Unknown",
        }
    }
}

/// Kind-dependent part of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Payload {
    Concurrency {
        #[serde(rename = "type")]
        kind: ConcurrencyType,
        lock_id: u64,
    },
    Log {
        level: LogLevel,
        message_id: u32,
    },
}

/// One captured observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Event {
    pub timestamp_ns: u64,
    pub thread_id: u64,
    pub format_version: u8,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            Payload::Concurrency { .. } => EventKind::Concurrency,
            Payload::Log { .. } => EventKind::Log,
        }
    }

    /// Concurrency type, if this is a concurrency event
    pub fn concurrency_type(&self) -> Option<ConcurrencyType> {
        match self.payload {
            Payload::Concurrency { kind, .. } => Some(kind),
            Payload::Log { .. } => None,
        }
    }

    /// Lock id of a concurrency event (0 for thread events)
    pub fn lock_id(&self) -> Option<u64> {
        match self.payload {
            Payload::Concurrency { lock_id, .. } => Some(lock_id),
            Payload::Log { .. } => None,
        }
    }

    /// Encode into the fixed 32-byte layout
    pub fn to_bytes(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];
        buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[OFF_THREAD..OFF_THREAD + 8].copy_from_slice(&self.thread_id.to_le_bytes());
        buf[OFF_VERSION] = self.format_version;
        buf[OFF_KIND] = self.kind().as_u8();

        match self.payload {
            Payload::Concurrency { kind, lock_id } => {
                buf[OFF_PAYLOAD_TAG] = kind.as_u8();
                buf[OFF_PAYLOAD_VALUE..OFF_PAYLOAD_VALUE + 8]
                    .copy_from_slice(&lock_id.to_le_bytes());
            }
            Payload::Log { level, message_id } => {
                buf[OFF_PAYLOAD_TAG] = level.as_u8();
                buf[OFF_PAYLOAD_VALUE..OFF_PAYLOAD_VALUE + 4]
                    .copy_from_slice(&message_id.to_le_bytes());
            }
        }

        buf
    }

    /// Decode the first 32 bytes of `bytes`
    ///
    /// Reserved bytes are ignored. Versions above [`MAX_SUPPORTED_VERSION`]
    /// still decode; use [`is_valid`] to decide whether to trust the payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: &[u8; EVENT_SIZE] = bytes
            .get(..EVENT_SIZE)
            .and_then(|head| head.try_into().ok())
            .ok_or(TraceError::Truncated { len: bytes.len() })?;

        let timestamp_ns = read_u64(record, OFF_TIMESTAMP);
        let thread_id = read_u64(record, OFF_THREAD);
        let format_version = record[OFF_VERSION];
        let tag = record[OFF_PAYLOAD_TAG];

        let payload = match EventKind::from_u8(record[OFF_KIND]) {
            Some(EventKind::Concurrency) => Payload::Concurrency {
                kind: ConcurrencyType::from_u8(tag),
                lock_id: read_u64(record, OFF_PAYLOAD_VALUE),
            },
            Some(EventKind::Log) => Payload::Log {
                level: LogLevel::from_u8(tag),
                message_id: read_u32(record, OFF_PAYLOAD_VALUE),
            },
            None => return Err(TraceError::UnknownKind(record[OFF_KIND])),
        };

        Ok(Event {
            timestamp_ns,
            thread_id,
            format_version,
            payload,
        })
    }
}

fn read_u64(record: &[u8; EVENT_SIZE], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&record[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn read_u32(record: &[u8; EVENT_SIZE], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&record[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

/// Encode an event (see [`Event::to_bytes`])
pub fn serialize(event: &Event) -> [u8; EVENT_SIZE] {
    event.to_bytes()
}

/// Decode an event (see [`Event::from_bytes`])
pub fn deserialize(bytes: &[u8]) -> Result<Event> {
    Event::from_bytes(bytes)
}

/// Whether this reader understands the record's format version
pub fn is_valid(event: &Event) -> bool {
    event.format_version <= MAX_SUPPORTED_VERSION
}

/// Peek at the version byte of an encoded record without decoding it
pub fn peek_version(bytes: &[u8]) -> Option<u8> {
    bytes.get(OFF_VERSION).copied()
}
