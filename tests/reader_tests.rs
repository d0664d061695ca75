//! Integration tests for reading record streams from disk
//!
//! # Test Coverage
//!
//! - ✅ Mixed-version stream: newer records skipped, stream continues
//! - ✅ Unknown kind byte skipped
//! - ✅ Partial trailing record reported, not decoded
//! - ✅ Iterator interface over a buffered file

use std::fs::File;
use std::io::{BufReader, Write};
use ucdbg::event::{serialize, ConcurrencyType, LogLevel, EVENT_SIZE, MAX_SUPPORTED_VERSION};
use ucdbg::event_factory::{make_concurrency_event, make_log_event};
use ucdbg::reader::EventReader;

fn write_stream(records: &[[u8; EVENT_SIZE]], tail: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for record in records {
        file.write_all(record).unwrap();
    }
    file.write_all(tail).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_newer_version_record_is_skipped() {
    let first = serialize(&make_concurrency_event(ConcurrencyType::LockAcquire, 1));
    let mut future = serialize(&make_concurrency_event(ConcurrencyType::LockAcquire, 2));
    future[16] = MAX_SUPPORTED_VERSION + 1;
    let last = serialize(&make_concurrency_event(ConcurrencyType::LockRelease, 1));

    let file = write_stream(&[first, future, last], &[]);
    let mut reader = EventReader::new(BufReader::new(File::open(file.path()).unwrap()));
    let events = reader.read_all().unwrap();

    let ids: Vec<_> = events.iter().map(|e| e.lock_id().unwrap()).collect();
    assert_eq!(ids, vec![1, 1]);
    let stats = reader.stats();
    assert_eq!(stats.records, 2);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn test_unknown_kind_is_skipped() {
    let mut odd = serialize(&make_log_event(LogLevel::Info, 5));
    odd[17] = 9;
    let good = serialize(&make_log_event(LogLevel::Info, 6));

    let file = write_stream(&[odd, good], &[]);
    let mut reader = EventReader::new(File::open(file.path()).unwrap());
    let events = reader.read_all().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(reader.stats().skipped, 1);
}

#[test]
fn test_partial_tail_reported() {
    let record = serialize(&make_log_event(LogLevel::Debug, 1));
    let file = write_stream(&[record, record], &[0u8; 7]);

    let mut reader = EventReader::new(File::open(file.path()).unwrap());
    assert_eq!(reader.read_all().unwrap().len(), 2);
    assert_eq!(reader.stats().trailing_bytes, 7);
}

#[test]
fn test_iterator_over_file() {
    let records: Vec<_> = (0..64)
        .map(|i| serialize(&make_concurrency_event(ConcurrencyType::LockAcquire, i)))
        .collect();
    let file = write_stream(&records, &[]);

    let reader = EventReader::new(BufReader::new(File::open(file.path()).unwrap()));
    let ids: Vec<u64> = reader
        .map(|event| event.unwrap().lock_id().unwrap())
        .collect();
    assert_eq!(ids, (0..64).collect::<Vec<_>>());
}
