//! Integration tests for thread and lock guards
//!
//! # Test Coverage
//!
//! - ✅ Three workers × 100 acquisitions of one shared lock
//! - ✅ Acquire/release alternate strictly per thread
//! - ✅ ThreadStart/ThreadEnd bracket every worker's events
//! - ✅ Nested guards on distinct locks release in reverse order
//! - ✅ Thread names visible across threads after naming

use parking_lot::lock_api::RawMutex as _;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use ucdbg::event::{ConcurrencyType, Event};
use ucdbg::{Tracer, TracerConfig};

const WORKERS: usize = 3;
const ITERATIONS: usize = 100;

fn tracer() -> Tracer {
    Tracer::new(TracerConfig::default().with_queue_capacity(8192))
}

fn by_thread(events: &[Event]) -> HashMap<u64, Vec<Event>> {
    let mut grouped: HashMap<u64, Vec<Event>> = HashMap::new();
    for event in events {
        grouped.entry(event.thread_id).or_default().push(*event);
    }
    grouped
}

#[test]
fn test_three_workers_shared_lock_scenario() {
    let tracer = tracer();
    let mutex = parking_lot::RawMutex::INIT;
    let counter = AtomicUsize::new(0);

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let tracer = &tracer;
            let mutex = &mutex;
            let counter = &counter;
            s.spawn(move || {
                tracer.set_thread_name(&format!("worker_{worker}")).unwrap();
                let _thread = tracer.thread_guard();
                for _ in 0..ITERATIONS {
                    let _held = tracer.lock_guard(mutex);
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });
    assert_eq!(counter.load(Ordering::Relaxed), WORKERS * ITERATIONS);

    let lock_id = ucdbg::guards::address_lock_id(&mutex);
    let events = tracer.queue().drain_all();
    assert_eq!(tracer.queue().dropped(), 0);

    let count = |kind: ConcurrencyType| {
        events
            .iter()
            .filter(|e| e.concurrency_type() == Some(kind) && e.lock_id() == Some(lock_id))
            .count()
    };
    assert_eq!(count(ConcurrencyType::LockAcquire), WORKERS * ITERATIONS);
    assert_eq!(count(ConcurrencyType::LockRelease), WORKERS * ITERATIONS);

    let grouped = by_thread(&events);
    assert_eq!(grouped.len(), WORKERS);

    for (thread_id, thread_events) in &grouped {
        let types: Vec<_> = thread_events
            .iter()
            .filter_map(Event::concurrency_type)
            .collect();

        assert_eq!(types.first(), Some(&ConcurrencyType::ThreadStart));
        assert_eq!(types.last(), Some(&ConcurrencyType::ThreadEnd));

        let lock_types = &types[1..types.len() - 1];
        assert_eq!(lock_types.len(), 2 * ITERATIONS);
        for pair in lock_types.chunks(2) {
            assert_eq!(
                pair,
                &[ConcurrencyType::LockAcquire, ConcurrencyType::LockRelease],
                "thread {thread_id} broke acquire/release alternation"
            );
        }

        // same-thread timestamps are strictly increasing
        assert!(thread_events
            .windows(2)
            .all(|w| w[0].timestamp_ns < w[1].timestamp_ns));

        let name = tracer.thread_name(*thread_id).unwrap();
        assert!(name.starts_with("worker_"));
    }
}

#[test]
fn test_nested_guards_release_in_reverse_order() {
    let tracer = tracer();
    let outer = parking_lot::RawMutex::INIT;
    let inner = parking_lot::RawMutex::INIT;

    {
        let _a = tracer.lock_guard_with_id(&outer, 1);
        let _b = tracer.lock_guard_with_id(&inner, 2);
    }

    let sequence: Vec<_> = tracer
        .queue()
        .drain_all()
        .iter()
        .map(|e| (e.concurrency_type().unwrap(), e.lock_id().unwrap()))
        .collect();
    assert_eq!(
        sequence,
        vec![
            (ConcurrencyType::LockAcquire, 1),
            (ConcurrencyType::LockAcquire, 2),
            (ConcurrencyType::LockRelease, 2),
            (ConcurrencyType::LockRelease, 1),
        ]
    );
}

#[test]
fn test_sequential_acquisitions_share_lock_id() {
    let tracer = tracer();
    let mutex = parking_lot::RawMutex::INIT;

    let ids: Vec<_> = (0..5).map(|_| tracer.lock_guard(&mutex).lock_id()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));

    let other = parking_lot::RawMutex::INIT;
    assert_ne!(tracer.lock_guard(&other).lock_id(), ids[0]);
}

#[test]
fn test_thread_guard_per_thread_pairing() {
    let tracer = tracer();

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let _guard = tracer.thread_guard();
            });
        }
    });

    let events = tracer.queue().drain_all();
    let grouped = by_thread(&events);
    assert_eq!(grouped.len(), 4);
    for thread_events in grouped.values() {
        let types: Vec<_> = thread_events
            .iter()
            .filter_map(Event::concurrency_type)
            .collect();
        assert_eq!(
            types,
            vec![ConcurrencyType::ThreadStart, ConcurrencyType::ThreadEnd]
        );
    }

    let infos = tracer.registry().snapshot();
    assert_eq!(infos.len(), 4);
    assert!(infos
        .iter()
        .all(|info| info.start_time.is_some() && info.end_time.is_some()));
}
