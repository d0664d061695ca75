//! Scope guards that perform a real operation and record it
//!
//! [`ThreadGuard`] brackets a thread's body with `ThreadStart`/`ThreadEnd`.
//! [`LockGuard`] takes a lock, records `LockAcquire`, and on drop releases
//! the lock and records `LockRelease`. Both emit their closing event from
//! `Drop`, so the pair is closed on every exit path: early return, `?`
//! propagation and unwinding alike.
//!
//! Neither guard is `Clone` or `Send`. A guard belongs to the thread that
//! created it, which is what keeps start/end and acquire/release paired per
//! thread.
//!
//! Event emission never blocks and never fails visibly: a full capture queue
//! only bumps the dropped counter.

use crate::event::ConcurrencyType;
use crate::event_factory::make_concurrency_event;
use crate::thread_id::current_thread_id;
use crate::tracer::Tracer;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    /// Registries of the tracers with a live ThreadGuard on this thread
    static ACTIVE_THREAD_GUARDS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// A resource with explicit lock/unlock calls
///
/// Only [`LockGuard`] releases a lock, so safe code cannot reach `unlock`:
///
/// ```compile_fail
/// use parking_lot::lock_api::RawMutex as _;
/// use ucdbg::Lockable;
///
/// let mutex = parking_lot::RawMutex::INIT;
/// Lockable::lock(&mutex);
/// Lockable::unlock(&mutex);
/// ```
pub trait Lockable {
    fn lock(&self);

    /// Release a lock taken by [`Lockable::lock`]
    ///
    /// # Safety
    ///
    /// The caller must hold the lock, acquired by `lock` on the current
    /// thread, and must not use that acquisition again afterwards.
    unsafe fn unlock(&self);
}

impl Lockable for parking_lot::RawMutex {
    fn lock(&self) {
        parking_lot::lock_api::RawMutex::lock(self);
    }

    unsafe fn unlock(&self) {
        // SAFETY: forwarded from the caller's contract
        unsafe { parking_lot::lock_api::RawMutex::unlock(self) }
    }
}

/// Identity used for a lockable when no explicit id is supplied
pub fn address_lock_id<L: Lockable + ?Sized>(lockable: &L) -> u64 {
    lockable as *const L as *const () as usize as u64
}

/// Emits `ThreadStart` on creation and `ThreadEnd` on drop
///
/// A guard created while another guard for the same tracer is alive on this
/// thread is inert: the thread is already started, so it emits nothing and
/// the outermost guard alone closes the thread.
pub struct ThreadGuard<'t> {
    tracer: &'t Tracer,
    thread_id: u64,
    outermost: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'t> ThreadGuard<'t> {
    pub fn new(tracer: &'t Tracer) -> Self {
        let registry_id = tracer.registry().id();
        let outermost = ACTIVE_THREAD_GUARDS.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&registry_id) {
                false
            } else {
                active.push(registry_id);
                true
            }
        });

        let thread_id = if outermost {
            let event = make_concurrency_event(ConcurrencyType::ThreadStart, 0);
            tracer
                .registry()
                .record_start(event.thread_id, event.timestamp_ns);
            tracer.capture(event);
            event.thread_id
        } else {
            current_thread_id()
        };

        Self {
            tracer,
            thread_id,
            outermost,
            _not_send: PhantomData,
        }
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        if !self.outermost {
            return;
        }

        let registry_id = self.tracer.registry().id();
        ACTIVE_THREAD_GUARDS.with(|active| active.borrow_mut().retain(|id| *id != registry_id));

        let event = make_concurrency_event(ConcurrencyType::ThreadEnd, 0);
        self.tracer
            .registry()
            .record_end(self.thread_id, event.timestamp_ns);
        self.tracer.capture(event);
    }
}

/// Holds `lockable` locked for its scope and records acquire/release
pub struct LockGuard<'a, L: Lockable + ?Sized> {
    tracer: &'a Tracer,
    lockable: &'a L,
    lock_id: u64,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: Lockable + ?Sized> LockGuard<'a, L> {
    /// Lock, identifying the lock by its address
    pub fn new(tracer: &'a Tracer, lockable: &'a L) -> Self {
        Self::with_id(tracer, lockable, 0)
    }

    /// Lock with an explicit id; 0 falls back to the address identity
    pub fn with_id(tracer: &'a Tracer, lockable: &'a L, lock_id: u64) -> Self {
        let lock_id = if lock_id == 0 {
            address_lock_id(lockable)
        } else {
            lock_id
        };

        lockable.lock();
        tracer.capture(make_concurrency_event(ConcurrencyType::LockAcquire, lock_id));

        Self {
            tracer,
            lockable,
            lock_id,
            _not_send: PhantomData,
        }
    }

    pub fn lock_id(&self) -> u64 {
        self.lock_id
    }
}

impl<L: Lockable + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        // SAFETY: `with_id` locked `lockable` on this thread, the guard is
        // !Send, and drop runs exactly once.
        unsafe { self.lockable.unlock() };
        self.tracer
            .capture(make_concurrency_event(ConcurrencyType::LockRelease, self.lock_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracerConfig;
    use crate::event::Event;
    use parking_lot::lock_api::RawMutex as _;
    use std::cell::Cell;

    /// Records the order of lock/unlock calls relative to the queue length
    struct RecordingLock<'t> {
        tracer: &'t Tracer,
        locked: Cell<bool>,
        queued_at_lock: Cell<usize>,
        queued_at_unlock: Cell<usize>,
    }

    impl Lockable for RecordingLock<'_> {
        fn lock(&self) {
            assert!(!self.locked.get());
            self.locked.set(true);
            self.queued_at_lock.set(self.tracer.queue().len());
        }

        unsafe fn unlock(&self) {
            assert!(self.locked.get());
            self.locked.set(false);
            self.queued_at_unlock.set(self.tracer.queue().len());
        }
    }

    fn assert_unlocked(mutex: &parking_lot::RawMutex) {
        assert!(mutex.try_lock());
        unsafe { parking_lot::lock_api::RawMutex::unlock(mutex) };
    }

    fn tracer() -> Tracer {
        Tracer::new(TracerConfig::default().with_queue_capacity(1024))
    }

    fn types(events: &[Event]) -> Vec<ConcurrencyType> {
        events.iter().filter_map(Event::concurrency_type).collect()
    }

    #[test]
    fn test_thread_guard_pairs_events() {
        let tracer = tracer();
        {
            let guard = ThreadGuard::new(&tracer);
            assert_eq!(guard.thread_id(), current_thread_id());
        }

        let events = tracer.queue().drain_all();
        assert_eq!(
            types(&events),
            vec![ConcurrencyType::ThreadStart, ConcurrencyType::ThreadEnd]
        );
        assert!(events.iter().all(|e| e.thread_id == current_thread_id()));

        let info = tracer.registry().get(current_thread_id()).unwrap();
        assert!(info.start_time.unwrap() < info.end_time.unwrap());
    }

    #[test]
    fn test_lock_event_follows_lock_and_release_follows_unlock() {
        let tracer = tracer();
        let recorder = RecordingLock {
            tracer: &tracer,
            locked: Cell::new(false),
            queued_at_lock: Cell::new(usize::MAX),
            queued_at_unlock: Cell::new(usize::MAX),
        };

        {
            let _guard = LockGuard::new(&tracer, &recorder);
            assert!(recorder.locked.get());
        }

        assert!(!recorder.locked.get());
        // nothing queued yet when lock() ran, acquire already queued at unlock()
        assert_eq!(recorder.queued_at_lock.get(), 0);
        assert_eq!(recorder.queued_at_unlock.get(), 1);
        assert_eq!(
            types(&tracer.queue().drain_all()),
            vec![ConcurrencyType::LockAcquire, ConcurrencyType::LockRelease]
        );
    }

    #[test]
    fn test_address_identity_is_stable() {
        let tracer = tracer();
        let mutex = parking_lot::RawMutex::INIT;

        let first = LockGuard::new(&tracer, &mutex).lock_id();
        let second = LockGuard::new(&tracer, &mutex).lock_id();
        assert_eq!(first, second);
        assert_eq!(first, address_lock_id(&mutex));

        let ids: Vec<_> = tracer
            .queue()
            .drain_all()
            .iter()
            .filter_map(Event::lock_id)
            .collect();
        assert_eq!(ids, vec![first; 4]);
    }

    #[test]
    fn test_explicit_id_wins_and_zero_falls_back() {
        let tracer = tracer();
        let mutex = parking_lot::RawMutex::INIT;

        assert_eq!(LockGuard::with_id(&tracer, &mutex, 17).lock_id(), 17);
        assert_eq!(
            LockGuard::with_id(&tracer, &mutex, 0).lock_id(),
            address_lock_id(&mutex)
        );
    }

    #[test]
    fn test_release_runs_on_early_return() {
        fn critical(tracer: &Tracer, mutex: &parking_lot::RawMutex, fail: bool) -> Result<u32, ()> {
            let _guard = LockGuard::new(tracer, mutex);
            if fail {
                return Err(());
            }
            Ok(1)
        }

        let tracer = tracer();
        let mutex = parking_lot::RawMutex::INIT;
        assert!(critical(&tracer, &mutex, true).is_err());
        assert!(critical(&tracer, &mutex, false).is_ok());

        // lock was released both times
        assert_unlocked(&mutex);

        assert_eq!(
            types(&tracer.queue().drain_all()),
            vec![
                ConcurrencyType::LockAcquire,
                ConcurrencyType::LockRelease,
                ConcurrencyType::LockAcquire,
                ConcurrencyType::LockRelease,
            ]
        );
    }

    #[test]
    fn test_release_runs_on_unwind() {
        let tracer = tracer();
        let mutex = parking_lot::RawMutex::INIT;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = LockGuard::new(&tracer, &mutex);
            panic!("boom");
        }));
        assert!(result.is_err());

        assert_unlocked(&mutex);
        assert_eq!(
            types(&tracer.queue().drain_all()),
            vec![ConcurrencyType::LockAcquire, ConcurrencyType::LockRelease]
        );
    }

    #[test]
    fn test_full_queue_does_not_disturb_guard() {
        let tracer = Tracer::new(TracerConfig::default().with_queue_capacity(1));
        let mutex = parking_lot::RawMutex::INIT;
        {
            let _guard = LockGuard::new(&tracer, &mutex);
        }
        assert_eq!(tracer.queue().len(), 1);
        assert_eq!(tracer.queue().dropped(), 1);
        assert_unlocked(&mutex);
    }

    #[test]
    fn test_lock_held_exclusively_while_guard_alive() {
        let tracer = tracer();
        let mutex = parking_lot::RawMutex::INIT;
        {
            let _guard = LockGuard::new(&tracer, &mutex);
            // releasing is only reachable through the guard's drop
            assert!(!mutex.try_lock());
        }
        assert_unlocked(&mutex);
    }

    #[test]
    fn test_nested_thread_guard_is_inert() {
        let tracer = tracer();
        {
            let outer = ThreadGuard::new(&tracer);
            {
                let inner = ThreadGuard::new(&tracer);
                assert_eq!(inner.thread_id(), outer.thread_id());
            }
            assert_eq!(
                types(&tracer.queue().drain_all()),
                vec![ConcurrencyType::ThreadStart]
            );
        }
        assert_eq!(
            types(&tracer.queue().drain_all()),
            vec![ConcurrencyType::ThreadEnd]
        );

        // a fresh guard after the outer one ended starts the thread again
        drop(ThreadGuard::new(&tracer));
        assert_eq!(
            types(&tracer.queue().drain_all()),
            vec![ConcurrencyType::ThreadStart, ConcurrencyType::ThreadEnd]
        );
    }

    #[test]
    fn test_thread_guards_on_distinct_tracers_both_emit() {
        let first = tracer();
        let second = tracer();
        {
            let _a = ThreadGuard::new(&first);
            let _b = ThreadGuard::new(&second);
        }
        assert_eq!(first.queue().len(), 2);
        assert_eq!(second.queue().len(), 2);
    }
}
