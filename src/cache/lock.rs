//! Poison-recovering lock acquisition for the cache layer. A thread that
//! panics while holding a cache lock leaves at worst a stale entry, which
//! the invalidation path already handles, so poisoning is logged and the
//! guard is reclaimed rather than propagated.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(result: LockResult<G>, target: &'static str, op: &'static str, kind: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(op, target_module = target, lock_kind = kind, "reclaimed poisoned cache lock");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), target, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), target, op, "rwlock.write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), target, op, "mutex.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, RwLock};

    #[test]
    fn poisoned_mutex_is_reclaimed_with_its_last_value() {
        let lock = Mutex::new(7u32);
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = lock.lock().unwrap();
            *guard = 9;
            panic!("poison");
        }));
        assert!(lock.is_poisoned());
        assert_eq!(*mutex_lock(&lock, "test", "read_back"), 9);
    }

    #[test]
    fn poisoned_rwlock_still_serves_readers_and_writers() {
        let lock = RwLock::new(vec![1, 2]);
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = lock.write().unwrap();
            panic!("poison");
        }));
        rw_write(&lock, "test", "push").push(3);
        assert_eq!(*rw_read(&lock, "test", "len"), vec![1, 2, 3]);
    }
}
