//! Supervisor registry.
//!
//! Identifies the single host thread that drives accounting but is never
//! metered or terminated. Threads are compared through a process-unique
//! [`ThreadKey`] so the registry fits in one atomic word: workers read it on
//! every accounting call without taking a lock, and a racing update is
//! observed as either the old or the new supervisor.

use serde::Serialize;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_KEY: ThreadKey = ThreadKey::allocate();
}

/// Process-unique identity of an OS thread, assigned on first use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ThreadKey(NonZeroU64);

impl ThreadKey {
    /// Key of the calling thread
    pub fn current() -> Self {
        CURRENT_KEY.with(|key| *key)
    }

    fn allocate() -> Self {
        let raw = NEXT_THREAD_KEY.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MAX))
    }

    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

const NO_SUPERVISOR: u64 = 0;

/// Holds at most one exempt thread. Empty means no thread is exempt.
#[derive(Debug)]
pub struct SupervisorRegistry {
    primary: AtomicU64,
}

impl SupervisorRegistry {
    pub const fn new() -> Self {
        Self {
            primary: AtomicU64::new(NO_SUPERVISOR),
        }
    }

    pub fn with_supervisor(key: ThreadKey) -> Self {
        let registry = Self::new();
        registry.set_supervisor(key);
        registry
    }

    /// Replace the exempt thread. Last write wins.
    pub fn set_supervisor(&self, key: ThreadKey) {
        let previous = self.primary.swap(key.get(), Ordering::AcqRel);
        if previous != NO_SUPERVISOR && previous != key.get() {
            log::info!("Supervisor thread replaced: {} -> {}", previous, key.get());
        } else {
            log::info!("Supervisor thread registered: {}", key.get());
        }
    }

    pub fn clear(&self) {
        self.primary.store(NO_SUPERVISOR, Ordering::Release);
    }

    pub fn supervisor(&self) -> Option<ThreadKey> {
        NonZeroU64::new(self.primary.load(Ordering::Acquire)).map(ThreadKey)
    }

    pub fn is_supervisor(&self, key: ThreadKey) -> bool {
        self.primary.load(Ordering::Acquire) == key.get()
    }

    pub fn is_current_supervisor(&self) -> bool {
        self.is_supervisor(ThreadKey::current())
    }
}

impl Default for SupervisorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn keys_are_stable_per_thread_and_distinct_across_threads() {
        let here = ThreadKey::current();
        assert_eq!(here, ThreadKey::current());

        let there = thread::spawn(ThreadKey::current).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn empty_registry_exempts_nobody() {
        let registry = SupervisorRegistry::new();
        assert_eq!(registry.supervisor(), None);
        assert!(!registry.is_current_supervisor());
    }

    #[test]
    fn last_registration_wins() {
        let registry = SupervisorRegistry::with_supervisor(ThreadKey::current());
        assert!(registry.is_current_supervisor());

        let other = thread::spawn(ThreadKey::current).join().unwrap();
        registry.set_supervisor(other);
        assert!(!registry.is_current_supervisor());
        assert!(registry.is_supervisor(other));

        registry.clear();
        assert_eq!(registry.supervisor(), None);
    }
}
