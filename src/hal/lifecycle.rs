use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, TryLockError};

/// Exclusive critical section around device construction and teardown.
///
/// Driver ecosystems are not assumed safe for concurrent instantiation or
/// destruction, even across unrelated devices, so every registry in the
/// process hands out clones of `FactoryLock::global()`. The guard is RAII:
/// the section is released on every exit path, including errors and panics.
#[derive(Clone, Default)]
pub struct FactoryLock {
    inner: Arc<Mutex<()>>,
}

/// Held while a device is being created or destroyed
pub struct FactoryGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

static GLOBAL: OnceLock<FactoryLock> = OnceLock::new();

impl FactoryLock {
    /// A standalone section, not shared with anything else
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide section used for every registry
    pub fn global() -> FactoryLock {
        GLOBAL.get_or_init(FactoryLock::new).clone()
    }

    /// Enter the critical section, blocking until it is free
    pub fn acquire(&self) -> FactoryGuard<'_> {
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        FactoryGuard { _guard: guard }
    }

    /// True while some thread (including the caller) holds the section
    pub fn is_held(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Run a construction step inside the critical section
    pub fn make<T>(&self, make: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.acquire();
        make()
    }

    /// Destroy a value inside the critical section
    pub fn release<T>(&self, value: T) {
        let _guard = self.acquire();
        drop(value);
    }

    /// Whether both handles refer to the same critical section
    pub fn same_as(&self, other: &FactoryLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_error() {
        let lock = FactoryLock::new();
        let result: Result<()> = lock.make(|| {
            assert!(lock.is_held());
            anyhow::bail!("creation failed")
        });
        assert!(result.is_err());
        assert!(!lock.is_held());
    }

    #[test]
    fn test_release_runs_drop_under_lock() {
        struct Probe(FactoryLock, Arc<Mutex<bool>>);
        impl Drop for Probe {
            fn drop(&mut self) {
                *self.1.lock().unwrap() = self.0.is_held();
            }
        }

        let lock = FactoryLock::new();
        let seen = Arc::new(Mutex::new(false));
        lock.release(Probe(lock.clone(), seen.clone()));
        assert!(*seen.lock().unwrap());
        assert!(!lock.is_held());
    }

    #[test]
    fn test_clones_share_the_section() {
        let lock = FactoryLock::new();
        let other = lock.clone();
        assert!(lock.same_as(&other));
        assert!(!lock.same_as(&FactoryLock::new()));

        let _guard = other.acquire();
        assert!(lock.is_held());
    }

    #[test]
    fn test_global_is_one_section() {
        assert!(FactoryLock::global().same_as(&FactoryLock::global()));
        assert!(!FactoryLock::global().same_as(&FactoryLock::new()));
    }
}
