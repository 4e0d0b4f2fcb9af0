//! Working-memory accounting for the workloads of one backend instance.
//!
//! Each backend participating in a loaded graph gets one [`MemoryManager`].
//! Workloads lease scratch capacity at construction time and the lease is
//! released when the [`MemoryHandle`] drops, which covers every exit path
//! including construction failing partway through.
//!
//! Sharing one manager across concurrently executing graphs is a caller
//! error; the core neither detects nor tolerates it.

use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "scratch pool exhausted: requested {requested} bytes with {outstanding} of {capacity} in use"
)]
pub struct MemoryError {
    pub requested: usize,
    pub outstanding: usize,
    pub capacity: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    outstanding: usize,
    peak: usize,
}

#[derive(Debug)]
struct PoolInner {
    capacity: usize,
    state: Mutex<PoolState>,
}

/// Byte-capacity scratch pool shared by all workloads of one backend instance.
///
/// Cheap to clone; clones share the same pool.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    inner: Arc<PoolInner>,
}

impl MemoryManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    /// Leases `size` bytes of scratch capacity.
    ///
    /// Leases are exclusive: no two live handles account for the same bytes.
    pub fn acquire(&self, size: usize) -> Result<MemoryHandle, MemoryError> {
        let mut state = self.inner.state.lock().unwrap();
        let requested_total = state.outstanding.saturating_add(size);
        if requested_total > self.inner.capacity {
            return Err(MemoryError {
                requested: size,
                outstanding: state.outstanding,
                capacity: self.inner.capacity,
            });
        }
        state.outstanding = requested_total;
        state.peak = state.peak.max(requested_total);
        drop(state);
        Ok(MemoryHandle {
            size,
            pool: Arc::clone(&self.inner),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Bytes currently leased and not yet released.
    pub fn outstanding_bytes(&self) -> usize {
        self.inner.state.lock().unwrap().outstanding
    }

    /// High-water mark of leased bytes over the pool's lifetime.
    pub fn peak_bytes(&self) -> usize {
        self.inner.state.lock().unwrap().peak
    }
}

/// Scoped lease of backend scratch capacity, released on drop.
#[derive(Debug)]
pub struct MemoryHandle {
    size: usize,
    pool: Arc<PoolInner>,
}

impl MemoryHandle {
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        let mut state = self.pool.state.lock().unwrap();
        state.outstanding = state.outstanding.saturating_sub(self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leases_never_exceed_capacity() {
        let pool = MemoryManager::new(100);
        let a = pool.acquire(60).unwrap();
        assert_eq!(pool.outstanding_bytes(), 60);

        let err = pool.acquire(50).expect_err("over capacity");
        assert_eq!(
            err,
            MemoryError {
                requested: 50,
                outstanding: 60,
                capacity: 100
            }
        );
        // A failed acquisition leases nothing.
        assert_eq!(pool.outstanding_bytes(), 60);

        let b = pool.acquire(40).unwrap();
        assert_eq!(pool.outstanding_bytes(), 100);
        drop(a);
        assert_eq!(pool.outstanding_bytes(), 40);
        drop(b);
        assert_eq!(pool.outstanding_bytes(), 0);
        assert_eq!(pool.peak_bytes(), 100);
    }

    #[test]
    fn drop_releases_on_early_exit_paths() {
        let pool = MemoryManager::new(64);
        let build = |fail: bool| -> Result<MemoryHandle, &'static str> {
            let lease = pool.acquire(64).map_err(|_| "pool")?;
            if fail {
                return Err("construction failed after acquiring scratch");
            }
            Ok(lease)
        };
        assert!(build(true).is_err());
        assert_eq!(pool.outstanding_bytes(), 0, "failed construction leaked");
        let lease = build(false).unwrap();
        assert_eq!(pool.outstanding_bytes(), 64);
        drop(lease);
        assert_eq!(pool.outstanding_bytes(), 0);
    }

    #[test]
    fn zero_sized_lease_is_permitted() {
        let pool = MemoryManager::new(0);
        let lease = pool.acquire(0).unwrap();
        assert_eq!(lease.size(), 0);
        assert!(pool.acquire(1).is_err());
    }
}
