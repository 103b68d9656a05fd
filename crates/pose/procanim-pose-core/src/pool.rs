//! Reusable pose buffers.
//!
//! [`PosePool::acquire`] checks a buffer out as a [`PoseHandle`]. The handle
//! owns the buffer outright, so it is the only way to reach it, and it cannot
//! be copied. Dropping the handle (or passing it to [`PosePool::release`])
//! returns the buffer for reuse; the allocation survives across ticks.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::PoseError;
use crate::transform::Transform;

#[derive(Debug)]
struct PoolState {
    free: Vec<Vec<Transform>>,
    total: usize,
    outstanding: usize,
}

#[derive(Debug)]
struct PoolShared {
    state: Mutex<PoolState>,
    allow_growth: bool,
}

impl PoolShared {
    fn give_back(&self, mut buffer: Vec<Transform>) {
        buffer.clear();
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.free.push(buffer);
    }
}

/// Snapshot of pool occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub outstanding: usize,
    pub free: usize,
}

/// Shared pool of pose buffers. Cloning yields another handle to the same pool.
#[derive(Clone, Debug)]
pub struct PosePool {
    shared: Arc<PoolShared>,
}

impl PosePool {
    /// Create a pool with `capacity` buffers. With `allow_growth` the pool
    /// allocates past `capacity` instead of failing.
    pub fn new(capacity: usize, allow_growth: bool) -> Self {
        let free = (0..capacity).map(|_| Vec::new()).collect();
        Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    free,
                    total: capacity,
                    outstanding: 0,
                }),
                allow_growth,
            }),
        }
    }

    /// Check out a buffer of `bone_count` identity transforms.
    pub fn acquire(&self, bone_count: usize) -> Result<PoseHandle, PoseError> {
        let mut buffer = {
            let mut state = self.shared.state.lock();
            let buffer = match state.free.pop() {
                Some(buffer) => buffer,
                None if self.shared.allow_growth => {
                    state.total += 1;
                    Vec::with_capacity(bone_count)
                }
                None => {
                    log::warn!("pose pool exhausted with {} buffers in use", state.total);
                    return Err(PoseError::PoolExhausted {
                        capacity: state.total,
                    });
                }
            };
            state.outstanding += 1;
            buffer
        };
        buffer.resize(bone_count, Transform::identity());
        Ok(PoseHandle {
            buffer,
            pool: Arc::clone(&self.shared),
        })
    }

    /// Check out a buffer initialised with a copy of `pose`.
    pub fn acquire_copy(&self, pose: &[Transform]) -> Result<PoseHandle, PoseError> {
        let mut handle = self.acquire(pose.len())?;
        handle.pose_mut().copy_from_slice(pose);
        Ok(handle)
    }

    /// Return a buffer to the pool. Equivalent to dropping the handle.
    pub fn release(&self, handle: PoseHandle) {
        drop(handle);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            total: state.total,
            outstanding: state.outstanding,
            free: state.free.len(),
        }
    }
}

/// Exclusive checkout of one pooled pose buffer.
pub struct PoseHandle {
    buffer: Vec<Transform>,
    pool: Arc<PoolShared>,
}

impl PoseHandle {
    #[inline]
    pub fn pose(&self) -> &[Transform] {
        &self.buffer
    }

    #[inline]
    pub fn pose_mut(&mut self) -> &mut [Transform] {
        &mut self.buffer
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.buffer.len()
    }

    /// Overwrite this buffer with `src`, which must have the same bone count.
    pub fn copy_from(&mut self, src: &[Transform]) -> Result<(), PoseError> {
        if src.len() != self.buffer.len() {
            return Err(PoseError::BoneCountMismatch {
                expected: self.buffer.len(),
                actual: src.len(),
            });
        }
        self.buffer.copy_from_slice(src);
        Ok(())
    }
}

impl Drop for PoseHandle {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buffer));
    }
}

impl fmt::Debug for PoseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoseHandle")
            .field("bones", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_without_growth_and_recovers_after_release() {
        let pool = PosePool::new(2, false);
        let a = pool.acquire(3).unwrap();
        let _b = pool.acquire(3).unwrap();
        assert_eq!(
            pool.acquire(3).unwrap_err(),
            PoseError::PoolExhausted { capacity: 2 }
        );
        pool.release(a);
        assert!(pool.acquire(3).is_ok());
    }

    #[test]
    fn grows_when_allowed() {
        let pool = PosePool::new(1, true);
        let _a = pool.acquire(1).unwrap();
        let _b = pool.acquire(1).unwrap();
        assert_eq!(
            pool.stats(),
            PoolStats {
                total: 2,
                outstanding: 2,
                free: 0
            }
        );
    }

    #[test]
    fn recycled_buffers_are_reset_to_identity() {
        let pool = PosePool::new(1, false);
        let mut a = pool.acquire(2).unwrap();
        a.pose_mut()[0].translation.x = 5.0;
        drop(a);
        let b = pool.acquire(4).unwrap();
        assert_eq!(b.bone_count(), 4);
        assert!(b.pose().iter().all(|t| *t == Transform::identity()));
        assert_eq!(pool.stats().outstanding, 1);
    }
}
