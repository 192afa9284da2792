//! Bounded per-engine call pools.
//!
//! Each engine gets `max_size` concurrent call slots and at most
//! `max_queue` callers waiting for a slot. A caller that finds the queue
//! full fails fast with [`FailureKind::PoolExhausted`] instead of waiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ConfigError, EngineFailure, FailureKind};

/// Pool bounds applied to every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Concurrent in-flight calls per engine.
    pub max_size: usize,
    /// Callers allowed to wait for a free slot.
    pub max_queue: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_queue: 20,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid(
                "pool max_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Call slots for a single engine.
#[derive(Debug)]
pub struct EnginePool {
    slots: Arc<Semaphore>,
    waiting: AtomicUsize,
    config: PoolConfig,
}

/// Holds one slot; released on drop.
#[derive(Debug)]
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
}

/// Decrements the waiter count however the wait ends.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl EnginePool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_size)),
            waiting: AtomicUsize::new(0),
            config,
        }
    }

    /// Take a slot, waiting at most `timeout` for one to free up.
    ///
    /// # Errors
    ///
    /// [`FailureKind::PoolExhausted`] when the wait queue is full, or
    /// [`FailureKind::Timeout`] when no slot frees up in time.
    pub async fn acquire(&self, timeout: Duration) -> Result<PoolPermit, EngineFailure> {
        if let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() {
            return Ok(PoolPermit { _permit: permit });
        }

        let queued = self.waiting.fetch_add(1, Ordering::AcqRel);
        let _slot = QueueSlot(&self.waiting);
        if queued >= self.config.max_queue {
            return Err(EngineFailure::new(
                FailureKind::PoolExhausted,
                format!(
                    "{} calls in flight and {} waiting",
                    self.config.max_size, self.config.max_queue
                ),
            ));
        }

        match tokio::time::timeout(timeout, Arc::clone(&self.slots).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(PoolPermit { _permit: permit }),
            Ok(Err(_closed)) => Err(EngineFailure::new(
                FailureKind::PoolExhausted,
                "pool closed",
            )),
            Err(_elapsed) => Err(EngineFailure::timeout("timed out waiting for a pool slot")),
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Callers currently waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}
