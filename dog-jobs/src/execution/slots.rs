use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{JobsError, JobsResult};

/// Counting limiter for concurrent job execution.
///
/// The pool starts empty and is seeded once by [`SlotTracker::initialize`].
/// Acquired slots are detached from any guard, so every acquired slot must
/// be handed back through [`SlotTracker::release`] (directly or via a [`SlotGuard`]).
#[derive(Debug, Clone)]
pub struct SlotTracker {
    semaphore: Arc<Semaphore>,
    initialized: Arc<AtomicBool>,
}

impl SlotTracker {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(0)),
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Seed the pool with `slots` permits; allowed exactly once
    pub fn initialize(&self, slots: usize) -> JobsResult<()> {
        if slots == 0 {
            return Err(JobsError::config("slot count must be greater than zero"));
        }
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(JobsError::AlreadyInitialized);
        }
        self.semaphore.add_permits(slots);
        Ok(())
    }

    /// Wait for one free slot, then also take every slot free at that instant.
    /// Returns how many slots were taken (always at least one).
    pub async fn acquire_available(&self) -> JobsResult<usize> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| JobsError::Shutdown)?
            .forget();

        let mut taken = 1;
        while let Ok(permit) = self.semaphore.try_acquire() {
            permit.forget();
            taken += 1;
        }
        Ok(taken)
    }

    /// Return `count` slots to the pool
    pub fn release(&self, count: usize) {
        if count > 0 {
            self.semaphore.add_permits(count);
        }
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for SlotTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns one acquired slot and returns it when dropped
#[derive(Debug)]
pub struct SlotGuard {
    tracker: SlotTracker,
}

impl SlotGuard {
    /// Take ownership of a slot that was already acquired from `tracker`
    pub fn adopt(tracker: SlotTracker) -> Self {
        Self { tracker }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.tracker.release(1);
    }
}
