use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::{OverflowPolicy, QueueOptions};
use crate::{JobsError, JobsResult};

/// What happened to an item offered to a full (or non-full) buffer
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// The item was stored
    Stored,
    /// The item was stored and this older item was evicted to make room
    Evicted(T),
    /// The buffer was full and the item was not stored
    Dropped(T),
}

enum Offer<T> {
    Settled(Admission<T>),
    /// Full under [`OverflowPolicy::Wait`]; the item comes back for a retry
    Full(T),
}

/// FIFO buffer shared by any number of producers and consumers.
///
/// Bounded buffers apply their [`OverflowPolicy`] when full. All waiting is
/// cancel-safe: dropping a pending `push` or `pop` never loses an item.
#[derive(Debug)]
pub struct JobBuffer<T> {
    items: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    readable: Notify,
    writable: Notify,
}

impl<T> JobBuffer<T> {
    pub fn new(options: &QueueOptions) -> JobsResult<Self> {
        options.validate()?;
        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(options.capacity.unwrap_or(0))),
            capacity: options.capacity,
            // Unbounded buffers never consult the policy
            policy: options.overflow_policy.unwrap_or(OverflowPolicy::Wait),
            readable: Notify::new(),
            writable: Notify::new(),
        })
    }

    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: None,
            policy: OverflowPolicy::Wait,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn policy(&self) -> Option<OverflowPolicy> {
        self.capacity.map(|_| self.policy)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Offer an item, applying the overflow policy when the buffer is full.
    ///
    /// Only [`OverflowPolicy::Wait`] suspends; every other policy settles immediately.
    pub async fn push(&self, mut item: T) -> JobsResult<Admission<T>> {
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.offer(item)? {
                Offer::Settled(admission) => return Ok(admission),
                Offer::Full(rejected) => item = rejected,
            }

            notified.await;
        }
    }

    fn offer(&self, item: T) -> JobsResult<Offer<T>> {
        let mut items = self.items.lock();
        let admission = match self.capacity {
            Some(capacity) if items.len() >= capacity => match self.policy {
                OverflowPolicy::Wait => return Ok(Offer::Full(item)),
                OverflowPolicy::Ignore => return Ok(Offer::Settled(Admission::Dropped(item))),
                OverflowPolicy::ThrowException => {
                    return Err(JobsError::CapacityExceeded { capacity })
                }
                OverflowPolicy::DiscardOldest => {
                    let evicted = items.pop_front();
                    items.push_back(item);
                    evicted.map_or(Admission::Stored, Admission::Evicted)
                }
                OverflowPolicy::DiscardNewest => {
                    let evicted = items.pop_back();
                    items.push_back(item);
                    evicted.map_or(Admission::Stored, Admission::Evicted)
                }
            },
            _ => {
                items.push_back(item);
                Admission::Stored
            }
        };
        drop(items);
        self.readable.notify_one();
        Ok(Offer::Settled(admission))
    }

    #[cfg(test)]
    fn try_pop(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.writable.notify_waiters();
        }
        item
    }

    /// Wait for an item and remove the oldest one
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.take(1).pop() {
                return item;
            }

            notified.await;
        }
    }

    /// Wait for at least one item, then take it plus up to `max_count - 1`
    /// items that are already buffered. Never returns an empty batch.
    pub async fn pop_batch(&self, max_count: usize) -> JobsResult<Vec<T>> {
        if max_count == 0 {
            return Err(JobsError::invalid_argument(
                "batch size must be greater than zero",
            ));
        }

        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.take(max_count);
            if !batch.is_empty() {
                return Ok(batch);
            }

            notified.await;
        }
    }

    fn take(&self, max_count: usize) -> Vec<T> {
        let (batch, remaining) = {
            let mut items = self.items.lock();
            let count = max_count.min(items.len());
            let batch: Vec<T> = items.drain(..count).collect();
            (batch, items.len())
        };

        if !batch.is_empty() {
            self.writable.notify_waiters();
            // Hand leftovers to the next waiting consumer
            if remaining > 0 {
                self.readable.notify_one();
            }
        }
        batch
    }
}
