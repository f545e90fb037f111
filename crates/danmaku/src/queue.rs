//! Bounded ingestion queue.
//!
//! The only part of the engine shared across threads. Producers hold a
//! [`DanmakuSender`]; the frame driver owns the [`IngestQueue`] and drains it
//! once per tick.
//!
//! Capacity is tracked by a fair semaphore: a slot is a permit, taken by the
//! producer on admission and handed back by the consumer on dequeue. Waiting
//! submitters are woken in the order they started waiting, and `offer` can
//! not overtake them because freed permits go to waiters first.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DanmakuError, Result};
use crate::message::{Danmaku, DanmakuItem};

/// Admission counters kept by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounters {
    pub offered: u64,
    pub rejected: u64,
    pub submitted: u64,
    pub cancelled: u64,
}

#[derive(Debug)]
struct Shared {
    items: Mutex<VecDeque<DanmakuItem>>,
    permits: Semaphore,
    capacity: usize,
    offered: AtomicU64,
    rejected: AtomicU64,
    submitted: AtomicU64,
    cancelled: AtomicU64,
}

impl Shared {
    fn push(&self, item: DanmakuItem) {
        self.items.lock().push_back(item);
    }

    fn close(&self) {
        if !self.permits.is_closed() {
            self.permits.close();
            debug!(pending = self.items.lock().len(), "Closed danmaku ingestion queue");
        }
    }
}

/// Consuming side of the queue, owned by the frame driver.
///
/// Dropping it closes the queue and wakes every pending submitter.
#[derive(Debug)]
pub struct IngestQueue {
    shared: Arc<Shared>,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(VecDeque::new()),
                permits: Semaphore::new(capacity),
                capacity,
                offered: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
            }),
        }
    }

    /// A new producer handle.
    pub fn sender(&self) -> DanmakuSender {
        DanmakuSender {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of admitted items not yet dequeued.
    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every queued item in arrival order and free their slots.
    pub fn drain(&self) -> Vec<DanmakuItem> {
        let items: Vec<_> = self.shared.items.lock().drain(..).collect();
        if !items.is_empty() {
            self.shared.permits.add_permits(items.len());
        }
        items
    }

    /// Take the oldest queued item and free its slot.
    pub fn pop(&self) -> Option<DanmakuItem> {
        let item = self.shared.items.lock().pop_front();
        if item.is_some() {
            self.shared.permits.add_permits(1);
        }
        item
    }

    /// Discard everything queued.
    pub fn clear(&self) -> usize {
        self.drain().len()
    }

    /// Stop admitting. Pending submitters fail with
    /// [`DanmakuError::QueueClosed`]. Items already queued can still be
    /// drained.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.permits.is_closed()
    }

    pub fn counters(&self) -> QueueCounters {
        let s = &self.shared;
        QueueCounters {
            offered: s.offered.load(Ordering::Relaxed),
            rejected: s.rejected.load(Ordering::Relaxed),
            submitted: s.submitted.load(Ordering::Relaxed),
            cancelled: s.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl Drop for IngestQueue {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Producer handle. Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct DanmakuSender {
    shared: Arc<Shared>,
}

impl DanmakuSender {
    /// Admit a remote comment if there is room. Never blocks.
    pub fn offer(&self, danmaku: Danmaku) -> bool {
        self.offer_item(DanmakuItem::remote(danmaku))
    }

    /// Admit an item if there is room. Never blocks.
    pub fn offer_item(&self, item: DanmakuItem) -> bool {
        match self.shared.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.shared.push(item);
                self.shared.offered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TryAcquireError::NoPermits) => {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TryAcquireError::Closed) => false,
        }
    }

    /// Admit a comment sent by the local user, waiting for room.
    ///
    /// Fails with [`DanmakuError::QueueClosed`] if the queue is torn down
    /// first. Dropping the future gives up the place in line.
    pub async fn submit(&self, danmaku: Danmaku) -> Result<()> {
        self.submit_item(DanmakuItem::own(danmaku)).await
    }

    /// Admit an item, waiting for room.
    pub async fn submit_item(&self, item: DanmakuItem) -> Result<()> {
        match self.shared.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.shared.push(item);
                self.shared.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                self.shared.cancelled.fetch_add(1, Ordering::Relaxed);
                Err(DanmakuError::QueueClosed)
            }
        }
    }

    /// Like [`submit`](Self::submit), but gives up with
    /// [`DanmakuError::Cancelled`] once `token` is cancelled.
    pub async fn submit_cancellable(
        &self,
        danmaku: Danmaku,
        token: &CancellationToken,
    ) -> Result<()> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.shared.cancelled.fetch_add(1, Ordering::Relaxed);
                Err(DanmakuError::Cancelled)
            }
            result = self.submit(danmaku) => result,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.permits.is_closed()
    }
}
