// src/pipeline/queue.rs

//! Priority work queue shared by the coordinator and the workers.
//!
//! Items are served by `(band, insertion order)`: a lower band always goes
//! first and items within a band come out FIFO. Shutdown pills use the
//! lowest band so they overtake any remaining page work.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::models::{Band, PageJob, WorkItem};

#[derive(Debug)]
struct Queued {
    band: Band,
    seq: u64,
    item: WorkItem,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.band == other.band && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap is a max-heap; reverse so the smallest (band, seq) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.band, other.seq).cmp(&(self.band, self.seq))
    }
}

#[derive(Debug, Default)]
struct State {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

/// Thread-safe blocking priority queue.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<State>,
    available: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, band: Band, item: WorkItem) {
        {
            let mut state = self.state();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Queued { band, seq, item });
        }
        self.available.notify_one();
    }

    /// Enqueue a page in the given band.
    pub fn push_page(&self, band: Band, job: PageJob) {
        self.push(band, WorkItem::Page(job));
    }

    /// Enqueue one shutdown pill.
    pub fn push_stop(&self) {
        self.push(Band::Shutdown, WorkItem::Stop);
    }

    /// Take the most urgent item without waiting.
    pub fn try_pop(&self) -> Option<WorkItem> {
        self.state().heap.pop().map(|queued| queued.item)
    }

    /// Take the most urgent item, waiting until one is available.
    pub async fn pop(&self) -> WorkItem {
        loop {
            // Register as a waiter before checking, so a push between the
            // check and the await still wakes this task.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return item;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.state().heap.len()
    }

    /// True when every enqueued item has been claimed.
    pub fn is_empty(&self) -> bool {
        self.state().heap.is_empty()
    }
}
