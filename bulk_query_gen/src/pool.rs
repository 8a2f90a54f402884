//! A free list of blank queries, shared between generation workers.

use crate::query::Query;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how well a [`QueryPool`] is doing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Queries created because the pool was empty
    pub allocated: u64,
    /// Queries handed out from the free list
    pub reused: u64,
    /// Queries currently waiting in the free list
    pub idle: usize,
}

/// A thread safe pool of reusable queries of one dialect.
///
/// [`get`](Self::get) moves a query out of the pool and [`put`](Self::put) moves it back,
/// so a query only ever has one owner.
#[derive(Debug)]
pub struct QueryPool<Q> {
    free: Mutex<Vec<Q>>,
    max_idle: Option<usize>,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl<Q: Query> Default for QueryPool<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: Query> QueryPool<Q> {
    /// An empty pool that keeps every query it is given back
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle: None,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// An empty pool that keeps at most `max_idle` released queries; any extra are dropped.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            max_idle: Some(max_idle),
            ..Self::new()
        }
    }

    /// Take a blank query, allocating one if the pool is empty. Never blocks on anything but
    /// the free list lock.
    pub fn get(&self) -> Q {
        let reused = self.free.lock().pop();
        match reused {
            Some(q) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                q
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Q::default()
            }
        }
    }

    /// Hand a query back. Its contents are blanked before anyone else can see it.
    pub fn put(&self, mut q: Q) {
        q.reset();

        let rejected = {
            let mut free = self.free.lock();
            if self.max_idle.map_or(true, |max| free.len() < max) {
                free.push(q);
                None
            } else {
                Some(q)
            }
        };
        // dropped outside of the lock
        drop(rejected);
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            idle: self.free.lock().len(),
        }
    }
}
