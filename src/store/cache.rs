use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Bounded address -> history id cache shared by all ingestion sessions so a
/// reingest does not re-resolve accounts a previous session already saw.
///
/// Eviction is insertion ordered; a hit does not refresh an entry.
#[derive(Debug)]
pub struct AccountCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, i64>,
    order: VecDeque<String>,
}

impl AccountCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, address: &str) -> Option<i64> {
        self.lock().entries.get(address).copied()
    }

    pub fn insert(&self, address: impl Into<String>, id: i64) {
        let address = address.into();
        let mut inner = self.lock();
        if inner.entries.insert(address.clone(), id).is_some() {
            return;
        }
        inner.order.push_back(address);
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
