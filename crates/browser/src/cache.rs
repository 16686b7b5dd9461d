//! Bounded recency-ordered snapshot store.
//!
//! Invariants:
//! - `len() <= capacity()` after every operation.
//! - `get` and `put` both make the key most recent; eviction removes the
//!   least recently touched key.
//! - Keys ignore the fragment, so `/a#x` and `/a` share an entry.
use crate::snapshot::Snapshot;
use std::collections::{HashMap, VecDeque};
use url::Url;

#[derive(Debug)]
pub struct SnapshotCache {
    capacity: usize,
    entries: HashMap<String, Snapshot>,
    /// Least recent first.
    order: VecDeque<String>,
}

pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

impl SnapshotCache {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.entries.contains_key(&cache_key(url))
    }

    pub fn get(&mut self, url: &Url) -> Option<&Snapshot> {
        let key = cache_key(url);
        if !self.entries.contains_key(&key) {
            return None;
        }
        self.touch(&key);
        self.entries.get(&key)
    }

    pub fn put(&mut self, url: &Url, snapshot: Snapshot) -> &Snapshot {
        let key = cache_key(url);
        self.touch(&key);
        self.entries.insert(key.clone(), snapshot);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            log::debug!(target: "browser.cache", "evicted {oldest}");
        }
        &self.entries[&key]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keys from least to most recently touched.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }
}
