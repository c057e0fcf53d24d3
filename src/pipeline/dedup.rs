//! Bounded record of handled post ids.
//!
//! Membership is a `HashSet` lookup; insertion order lives in a `VecDeque`
//! so the oldest recorded id is always the one evicted.

use std::collections::{HashSet, VecDeque};

/// Default number of post ids remembered.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Insertion-ordered set of post ids with FIFO eviction.
#[derive(Debug, Clone)]
pub struct DedupStore {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl DedupStore {
    /// Create a store that remembers at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            members: HashSet::with_capacity(capacity + 1),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Record `id` as handled, evicting the oldest ids while over capacity.
    ///
    /// Re-recording a present id is a no-op and does not refresh its position.
    /// Returns the evicted ids.
    pub fn record(&mut self, id: &str) -> Vec<String> {
        if !self.members.insert(id.to_string()) {
            return Vec::new();
        }
        self.order.push_back(id.to_string());

        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
                evicted.push(oldest);
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids in recording order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
