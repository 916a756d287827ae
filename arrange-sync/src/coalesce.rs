//! Keyed buffer of pending outbound partial updates.
//!
//! Repeated enqueues for one key merge shallowly into a single entry, so the
//! queue never holds more entries than distinct keys touched since the last
//! drain, no matter how many edits arrive.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use arrange_types::{merge_patch, Patch};

#[derive(Debug)]
pub struct CoalescingQueue<K> {
    entries: HashMap<K, Patch>,
    /// First-touch order, for deterministic emission.
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone> Default for CoalescingQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> CoalescingQueue<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, key: K, partial: Patch) {
        match self.entries.entry(key) {
            Entry::Occupied(mut e) => merge_patch(e.get_mut(), partial),
            Entry::Vacant(e) => {
                self.order.push(e.key().clone());
                e.insert(partial);
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&Patch> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&mut self, key: &K) -> Option<Patch> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Take the whole window, leaving the queue empty. Entries that merged to
    /// an empty object are dropped here; they carry nothing to send.
    pub fn take(&mut self) -> Vec<(K, Patch)> {
        let mut entries = std::mem::take(&mut self.entries);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|key| {
                let patch = entries.remove(&key)?;
                (!patch.is_empty()).then_some((key, patch))
            })
            .collect()
    }
}
