//! Priority queue for pending fetches.
//!
//! Entries are ordered by priority (higher values first), then by enqueue
//! order (FIFO within the same priority). Unlike a binary heap, any entry can
//! be removed or re-prioritised by handle, which is what cancellation and
//! priority updates need.
//!
//! The queue is not thread-safe; the fetcher keeps it under its lock.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::request::FetchHandle;

/// Sort key: priority descending, then sequence ascending.
#[derive(Debug, Clone, Copy)]
struct QueueKey {
    priority: f64,
    sequence: u64,
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // BTreeMap iterates ascending, so the entry to pop first sorts lowest
        match other.priority.total_cmp(&self.priority) {
            Ordering::Equal => self.sequence.cmp(&other.sequence),
            other_ordering => other_ordering,
        }
    }
}

/// Pending entries keyed by handle.
#[derive(Debug)]
pub struct FetchQueue<T> {
    entries: BTreeMap<QueueKey, (FetchHandle, T)>,
    keys: HashMap<FetchHandle, QueueKey>,
    next_sequence: u64,
}

impl<T> FetchQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            keys: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Adds an entry. A handle that is already queued is replaced.
    pub fn push(&mut self, handle: FetchHandle, priority: f64, item: T) {
        self.remove(handle);
        let key = QueueKey {
            priority,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.entries.insert(key, (handle, item));
        self.keys.insert(handle, key);
    }

    /// Removes and returns the highest-priority entry.
    pub fn pop(&mut self) -> Option<(FetchHandle, T)> {
        let (_, (handle, item)) = self.entries.pop_first()?;
        self.keys.remove(&handle);
        Some((handle, item))
    }

    /// Removes a specific entry.
    pub fn remove(&mut self, handle: FetchHandle) -> Option<T> {
        let key = self.keys.remove(&handle)?;
        self.entries.remove(&key).map(|(_, item)| item)
    }

    /// Changes an entry's priority.
    ///
    /// The entry keeps its original enqueue order among equal priorities.
    /// Returns false if the handle is not queued.
    pub fn reprioritize(&mut self, handle: FetchHandle, priority: f64) -> bool {
        let Some(key) = self.keys.get(&handle).copied() else {
            return false;
        };
        let Some(entry) = self.entries.remove(&key) else {
            return false;
        };
        let new_key = QueueKey {
            priority,
            sequence: key.sequence,
        };
        self.entries.insert(new_key, entry);
        self.keys.insert(handle, new_key);
        true
    }

    pub fn contains(&self, handle: FetchHandle) -> bool {
        self.keys.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, highest priority first.
    pub fn drain(&mut self) -> Vec<(FetchHandle, T)> {
        self.keys.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

impl<T> Default for FetchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
