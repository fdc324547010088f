//! Raw cache storage policies
//!
//! Storage only keeps entries; staleness and versioning are decided by the
//! resolver.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use super::{CacheEntry, CachedOutcome, LookupKey};
use crate::template::Template;

/// A synchronized key to entry store.
pub trait CacheStorage: Send + Sync + fmt::Debug {
    fn get(&self, key: &LookupKey) -> Option<Arc<CacheEntry>>;
    fn put(&self, key: LookupKey, entry: Arc<CacheEntry>);
    fn remove(&self, key: &LookupKey) -> Option<Arc<CacheEntry>>;
    fn clear(&self);
    /// Keep only the entries whose key satisfies `keep`.
    fn retain(&self, keep: &dyn Fn(&LookupKey) -> bool);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded storage.
#[derive(Debug, Default)]
pub struct StrongCacheStorage {
    entries: Mutex<HashMap<LookupKey, Arc<CacheEntry>>>,
}

impl StrongCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for StrongCacheStorage {
    fn get(&self, key: &LookupKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn put(&self, key: LookupKey, entry: Arc<CacheEntry>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
    }

    fn remove(&self, key: &LookupKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }

    fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn retain(&self, keep: &dyn Fn(&LookupKey) -> bool) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| keep(key));
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Bounded storage that evicts the least recently used entry.
#[derive(Debug)]
pub struct MruCacheStorage {
    capacity: usize,
    // oldest first
    entries: Mutex<IndexMap<LookupKey, Arc<CacheEntry>>>,
}

impl MruCacheStorage {
    /// A capacity of 0 stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl CacheStorage for MruCacheStorage {
    fn get(&self, key: &LookupKey) -> Option<Arc<CacheEntry>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let index = entries.get_index_of(key)?;
        let last = entries.len() - 1;
        entries.move_index(index, last);
        entries.get_index(last).map(|(_, entry)| Arc::clone(entry))
    }

    fn put(&self, key: LookupKey, entry: Arc<CacheEntry>) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.shift_remove(&key);
        entries.insert(key, entry);
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    fn remove(&self, key: &LookupKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(key)
    }

    fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn retain(&self, keep: &dyn Fn(&LookupKey) -> bool) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| keep(key));
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Keeps the `strong_capacity` most recently used entries strongly. Older
/// found templates are only held through `Weak` and disappear once no caller
/// holds them; older negative entries are dropped.
#[derive(Debug)]
pub struct SoftCacheStorage {
    strong_capacity: usize,
    inner: Mutex<SoftEntries>,
}

#[derive(Debug, Default)]
struct SoftEntries {
    // least recently used first
    entries: IndexMap<LookupKey, SoftEntry>,
    strong: usize,
}

#[derive(Debug)]
enum SoftEntry {
    Strong(Arc<CacheEntry>),
    Weak {
        template: Weak<Template>,
        last_checked: DateTime<Utc>,
    },
}

impl SoftEntry {
    fn upgrade(&self) -> Option<Arc<CacheEntry>> {
        match self {
            SoftEntry::Strong(entry) => Some(Arc::clone(entry)),
            SoftEntry::Weak {
                template,
                last_checked,
            } => template.upgrade().map(|template| {
                Arc::new(CacheEntry {
                    outcome: CachedOutcome::Found(template),
                    last_checked: *last_checked,
                })
            }),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            SoftEntry::Strong(_) => true,
            SoftEntry::Weak { template, .. } => template.strong_count() > 0,
        }
    }

    fn is_strong(&self) -> bool {
        matches!(self, SoftEntry::Strong(_))
    }
}

impl SoftEntries {
    fn remove_index(&mut self, index: usize) -> Option<SoftEntry> {
        let (_, entry) = self.entries.shift_remove_index(index)?;
        if entry.is_strong() {
            self.strong -= 1;
        }
        Some(entry)
    }

    /// Demote the oldest strong entries until at most `capacity` remain.
    fn demote_overflow(&mut self, capacity: usize) {
        let mut index = 0;
        while self.strong > capacity && index < self.entries.len() {
            let weak = match self.entries.get_index(index) {
                Some((_, SoftEntry::Strong(entry))) => match &entry.outcome {
                    CachedOutcome::Found(template) => Some(SoftEntry::Weak {
                        template: Arc::downgrade(template),
                        last_checked: entry.last_checked,
                    }),
                    CachedOutcome::Missing { .. } => None,
                },
                _ => {
                    index += 1;
                    continue;
                }
            };
            match weak {
                Some(weak) => {
                    if let Some((_, slot)) = self.entries.get_index_mut(index) {
                        *slot = weak;
                    }
                    self.strong -= 1;
                    index += 1;
                }
                None => {
                    self.remove_index(index);
                }
            }
        }
    }

    fn recount(&mut self) {
        self.strong = self.entries.values().filter(|e| e.is_strong()).count();
    }
}

impl SoftCacheStorage {
    pub fn new(strong_capacity: usize) -> Self {
        Self {
            strong_capacity,
            inner: Mutex::new(SoftEntries::default()),
        }
    }

    pub fn strong_capacity(&self) -> usize {
        self.strong_capacity
    }
}

impl CacheStorage for SoftCacheStorage {
    fn get(&self, key: &LookupKey) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let index = inner.entries.get_index_of(key)?;
        let entry = match inner.entries.get_index(index).and_then(|(_, e)| e.upgrade()) {
            Some(entry) => entry,
            None => {
                inner.remove_index(index);
                return None;
            }
        };

        let was_strong = inner.remove_index(index).is_some_and(|e| e.is_strong());
        inner
            .entries
            .insert(key.clone(), SoftEntry::Strong(Arc::clone(&entry)));
        inner.strong += 1;
        if !was_strong {
            inner.demote_overflow(self.strong_capacity);
        }
        Some(entry)
    }

    fn put(&self, key: LookupKey, entry: Arc<CacheEntry>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = inner.entries.get_index_of(&key) {
            inner.remove_index(index);
        }
        inner.entries.insert(key, SoftEntry::Strong(entry));
        inner.strong += 1;
        inner.demote_overflow(self.strong_capacity);
    }

    fn remove(&self, key: &LookupKey) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let index = inner.entries.get_index_of(key)?;
        inner.remove_index(index).and_then(|entry| entry.upgrade())
    }

    fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.strong = 0;
    }

    fn retain(&self, keep: &dyn Fn(&LookupKey) -> bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.retain(|key, _| keep(key));
        inner.recount();
    }

    /// Live entries only; collected ones are dropped first.
    fn len(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.retain(|_, entry| entry.is_live());
        inner.entries.len()
    }
}

/// Stores nothing; every lookup runs the loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCacheStorage;

impl CacheStorage for NullCacheStorage {
    fn get(&self, _key: &LookupKey) -> Option<Arc<CacheEntry>> {
        None
    }

    fn put(&self, _key: LookupKey, _entry: Arc<CacheEntry>) {}

    fn remove(&self, _key: &LookupKey) -> Option<Arc<CacheEntry>> {
        None
    }

    fn clear(&self) {}

    fn retain(&self, _keep: &dyn Fn(&LookupKey) -> bool) {}

    fn len(&self) -> usize {
        0
    }
}
