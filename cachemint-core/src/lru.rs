//! Bounded recency-ordered map used as the local cache engine.
//!
//! Nodes live in a slab (`Vec`) and are chained into a circular doubly linked
//! list through their indices. Slot 0 is a sentinel root: the most recently used
//! node sits just before the root, the least recently used one just after it.
//! A `HashMap` from key to slot gives O(1) lookup, so `get`, `insert` and
//! eviction are all O(1).

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{CacheError, Result};

const ROOT: usize = 0;

struct Node<V> {
    key: Option<String>,
    value: Option<V>,
    prev: usize,
    next: usize,
}

impl<V> Node<V> {
    fn root() -> Self {
        Self {
            key: None,
            value: None,
            prev: ROOT,
            next: ROOT,
        }
    }
}

struct Links<V> {
    nodes: Vec<Node<V>>,
    map: HashMap<String, usize>,
    free: Vec<usize>,
}

impl<V> Links<V> {
    fn new() -> Self {
        Self {
            nodes: vec![Node::root()],
            map: HashMap::new(),
            free: Vec::new(),
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    /// Links `idx` just before the root, marking it most recently used.
    fn link_last(&mut self, idx: usize) {
        let last = self.nodes[ROOT].prev;
        self.nodes[last].next = idx;
        self.nodes[idx].prev = last;
        self.nodes[idx].next = ROOT;
        self.nodes[ROOT].prev = idx;
    }

    fn touch(&mut self, idx: usize) {
        self.unlink(idx);
        self.link_last(idx);
    }

    fn allocate(&mut self, key: String, value: V) -> usize {
        let node = Node {
            key: Some(key),
            value: Some(value),
            prev: ROOT,
            next: ROOT,
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<V> {
        self.unlink(idx);
        let node = &mut self.nodes[idx];
        node.key = None;
        node.prev = idx;
        node.next = idx;
        let value = node.value.take();
        self.free.push(idx);
        value
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.release(idx)
    }
}

/// Thread-safe LRU map with an optional capacity.
///
/// Every operation, including `get` (which reorders), takes the same mutex; the
/// lock is only held for the link and map bookkeeping.
///
/// # Examples
///
/// ```
/// use cachemint_core::LruDict;
///
/// let lru = LruDict::new(2).unwrap();
/// lru.insert("1", "one");
/// lru.insert("2", "two");
/// lru.insert("3", "three");
/// assert_eq!(lru.get("1"), None);
/// assert_eq!(lru.get("3"), Some("three"));
/// ```
pub struct LruDict<V> {
    max_size: Option<usize>,
    inner: Mutex<Links<V>>,
}

impl<V> LruDict<V> {
    /// Creates a store holding at most `max_size` entries.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidArgument`] when `max_size <= 0`.
    pub fn new(max_size: i64) -> Result<Self> {
        if max_size <= 0 {
            return Err(CacheError::InvalidArgument(format!(
                "expected max_size to be larger than 0, got {}",
                max_size
            )));
        }
        Ok(Self {
            max_size: Some(max_size as usize),
            inner: Mutex::new(Links::new()),
        })
    }

    /// Creates a store without a capacity bound (still recency-ordered).
    pub fn unbounded() -> Self {
        Self {
            max_size: None,
            inner: Mutex::new(Links::new()),
        }
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    /// Inserts or overwrites `key`, marking it most recently used.
    ///
    /// When the store is full and `key` is new, the least recently used slot is
    /// reused for the new entry. Returns the evicted key, if any.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<String> {
        let key = key.into();
        let mut links = self.inner.lock();

        let existing = links.map.get(&key).copied();
        if let Some(idx) = existing {
            links.nodes[idx].value = Some(value);
            links.touch(idx);
            return None;
        }

        let full = self
            .max_size
            .map_or(false, |max| links.map.len() >= max);
        if full {
            let oldest = links.nodes[ROOT].next;
            let old_key = links.nodes[oldest].key.take();
            if let Some(old) = &old_key {
                links.map.remove(old);
            }
            links.nodes[oldest].key = Some(key.clone());
            links.nodes[oldest].value = Some(value);
            links.touch(oldest);
            links.map.insert(key, oldest);
            old_key
        } else {
            let idx = links.allocate(key.clone(), value);
            links.link_last(idx);
            links.map.insert(key, idx);
            None
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.lock().remove(key)
    }

    /// Removes every entry whose key satisfies `pred`; returns how many were removed.
    pub fn remove_matching<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut links = self.inner.lock();
        let doomed: Vec<String> = links
            .map
            .keys()
            .filter(|k| pred(k.as_str()))
            .cloned()
            .collect();
        for key in &doomed {
            links.remove(key);
        }
        doomed.len()
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        let links = self.inner.lock();
        let mut keys = Vec::with_capacity(links.map.len());
        let mut idx = links.nodes[ROOT].next;
        while idx != ROOT {
            if let Some(key) = &links.nodes[idx].key {
                keys.push(key.clone());
            }
            idx = links.nodes[idx].next;
        }
        keys
    }

    /// Drops every entry and resets the list to the bare root. Returns how
    /// many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut links = self.inner.lock();
        let count = links.map.len();
        *links = Links::new();
        count
    }
}

impl<V: Clone> LruDict<V> {
    /// Returns a clone of the value and marks `key` most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut links = self.inner.lock();
        let idx = *links.map.get(key)?;
        links.touch(idx);
        links.nodes[idx].value.clone()
    }

    /// Returns a clone of the value without touching recency.
    pub fn peek(&self, key: &str) -> Option<V> {
        let links = self.inner.lock();
        let idx = *links.map.get(key)?;
        links.nodes[idx].value.clone()
    }

    /// Like [`LruDict::get`], but drops the entry instead when `stale` says so.
    pub fn get_unless<F>(&self, key: &str, stale: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool,
    {
        let mut links = self.inner.lock();
        let idx = *links.map.get(key)?;
        let is_stale = links.nodes[idx].value.as_ref().map_or(true, stale);
        if is_stale {
            links.remove(key);
            return None;
        }
        links.touch(idx);
        links.nodes[idx].value.clone()
    }
}
