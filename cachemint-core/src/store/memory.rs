use tracing::debug;

use super::{capacity, ttl, Backend, Namespace, Store};
use crate::cache_entry::CacheEntry;
use crate::error::Result;
use crate::keys::KeyPattern;
use crate::lru::LruDict;

/// Process-local store: an [`LruDict`] of [`CacheEntry`] with lazy TTL.
///
/// # Examples
///
/// ```
/// use cachemint_core::{Backend, MemoryStore, Namespace, Store};
///
/// let store = MemoryStore::new(Namespace::new(Backend::Memory, "", "f"), 2, -1).unwrap();
/// store.set("a", 1).unwrap();
/// assert_eq!(store.get("a").unwrap(), Some(1));
/// assert_eq!(store.get("b").unwrap(), None);
/// ```
pub struct MemoryStore<R> {
    namespace: Namespace,
    entries: LruDict<CacheEntry<R>>,
    expire: Option<u64>,
}

impl<R> MemoryStore<R> {
    /// `limit == -1` keeps every entry; `expire == -1` never expires.
    pub fn new(namespace: Namespace, limit: i64, expire: i64) -> Result<Self> {
        let entries = match capacity(limit) {
            Some(_) => LruDict::new(limit)?,
            None => LruDict::unbounded(),
        };
        Ok(Self {
            namespace,
            entries,
            expire: ttl(expire),
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<R> Store<R> for MemoryStore<R>
where
    R: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Option<R>> {
        let expire = self.expire;
        Ok(self
            .entries
            .get_unless(key, |entry| entry.is_expired(expire))
            .map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: R) -> Result<()> {
        self.entries.insert(key, CacheEntry::new(value));
        Ok(())
    }

    fn clear(&self, filter: Option<&KeyPattern>) -> Result<usize> {
        let removed = match filter {
            Some(pattern) => self.entries.remove_matching(|key| pattern.is_match(key)),
            None => self.entries.clear(),
        };
        debug!(namespace = %self.namespace, removed, "cleared memory store");
        Ok(removed)
    }

    fn flush(&self) -> Result<usize> {
        self.clear(None)
    }

    fn backend(&self) -> Backend {
        Backend::Memory
    }
}
