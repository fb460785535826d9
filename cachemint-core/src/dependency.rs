//! Cascading invalidation between cache instances.
//!
//! A cache declares that it depends on another through a [`CacheDependency`].
//! Clearing the depended-upon cache then clears every dependent, and their
//! dependents in turn. The graph only holds weak references, so it never keeps
//! a dropped instance alive; dead edges are skipped and pruned lazily.
//!
//! # Examples
//!
//! ```
//! use cachemint_core::{
//!     memoize, CacheConfig, CacheDependency, CacheOptions, CallArgs, CallSignature,
//!     DependencyGraph,
//! };
//! use std::sync::Arc;
//!
//! let graph = Arc::new(DependencyGraph::new());
//! let config = CacheConfig::new();
//! let sig = CallSignature::builder().param("a").build().unwrap();
//!
//! let base = memoize(
//!     &config,
//!     CacheOptions::new("base").graph(graph.clone()),
//!     sig.clone(),
//!     |call: &CallArgs| call.args[0].as_i64().unwrap_or(0),
//! )
//! .unwrap();
//! let base_cache = base.cache().unwrap();
//!
//! let doubled = memoize(
//!     &config,
//!     CacheOptions::new("doubled")
//!         .graph(graph.clone())
//!         .depends_on(CacheDependency::on(base_cache)),
//!     sig,
//!     |call: &CallArgs| call.args[0].as_i64().unwrap_or(0) * 2,
//! )
//! .unwrap();
//!
//! base.call(CallArgs::new().arg(1)).unwrap();
//! doubled.call(CallArgs::new().arg(1)).unwrap();
//!
//! // one entry from `base`, one cascaded from `doubled`
//! assert_eq!(base.cache_clear().unwrap().unwrap(), 2);
//! ```

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::error::Result;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: Lazy<Arc<DependencyGraph>> = Lazy::new(|| Arc::new(DependencyGraph::new()));

/// Identity token of a cache instance, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(u64);

impl CacheId {
    pub(crate) fn next() -> Self {
        CacheId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache#{}", self.0)
    }
}

/// Something the graph can clear when a cache it depends on is cleared.
pub trait Invalidate: Send + Sync {
    fn cache_id(&self) -> CacheId;

    /// Clears this cache only, without cascading; returns the removed count.
    fn invalidate(&self) -> Result<usize>;
}

impl<T: Invalidate + ?Sized> Invalidate for Arc<T> {
    fn cache_id(&self) -> CacheId {
        (**self).cache_id()
    }

    fn invalidate(&self) -> Result<usize> {
        (**self).invalidate()
    }
}

/// Declares that the cache being built depends on another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDependency {
    ident: CacheId,
}

impl CacheDependency {
    /// Depends on `cache`: clearing it also clears the dependent.
    pub fn on<T: Invalidate + ?Sized>(cache: &T) -> Self {
        Self::on_id(cache.cache_id())
    }

    pub fn on_id(ident: CacheId) -> Self {
        Self { ident }
    }

    pub fn ident(&self) -> CacheId {
        self.ident
    }
}

/// Maps a cache to the caches that must be cleared along with it.
#[derive(Default)]
pub struct DependencyGraph {
    edges: DashMap<CacheId, Vec<Weak<dyn Invalidate>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide graph used when no other graph is supplied.
    pub fn global() -> Arc<DependencyGraph> {
        GLOBAL.clone()
    }

    /// Records that `dependent` must be cleared whenever `ident` is.
    pub fn register(&self, ident: CacheId, dependent: Weak<dyn Invalidate>) {
        self.edges.entry(ident).or_default().push(dependent);
    }

    /// Live dependents of `ident`.
    pub fn dependents(&self, ident: CacheId) -> Vec<Arc<dyn Invalidate>> {
        self.edges
            .get(&ident)
            .map(|deps| deps.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Clears every cache reachable from `ident`, each at most once, and
    /// returns the total removed. `ident` itself is not cleared.
    pub fn cascade(&self, ident: CacheId) -> Result<usize> {
        let mut visited = HashSet::from([ident]);
        let mut queue = VecDeque::from([ident]);
        let mut total = 0;
        let mut dead = false;

        while let Some(current) = queue.pop_front() {
            let deps = self.dependents(current);
            dead |= self
                .edges
                .get(&current)
                .map_or(false, |all| all.len() != deps.len());
            for dep in deps {
                let id = dep.cache_id();
                if visited.insert(id) {
                    total += dep.invalidate()?;
                    queue.push_back(id);
                }
            }
        }

        if dead {
            self.prune();
        }
        if visited.len() > 1 {
            debug!(source = %ident, cleared = visited.len() - 1, removed = total, "cascaded invalidation");
        }
        Ok(total)
    }

    /// Drops dead references and empty records; returns how many references were dropped.
    pub fn prune(&self) -> usize {
        let mut dropped = 0;
        self.edges.retain(|_, deps| {
            let before = deps.len();
            deps.retain(|d| d.strong_count() > 0);
            dropped += before - deps.len();
            !deps.is_empty()
        });
        dropped
    }

    /// Forgets every dependent of `ident`.
    pub fn forget(&self, ident: CacheId) {
        self.edges.remove(&ident);
    }

    /// Number of caches that have at least one recorded dependent.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("records", &self.edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        id: CacheId,
        entries: usize,
        cleared: AtomicUsize,
    }

    impl Counter {
        fn new(entries: usize) -> Arc<Self> {
            Arc::new(Self {
                id: CacheId::next(),
                entries,
                cleared: AtomicUsize::new(0),
            })
        }
    }

    impl Invalidate for Counter {
        fn cache_id(&self) -> CacheId {
            self.id
        }

        fn invalidate(&self) -> Result<usize> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries)
        }
    }

    fn weak(c: &Arc<Counter>) -> Weak<dyn Invalidate> {
        let c: Arc<dyn Invalidate> = c.clone();
        Arc::downgrade(&c)
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(CacheId::next(), CacheId::next());
    }

    #[test]
    fn test_cascade_counts_dependents() {
        let graph = DependencyGraph::new();
        let a = Counter::new(3);
        let b = Counter::new(2);
        let c = Counter::new(1);
        graph.register(a.id, weak(&b));
        graph.register(a.id, weak(&c));

        assert_eq!(graph.cascade(a.id).unwrap(), 3);
        assert_eq!(a.cleared.load(Ordering::SeqCst), 0);
        assert_eq!(b.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(graph.dependents(a.id).len(), 2);
    }

    #[test]
    fn test_cascade_is_transitive_and_stops_on_cycles() {
        let graph = DependencyGraph::new();
        let a = Counter::new(1);
        let b = Counter::new(10);
        let c = Counter::new(100);
        graph.register(a.id, weak(&b));
        graph.register(b.id, weak(&c));
        graph.register(c.id, weak(&a));
        graph.register(c.id, weak(&b));

        // a is the source; it gets reached again through c but is never cleared twice
        assert_eq!(graph.cascade(a.id).unwrap(), 110);
        assert_eq!(b.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(c.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(a.cleared.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_dependents_are_skipped_and_pruned() {
        let graph = DependencyGraph::new();
        let a = Counter::new(1);
        let b = Counter::new(5);
        graph.register(a.id, weak(&b));
        {
            let c = Counter::new(7);
            graph.register(a.id, weak(&c));
        }
        assert_eq!(graph.dependents(a.id).len(), 1);
        assert_eq!(graph.cascade(a.id).unwrap(), 5);
        assert_eq!(graph.prune(), 0);

        drop(b);
        assert_eq!(graph.prune(), 1);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_forget() {
        let graph = DependencyGraph::new();
        let a = Counter::new(1);
        let b = Counter::new(1);
        graph.register(a.id, weak(&b));
        assert_eq!(graph.len(), 1);
        graph.forget(a.id);
        assert_eq!(graph.cascade(a.id).unwrap(), 0);
    }

    #[test]
    fn test_dependency_captures_ident() {
        let a = Counter::new(1);
        let dep = CacheDependency::on(a.as_ref());
        assert_eq!(dep.ident(), a.id);
    }
}
