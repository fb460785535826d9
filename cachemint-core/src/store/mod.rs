//! Storage backends behind a cache instance.
//!
//! Every backend implements [`Store`]: a lookup that reports a miss as
//! `Ok(None)`, an unconditional write, a full or pattern-filtered clear and a
//! flush. Keys handed to a store are already namespaced (see
//! [`Namespace::full_key`]).

use std::fmt;
use std::str::FromStr;

use crate::error::{CacheError, Result};
use crate::keys::KeyPattern;

mod hybrid;
mod memory;
mod remote;

pub use hybrid::HybridStore;
pub use memory::MemoryStore;
pub use remote::{all_namespaces, flush_backend, RemoteStore};

/// Closed set of store variants, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// In-process LRU only.
    #[default]
    Memory,
    /// Values live in the external key-value service.
    Remote,
    /// Values live in-process; the external service holds shared timestamps.
    Hybrid,
}

impl Backend {
    /// Name used as the first component of every namespace of this backend.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "MemoryCache",
            Backend::Remote => "RemoteCache",
            Backend::Hybrid => "HybridCache",
        }
    }

    /// Set holding every namespace this backend ever wrote to.
    pub fn global_set(&self) -> String {
        format!("{}:all-keys", self.name())
    }

    /// Returns `true` for the variants that need a key-value client.
    pub fn is_distributed(&self) -> bool {
        !matches!(self, Backend::Memory)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "remote" => Ok(Backend::Remote),
            "hybrid" => Ok(Backend::Hybrid),
            other => Err(CacheError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Identifies the keys of one cache instance.
///
/// ```
/// use cachemint_core::{Backend, Namespace};
///
/// let ns = Namespace::new(Backend::Remote, "app-", "billing::invoice_total");
/// assert_eq!(ns.as_str(), "RemoteCache:app-billing::invoice_total-keys");
/// assert_eq!(ns.full_key("a1"), "RemoteCache:app-billing::invoice_total-keys:a1");
/// assert_eq!(ns.global_set(), "RemoteCache:all-keys");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    backend: Backend,
    name: String,
}

impl Namespace {
    pub fn new(backend: Backend, prefix: &str, qualname: &str) -> Self {
        Self {
            backend,
            name: format!("{}:{}{}-keys", backend.name(), prefix, qualname),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn global_set(&self) -> String {
        self.backend.global_set()
    }

    /// Literal prefix shared by every key of this namespace.
    pub fn key_prefix(&self) -> String {
        format!("{}:", self.name)
    }

    pub fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.name, key)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Storage behind one cache instance.
pub trait Store<R>: Send + Sync {
    /// Looks up `key`; a miss, including an expired or stale entry, is `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<R>>;

    /// Stores `value` under `key`, evicting as the limit requires.
    fn set(&self, key: &str, value: R) -> Result<()>;

    /// Removes every key of the instance, or only those matching `filter`.
    /// Returns how many keys were removed.
    fn clear(&self, filter: Option<&KeyPattern>) -> Result<usize>;

    /// Removes everything this store's backend manages that the store can reach.
    fn flush(&self) -> Result<usize>;

    fn backend(&self) -> Backend;
}

/// Converts a validated `limit` into a capacity; `-1` means unbounded.
pub(crate) fn capacity(limit: i64) -> Option<usize> {
    usize::try_from(limit).ok().filter(|&n| n > 0)
}

/// Converts a validated `expire` into a TTL in seconds; `-1` means no expiry.
pub(crate) fn ttl(expire: i64) -> Option<u64> {
    u64::try_from(expire).ok().filter(|&n| n > 0)
}
