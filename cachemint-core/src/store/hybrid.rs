use std::sync::Arc;
use tracing::trace;

use super::remote::{flush_backend, RemoteNamespace};
use super::{capacity, Backend, Namespace, Store};
use crate::cache_entry::{now_stamp, CacheEntry};
use crate::client::KeyValueClient;
use crate::error::{CacheError, Result};
use crate::keys::KeyPattern;
use crate::lru::LruDict;

/// Local values kept consistent across processes through shared timestamps.
///
/// The external service stores only a stamp (microseconds since the epoch)
/// under each key; the value stays in this process. A local entry is served
/// only while its stamp equals the remote one:
///
/// | remote stamp | local entry          | outcome                              |
/// |--------------|----------------------|--------------------------------------|
/// | absent       | any                  | miss; `set` stamps now, writes both  |
/// | present      | absent               | miss; `set` adopts the remote stamp  |
/// | present      | stamp differs        | miss; `set` adopts the remote stamp  |
/// | present      | stamp matches        | hit                                  |
///
/// A value computed elsewhere is never trusted: a process that has not seen a
/// key computes it itself.
pub struct HybridStore<R> {
    local: LruDict<CacheEntry<R>>,
    remote: RemoteNamespace,
}

impl<R> HybridStore<R> {
    pub fn new(
        client: Arc<dyn KeyValueClient>,
        namespace: Namespace,
        limit: i64,
        expire: i64,
    ) -> Result<Self> {
        let local = match capacity(limit) {
            Some(_) => LruDict::new(limit)?,
            None => LruDict::unbounded(),
        };
        Ok(Self {
            local,
            remote: RemoteNamespace::new(client, namespace, limit, expire),
        })
    }

    pub fn namespace(&self) -> &Namespace {
        self.remote.namespace()
    }

    /// Number of values held in this process.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    fn remote_stamp(&self, key: &str) -> Result<Option<i64>> {
        match self.remote.client().get(key)? {
            Some(bytes) => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| CacheError::Backend(format!("invalid stamp for {}: {}", key, e)))?;
                let stamp = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| CacheError::Backend(format!("invalid stamp for {}: {}", key, e)))?;
                Ok(Some(stamp))
            }
            None => Ok(None),
        }
    }
}

impl<R> Store<R> for HybridStore<R>
where
    R: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Option<R>> {
        let Some(stamp) = self.remote_stamp(key)? else {
            return Ok(None);
        };
        match self.local.peek(key) {
            Some(entry) if entry.stamp == stamp => Ok(self.local.get(key).map(|e| e.value)),
            Some(_) => {
                trace!(key, "local entry is stale");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: R) -> Result<()> {
        let stamp = match self.remote_stamp(key)? {
            Some(stamp) => stamp,
            None => {
                let stamp = now_stamp();
                self.remote.write(key, stamp.to_string().into_bytes())?;
                stamp
            }
        };
        self.local.insert(key, CacheEntry::stamped(value, stamp));
        Ok(())
    }

    fn clear(&self, filter: Option<&KeyPattern>) -> Result<usize> {
        // the remote count covers every process; local copies are a subset
        let removed = self.remote.clear(filter)?;
        let _local = match filter {
            Some(pattern) => self.local.remove_matching(|key| pattern.is_match(key)),
            None => self.local.clear(),
        };
        Ok(removed)
    }

    fn flush(&self) -> Result<usize> {
        let removed = flush_backend(self.remote.client(), Backend::Hybrid)?;
        let _local = self.local.clear();
        Ok(removed)
    }

    fn backend(&self) -> Backend {
        Backend::Hybrid
    }
}
