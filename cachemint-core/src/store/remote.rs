use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{capacity, ttl, Backend, Namespace, Store};
use crate::client::{Batch, KeyValueClient};
use crate::codec::Codec;
use crate::error::Result;
use crate::keys::KeyPattern;

/// Namespace bookkeeping in the external service, shared by the remote and
/// hybrid stores.
///
/// The namespace set lists every key written for the instance. It may still
/// name keys whose TTL already ran out; a full clear reconciles it.
pub(crate) struct RemoteNamespace {
    client: Arc<dyn KeyValueClient>,
    namespace: Namespace,
    limit: Option<usize>,
    expire: Option<u64>,
}

impl RemoteNamespace {
    pub(crate) fn new(
        client: Arc<dyn KeyValueClient>,
        namespace: Namespace,
        limit: i64,
        expire: i64,
    ) -> Self {
        Self {
            client,
            namespace,
            limit: capacity(limit),
            expire: ttl(expire),
        }
    }

    pub(crate) fn client(&self) -> &dyn KeyValueClient {
        self.client.as_ref()
    }

    pub(crate) fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Registers the namespace, pops members until there is room for one more,
    /// then writes the value and its membership in a single batch.
    pub(crate) fn write(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        let ns = self.namespace.as_str();
        self.client
            .sadd(&self.namespace.global_set(), &[ns.to_string()])?;

        let mut evicted = Vec::new();
        if let Some(limit) = self.limit {
            while self.client.scard(ns)? >= limit {
                match self.client.spop(ns)? {
                    Some(member) => evicted.push(member),
                    None => break,
                }
            }
        }
        if !evicted.is_empty() {
            trace!(namespace = ns, evicted = evicted.len(), "evicting remote keys");
        }

        let mut batch = Batch::new();
        batch
            .delete(evicted)
            .put(key, payload, self.expire)
            .sadd(ns, vec![key.to_string()]);
        self.client.execute(batch)
    }

    /// Full clear drops every member, the namespace set and its global
    /// registration. A filtered clear deletes matching members only and leaves
    /// the namespace set to the next full clear.
    pub(crate) fn clear(&self, filter: Option<&KeyPattern>) -> Result<usize> {
        let ns = self.namespace.as_str();
        let members = self.client.smembers(ns)?;
        let removed = match filter {
            Some(pattern) => {
                let doomed: Vec<String> = members
                    .into_iter()
                    .filter(|member| pattern.is_match(member))
                    .collect();
                let count = doomed.len();
                if count > 0 {
                    self.client.delete(&doomed)?;
                }
                count
            }
            None => {
                let count = members.len();
                let mut batch = Batch::new();
                batch
                    .delete(members)
                    .delete(vec![ns.to_string()])
                    .srem(self.namespace.global_set(), vec![ns.to_string()]);
                self.client.execute(batch)?;
                count
            }
        };
        debug!(namespace = ns, removed, filtered = filter.is_some(), "cleared remote namespace");
        Ok(removed)
    }
}

impl Drop for RemoteNamespace {
    fn drop(&mut self) {
        let ns = self.namespace.as_str().to_string();
        if let Err(e) = self.client.srem(&self.namespace.global_set(), &[ns]) {
            warn!(namespace = %self.namespace, error = %e, "failed to deregister namespace");
        }
    }
}

/// Store whose values live in the external key-value service.
///
/// Lookups never refresh recency; the service's TTL governs lifetime. Over the
/// limit, arbitrary members are popped, so eviction is approximate.
pub struct RemoteStore<R, C> {
    remote: RemoteNamespace,
    codec: C,
    _marker: PhantomData<fn() -> R>,
}

impl<R, C> RemoteStore<R, C>
where
    C: Codec<R>,
{
    pub fn new(
        client: Arc<dyn KeyValueClient>,
        namespace: Namespace,
        limit: i64,
        expire: i64,
        codec: C,
    ) -> Self {
        Self {
            remote: RemoteNamespace::new(client, namespace, limit, expire),
            codec,
            _marker: PhantomData,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        self.remote.namespace()
    }
}

/// Namespaces registered for `backend` in the service.
pub fn all_namespaces(client: &dyn KeyValueClient, backend: Backend) -> Result<Vec<String>> {
    client.smembers(&backend.global_set())
}

/// Deletes every key of every namespace registered for `backend`, plus the
/// namespace sets themselves. Returns how many keys were removed.
pub fn flush_backend(client: &dyn KeyValueClient, backend: Backend) -> Result<usize> {
    let mut count = 0;
    let mut batch = Batch::new();
    for namespace in all_namespaces(client, backend)? {
        let members = client.smembers(&namespace)?;
        count += members.len();
        batch.delete(members).delete(vec![namespace]);
    }
    if !batch.is_empty() {
        client.execute(batch)?;
    }
    debug!(backend = %backend, removed = count, "flushed backend");
    Ok(count)
}

impl<R, C> Store<R> for RemoteStore<R, C>
where
    C: Codec<R>,
{
    fn get(&self, key: &str) -> Result<Option<R>> {
        match self.remote.client().get(key)? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: R) -> Result<()> {
        let payload = self.codec.encode(&value)?;
        self.remote.write(key, payload)
    }

    fn clear(&self, filter: Option<&KeyPattern>) -> Result<usize> {
        self.remote.clear(filter)
    }

    fn flush(&self) -> Result<usize> {
        flush_backend(self.remote.client(), Backend::Remote)
    }

    fn backend(&self) -> Backend {
        Backend::Remote
    }
}
