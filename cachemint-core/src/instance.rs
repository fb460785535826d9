//! Cache instances and the memoizing wrapper around a computation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use crate::codec::{JsonCodec, MsgPackCodec, ValueFormat};
use crate::config::CacheConfig;
use crate::dependency::{CacheDependency, CacheId, DependencyGraph, Invalidate};
use crate::error::{CacheError, Result};
use crate::keys::{GeneratedKey, KeyCodec, KeyMode, KeyPattern};
use crate::signature::CallSignature;
#[cfg(feature = "stats")]
use crate::stats::CacheStats;
use crate::store::{Backend, HybridStore, MemoryStore, Namespace, RemoteStore, Store};
use crate::CallArgs;

/// Per-instance settings; unset values fall back to the [`CacheConfig`].
///
/// ```
/// use cachemint_core::{Backend, CacheOptions};
///
/// let options = CacheOptions::new("reports::monthly")
///     .limit(100)
///     .expire(-1)
///     .strict(true)
///     .backend(Backend::Memory);
/// assert_eq!(options.limit, Some(100));
/// ```
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Qualified name of the computation; part of the namespace.
    pub name: String,
    pub limit: Option<i64>,
    pub expire: Option<i64>,
    /// Strict keys bind arguments to the signature and allow partial clears.
    pub strict: bool,
    /// Skips the receiver (first positional argument) when building keys.
    pub is_method: bool,
    pub backend: Option<Backend>,
    /// Value serialization of the remote backend.
    pub format: Option<ValueFormat>,
    pub dependencies: Vec<CacheDependency>,
    pub graph: Option<Arc<DependencyGraph>>,
}

impl CacheOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: None,
            expire: None,
            strict: false,
            is_method: false,
            backend: None,
            format: None,
            dependencies: Vec::new(),
            graph: None,
        }
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn expire(mut self, expire: i64) -> Self {
        self.expire = Some(expire);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn method(mut self, is_method: bool) -> Self {
        self.is_method = is_method;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn format(mut self, format: ValueFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Clears the new cache whenever the cache behind `dependency` is cleared.
    pub fn depends_on(mut self, dependency: CacheDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Registers dependencies in `graph` instead of the global one.
    pub fn graph(mut self, graph: Arc<DependencyGraph>) -> Self {
        self.graph = Some(graph);
        self
    }
}

fn check_bound(what: &str, value: i64) -> Result<()> {
    if value < -1 {
        return Err(CacheError::Config(format!(
            "expected {} to be larger than or equal to -1, got {}",
            what, value
        )));
    }
    Ok(())
}

/// A cache bound to one computation: key codec, store and dependency edges.
///
/// Lookups go through [`get_or_compute`](Self::get_or_compute): the call is
/// turned into a namespaced key, the store is asked for it, and on a miss the
/// computation runs with the normalized arguments and its result is stored.
/// No lock is held while the computation runs, so concurrent misses on the
/// same key may each compute the value.
///
/// Clearing, full or by pattern, cascades to every cache registered as
/// dependent on this one.
///
/// # Examples
///
/// ```
/// use cachemint_core::{CacheConfig, CacheInstance, CacheOptions, CallArgs, CallSignature};
///
/// let sig = CallSignature::builder().param("a").param_with_default("b", 2).build().unwrap();
/// let cache = CacheInstance::<i64>::create(
///     &CacheConfig::new(),
///     CacheOptions::new("add").strict(true),
///     sig,
/// )
/// .unwrap()
/// .unwrap();
///
/// let add = |call: &CallArgs| {
///     let a = call.get(0, "a").and_then(|v| v.as_i64()).unwrap_or(0);
///     let b = call.get(1, "b").and_then(|v| v.as_i64()).unwrap_or(0);
///     a + b
/// };
/// assert_eq!(cache.get_or_compute(&CallArgs::new().arg(1), add).unwrap(), 3);
/// // same canonical key, served from the cache
/// assert_eq!(cache.get_or_compute(&CallArgs::new().kwarg("a", 1), |_| 0).unwrap(), 3);
/// ```
pub struct CacheInstance<R> {
    id: CacheId,
    name: String,
    namespace: Namespace,
    codec: KeyCodec,
    store: Box<dyn Store<R>>,
    limit: i64,
    expire: i64,
    graph: Arc<DependencyGraph>,
    #[cfg(feature = "stats")]
    stats: CacheStats,
}

impl<R> CacheInstance<R>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Builds the instance `options` describe, with the store selected by the
    /// resolved backend.
    ///
    /// Returns `Ok(None)` when the resolved `limit` or `expire` is 0: caching
    /// is disabled and no instance exists.
    ///
    /// # Errors
    ///
    /// [`CacheError::Config`] when `limit` or `expire` is below -1, or when a
    /// distributed backend has no client configured.
    pub fn create(
        config: &CacheConfig,
        options: CacheOptions,
        signature: CallSignature,
    ) -> Result<Option<Arc<Self>>> {
        let limit = options.limit.unwrap_or(config.default_limit);
        let expire = options.expire.unwrap_or(config.default_expire);
        check_bound("limit", limit)?;
        check_bound("expire", expire)?;
        if limit == 0 || expire == 0 {
            debug!(name = %options.name, "caching disabled");
            return Ok(None);
        }

        let backend = options.backend.unwrap_or(config.backend);
        let namespace = Namespace::new(backend, &config.key_prefix, &options.name);
        let store: Box<dyn Store<R>> = match backend {
            Backend::Memory => Box::new(MemoryStore::new(namespace.clone(), limit, expire)?),
            Backend::Remote => {
                let client = config.require_client(backend)?;
                match options.format.unwrap_or(config.value_format) {
                    ValueFormat::Json => Box::new(RemoteStore::new(
                        client,
                        namespace.clone(),
                        limit,
                        expire,
                        JsonCodec::<R>::new(),
                    )),
                    ValueFormat::MsgPack => Box::new(RemoteStore::new(
                        client,
                        namespace.clone(),
                        limit,
                        expire,
                        MsgPackCodec::<R>::new(),
                    )),
                }
            }
            Backend::Hybrid => Box::new(HybridStore::new(
                config.require_client(backend)?,
                namespace.clone(),
                limit,
                expire,
            )?),
        };

        let codec = KeyCodec::new(
            KeyMode::from(options.strict),
            Arc::new(signature),
            options.is_method,
        );
        let graph = options.graph.unwrap_or_else(DependencyGraph::global);
        let instance = Arc::new(Self::with_store(
            options.name, namespace, codec, store, limit, expire, graph,
        ));
        instance.register(&options.dependencies);
        Ok(Some(instance))
    }
}

impl<R> CacheInstance<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Assembles an instance around an already built store.
    pub fn with_store(
        name: String,
        namespace: Namespace,
        codec: KeyCodec,
        store: Box<dyn Store<R>>,
        limit: i64,
        expire: i64,
        graph: Arc<DependencyGraph>,
    ) -> Self {
        Self {
            id: CacheId::next(),
            name,
            namespace,
            codec,
            store,
            limit,
            expire,
            graph,
            #[cfg(feature = "stats")]
            stats: CacheStats::new(),
        }
    }

    /// Records this instance as a dependent of every cache in `dependencies`.
    pub fn register(self: &Arc<Self>, dependencies: &[CacheDependency]) {
        for dependency in dependencies {
            let this: Arc<dyn Invalidate> = self.clone();
            let weak: Weak<dyn Invalidate> = Arc::downgrade(&this);
            self.graph.register(dependency.ident(), weak);
        }
    }

    /// Returns the cached value for `call`, computing and storing it on a miss.
    ///
    /// `f` receives the normalized call: in strict mode defaults are filled in
    /// and keyword-only values are passed by name.
    pub fn get_or_compute<F>(&self, call: &CallArgs, f: F) -> Result<R>
    where
        F: FnOnce(&CallArgs) -> R,
    {
        let generated = self.make_key(call)?;
        if let Some(value) = self.lookup(&generated.key)? {
            return Ok(value);
        }
        let value = f(&generated.invocation(call));
        self.store.set(&generated.key, value.clone())?;
        Ok(value)
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for fallible
    /// computations; only `Ok` results are stored.
    pub fn try_get_or_compute<F, E>(&self, call: &CallArgs, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&CallArgs) -> std::result::Result<R, E>,
        E: From<CacheError>,
    {
        let generated = self.make_key(call)?;
        if let Some(value) = self.lookup(&generated.key)? {
            return Ok(value);
        }
        let value = f(&generated.invocation(call))?;
        self.store.set(&generated.key, value.clone())?;
        Ok(value)
    }

    fn lookup(&self, key: &str) -> Result<Option<R>> {
        let found = self.store.get(key)?;
        match &found {
            Some(_) => {
                trace!(cache = %self.name, key, "hit");
                #[cfg(feature = "stats")]
                self.stats.record_hit();
            }
            None => {
                trace!(cache = %self.name, key, "miss");
                #[cfg(feature = "stats")]
                self.stats.record_miss();
            }
        }
        Ok(found)
    }

    /// Generates the namespaced key for `call`.
    pub fn make_key(&self, call: &CallArgs) -> Result<GeneratedKey> {
        let mut generated = self.codec.generate(call)?;
        generated.key = self.namespace.full_key(&generated.key);
        Ok(generated)
    }

    /// Builds the matcher for the keys a partial call describes.
    ///
    /// # Errors
    ///
    /// [`CacheError::Unsupported`] in fast key mode.
    pub fn make_key_pattern(&self, call: &CallArgs) -> Result<KeyPattern> {
        let body = self.codec.pattern(call)?;
        KeyPattern::new(&self.namespace.key_prefix(), &body)
    }

    /// Clears every entry, then every dependent cache. Returns the combined count.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.store.clear(None)?;
        let cascaded = self.graph.cascade(self.id)?;
        debug!(cache = %self.name, removed, cascaded, "cleared cache");
        Ok(removed + cascaded)
    }

    /// Clears the entries matching the partial call `call`, then every
    /// dependent cache in full. Returns the combined count.
    ///
    /// # Errors
    ///
    /// [`CacheError::Unsupported`] in fast key mode; nothing is removed then.
    pub fn clear_matching(&self, call: &CallArgs) -> Result<usize> {
        let pattern = self.make_key_pattern(call)?;
        let removed = self.store.clear(Some(&pattern))?;
        let cascaded = self.graph.cascade(self.id)?;
        debug!(cache = %self.name, pattern = pattern.as_str(), removed, cascaded, "cleared matching keys");
        Ok(removed + cascaded)
    }

    /// Flushes the store's backend; see [`Store::flush`].
    pub fn flush(&self) -> Result<usize> {
        self.store.flush()
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn id(&self) -> CacheId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    pub fn key_mode(&self) -> KeyMode {
        self.codec.mode()
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn expire(&self) -> i64 {
        self.expire
    }
}

impl<R> Invalidate for CacheInstance<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn cache_id(&self) -> CacheId {
        self.id
    }

    fn invalidate(&self) -> Result<usize> {
        self.store.clear(None)
    }
}

impl<R> Drop for CacheInstance<R> {
    fn drop(&mut self) {
        self.graph.forget(self.id);
    }
}

impl<R> fmt::Debug for CacheInstance<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("limit", &self.limit)
            .field("expire", &self.expire)
            .finish()
    }
}

type Computation<R> = dyn Fn(&CallArgs) -> R + Send + Sync;

/// A computation wrapped with its cache.
///
/// When caching is disabled (`limit == 0` or `expire == 0`) there is no cache:
/// [`call`](Self::call) runs the computation directly and the cache accessors
/// return `None`.
pub struct Memoized<R> {
    func: Arc<Computation<R>>,
    cache: Option<Arc<CacheInstance<R>>>,
}

impl<R> Memoized<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn call(&self, args: CallArgs) -> Result<R> {
        match &self.cache {
            Some(cache) => cache.get_or_compute(&args, |call| (self.func)(call)),
            None => Ok((self.func)(&args)),
        }
    }

    pub fn cache(&self) -> Option<&Arc<CacheInstance<R>>> {
        self.cache.as_ref()
    }

    pub fn cache_clear(&self) -> Option<Result<usize>> {
        self.cache.as_ref().map(|cache| cache.clear())
    }

    pub fn cache_clear_matching(&self, args: &CallArgs) -> Option<Result<usize>> {
        self.cache.as_ref().map(|cache| cache.clear_matching(args))
    }
}

impl<R> fmt::Debug for Memoized<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("cache", &self.cache)
            .finish()
    }
}

/// Wraps `func` with the cache `options` describe.
///
/// # Errors
///
/// Same as [`CacheInstance::create`].
pub fn memoize<R, F>(
    config: &CacheConfig,
    options: CacheOptions,
    signature: CallSignature,
    func: F,
) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    let cache = CacheInstance::create(config, options, signature)?;
    Ok(Memoized {
        func: Arc::new(func),
        cache,
    })
}
