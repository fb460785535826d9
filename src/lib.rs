//! # Cachemint
//!
//! Function-result caching keyed by call arguments, with a bounded in-process
//! LRU, optional sharing through an external key-value service, and selective
//! invalidation that cascades to dependent caches.
//!
//! ## Quick Start
//!
//! Install a configuration once, then wrap computations:
//!
//! ```rust
//! use cachemint::{memory_cache, CacheConfig, CacheOptions, CallArgs, CallSignature};
//!
//! CacheConfig::new().install();
//!
//! let sig = CallSignature::builder().param("n").build().unwrap();
//! let square = memory_cache(CacheOptions::new("square"), sig, |call: &CallArgs| {
//!     let n = call.get(0, "n").and_then(|v| v.as_i64()).unwrap_or(0);
//!     n * n
//! })
//! .unwrap();
//!
//! assert_eq!(square.call(CallArgs::new().arg(4)).unwrap(), 16);
//! assert_eq!(square.call(CallArgs::new().arg(4)).unwrap(), 16); // cached
//! ```
//!
//! ## Key Modes
//!
//! Fast keys (the default) render the raw arguments, so `f(1, 2)` and
//! `f(a=1, b=2)` are cached separately. Strict keys bind the arguments to the
//! [`CallSignature`] first; they make both spellings share an entry and allow
//! clearing only the entries that match some arguments:
//!
//! ```rust
//! use cachemint::{memory_cache, CacheConfig, CacheOptions, CallArgs, CallSignature};
//!
//! CacheConfig::new().install();
//!
//! let sig = CallSignature::builder().param("user").param_with_default("page", 1).build().unwrap();
//! let feed = memory_cache(CacheOptions::new("feed").strict(true), sig, |call: &CallArgs| {
//!     format!("{:?}", call.args)
//! })
//! .unwrap();
//!
//! feed.call(CallArgs::new().arg("ann")).unwrap();
//! feed.call(CallArgs::new().arg("ann").arg(2)).unwrap();
//! feed.call(CallArgs::new().arg("bob")).unwrap();
//!
//! // drop every page cached for "ann"
//! let removed = feed.cache_clear_matching(&CallArgs::new().kwarg("user", "ann"));
//! assert_eq!(removed.unwrap().unwrap(), 2);
//! ```
//!
//! ## Backends
//!
//! - [`Backend::Memory`]: values stay in-process
//! - [`Backend::Remote`]: values live in the configured [`KeyValueClient`]
//! - [`Backend::Hybrid`]: values stay in-process, the client holds shared
//!   timestamps that reveal invalidation done by other processes
//!
//! Setting `limit` or `expire` to 0 disables caching: the computation runs on
//! every call and [`Memoized::cache`] returns `None`.

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use cachemint_core::*;

fn with_backend<R, F>(
    backend: Backend,
    options: CacheOptions,
    signature: CallSignature,
    func: F,
) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    let config = CacheConfig::current()?;
    memoize(&config, options.backend(backend), signature, func)
}

/// Wraps `func` using the installed configuration and its default backend.
///
/// # Errors
///
/// [`CacheError::NotConfigured`] when no configuration is installed, otherwise
/// as [`memoize`].
pub fn cached<R, F>(options: CacheOptions, signature: CallSignature, func: F) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    let config = CacheConfig::current()?;
    memoize(&config, options, signature, func)
}

/// Wraps `func` with an in-process cache.
pub fn memory_cache<R, F>(
    options: CacheOptions,
    signature: CallSignature,
    func: F,
) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    with_backend(Backend::Memory, options, signature, func)
}

/// Wraps `func` with a cache stored in the configured key-value client.
pub fn remote_cache<R, F>(
    options: CacheOptions,
    signature: CallSignature,
    func: F,
) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    with_backend(Backend::Remote, options, signature, func)
}

/// Wraps `func` with a local cache kept consistent through shared timestamps.
pub fn hybrid_cache<R, F>(
    options: CacheOptions,
    signature: CallSignature,
    func: F,
) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    with_backend(Backend::Hybrid, options, signature, func)
}

/// [`memory_cache`] for methods: the receiver is left out of the key.
pub fn method_memory_cache<R, F>(
    options: CacheOptions,
    signature: CallSignature,
    func: F,
) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    with_backend(Backend::Memory, options.method(true), signature, func)
}

/// [`remote_cache`] for methods: the receiver is left out of the key.
pub fn method_remote_cache<R, F>(
    options: CacheOptions,
    signature: CallSignature,
    func: F,
) -> Result<Memoized<R>>
where
    R: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallArgs) -> R + Send + Sync + 'static,
{
    with_backend(Backend::Remote, options.method(true), signature, func)
}

/// Deletes every key of every namespace `backend` registered in the
/// installed configuration's client. Returns how many keys were removed.
///
/// Memory caches share nothing through the client; clear them per instance
/// with [`Memoized::cache_clear`].
///
/// # Errors
///
/// [`CacheError::Unsupported`] for [`Backend::Memory`],
/// [`CacheError::NotConfigured`] without an installed configuration and
/// [`CacheError::Config`] when it has no client.
pub fn flush_cache(backend: Backend) -> Result<usize> {
    if backend == Backend::Memory {
        return Err(CacheError::Unsupported(
            "MemoryCache keeps no shared namespaces; clear its caches one by one".into(),
        ));
    }
    let config = CacheConfig::current()?;
    let client = config.require_client(backend)?;
    flush_backend(client.as_ref(), backend)
}
