//! # Cachemint Core
//!
//! Building blocks for caching function results by their call arguments.
//!
//! ## Features
//!
//! - **Canonical keys**: strict mode binds arguments to a [`CallSignature`] so
//!   `f(1, 2)` and `f(a=1, b=2)` share one key; fast mode renders the raw shape
//! - **Partial invalidation**: strict keys can be matched by a [`KeyPattern`]
//!   built from only the arguments you want to pin
//! - **Bounded memory**: [`LruDict`] gives O(1) lookup, admission and eviction
//! - **Remote sharing**: [`RemoteStore`] keeps values in an external key-value
//!   service behind the [`KeyValueClient`] trait
//! - **Hybrid consistency**: [`HybridStore`] serves local values while a shared
//!   timestamp detects invalidation done by other processes
//! - **Cascading clears**: [`DependencyGraph`] clears dependent caches along
//!   with the cache they depend on
//! - **Statistics**: hit/miss counters per instance (`stats` feature)
//!
//! ## Module Organization
//!
//! - [`args`] - Call arguments and their canonical text rendering
//! - [`signature`] - Parameter metadata of a cached computation
//! - [`keys`] - Fast and strict key generation, invalidation patterns
//! - [`lru`] - The bounded recency-ordered map
//! - [`client`] - External key-value service contract and an in-process client
//! - [`store`] - Memory, remote and hybrid stores
//! - [`config`] - Defaults and the process-wide configuration
//! - [`dependency`] - Cascading invalidation
//! - [`instance`] - Cache instances and [`memoize`]
//!
//! ## Example
//!
//! ```
//! use cachemint_core::{memoize, CacheConfig, CacheOptions, CallArgs, CallSignature};
//!
//! let sig = CallSignature::builder().param("a").param("b").build().unwrap();
//! let add = memoize(
//!     &CacheConfig::new(),
//!     CacheOptions::new("math::add").strict(true),
//!     sig,
//!     |call: &CallArgs| {
//!         let a = call.get(0, "a").and_then(|v| v.as_i64()).unwrap_or(0);
//!         let b = call.get(1, "b").and_then(|v| v.as_i64()).unwrap_or(0);
//!         a + b
//!     },
//! )
//! .unwrap();
//!
//! assert_eq!(add.call(CallArgs::new().arg(1).arg(2)).unwrap(), 3);
//! assert_eq!(add.call(CallArgs::new().kwarg("b", 2).kwarg("a", 1)).unwrap(), 3);
//! # #[cfg(feature = "stats")]
//! assert_eq!(add.cache().unwrap().stats().hits(), 1);
//! ```

pub mod args;
mod cache_entry;
pub mod client;
mod codec;
pub mod config;
pub mod dependency;
mod error;
pub mod instance;
pub mod keys;
pub mod lru;
pub mod signature;
pub mod store;

#[cfg(feature = "redis")]
mod redis_client;

#[cfg(feature = "stats")]
mod stats;

pub use args::{repr, repr_tuple, CallArgs};
pub use cache_entry::{now_stamp, CacheEntry};
pub use client::{Batch, Command, KeyValueClient, MemoryClient};
pub use codec::{Codec, JsonCodec, MsgPackCodec, ValueFormat};
pub use config::CacheConfig;
pub use dependency::{CacheDependency, CacheId, DependencyGraph, Invalidate};
pub use error::{CacheError, Result};
pub use instance::{memoize, CacheInstance, CacheOptions, Memoized};
pub use keys::{
    generate_fast_key, generate_fast_key_pattern, generate_strict_key,
    generate_strict_key_pattern, GeneratedKey, KeyCodec, KeyMode, KeyPattern,
};
pub use lru::LruDict;
pub use signature::{CallSignature, Param, SignatureBuilder};
pub use store::{
    all_namespaces, flush_backend, Backend, HybridStore, MemoryStore, Namespace, RemoteStore,
    Store,
};

#[cfg(feature = "redis")]
pub use redis_client::RedisClient;

#[cfg(feature = "stats")]
pub use stats::CacheStats;
