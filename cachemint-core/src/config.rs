//! Process-wide cache defaults.
//!
//! A [`CacheConfig`] is usually passed explicitly to
//! [`memoize`](crate::memoize). Code that cannot thread it through may
//! [`install`](CacheConfig::install) one and resolve it later with
//! [`CacheConfig::current`].

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::env;
use std::fmt;
use std::sync::Arc;

use crate::client::KeyValueClient;
use crate::codec::ValueFormat;
use crate::error::{CacheError, Result};
use crate::store::Backend;

pub const DEFAULT_LIMIT: i64 = 1000;
pub const DEFAULT_EXPIRE: i64 = 60 * 60 * 24;

static CURRENT: Lazy<RwLock<Option<Arc<CacheConfig>>>> = Lazy::new(|| RwLock::new(None));

/// Defaults applied to every cache instance that does not override them.
#[derive(Clone)]
pub struct CacheConfig {
    /// Entries per instance; `-1` unlimited, `0` disables caching.
    pub default_limit: i64,
    /// Seconds before an entry expires; `-1` never, `0` disables caching.
    pub default_expire: i64,
    /// Prepended to every namespace to keep deployments apart.
    pub key_prefix: String,
    pub backend: Backend,
    /// How the remote backend serializes values.
    pub value_format: ValueFormat,
    /// Required by the remote and hybrid backends.
    pub client: Option<Arc<dyn KeyValueClient>>,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `CACHEMINT_DEFAULT_LIMIT`, `CACHEMINT_DEFAULT_EXPIRE`,
    /// `CACHEMINT_KEY_PREFIX`, `CACHEMINT_BACKEND` and
    /// `CACHEMINT_VALUE_FORMAT`; unset or unparsable variables keep their
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            default_limit: env::var("CACHEMINT_DEFAULT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LIMIT),
            default_expire: env::var("CACHEMINT_DEFAULT_EXPIRE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EXPIRE),
            key_prefix: env::var("CACHEMINT_KEY_PREFIX").unwrap_or_default(),
            backend: env::var("CACHEMINT_BACKEND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            value_format: env::var("CACHEMINT_VALUE_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            client: None,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_expire(mut self, expire: i64) -> Self {
        self.default_expire = expire;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_value_format(mut self, format: ValueFormat) -> Self {
        self.value_format = format;
        self
    }

    pub fn with_client(mut self, client: Arc<dyn KeyValueClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// The key-value client a distributed `backend` runs on.
    ///
    /// # Errors
    ///
    /// [`CacheError::Config`] when no client was configured.
    pub fn require_client(&self, backend: Backend) -> Result<Arc<dyn KeyValueClient>> {
        self.client.clone().ok_or_else(|| {
            CacheError::Config(format!("the {} backend needs a key-value client", backend))
        })
    }

    /// Makes this the process-wide configuration, replacing any previous one.
    pub fn install(self) -> Arc<CacheConfig> {
        let config = Arc::new(self);
        *CURRENT.write() = Some(config.clone());
        config
    }

    /// The installed configuration.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotConfigured`] when nothing was installed.
    pub fn current() -> Result<Arc<CacheConfig>> {
        CURRENT.read().clone().ok_or(CacheError::NotConfigured)
    }

    /// Removes the installed configuration, returning it.
    pub fn uninstall() -> Option<Arc<CacheConfig>> {
        CURRENT.write().take()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            default_expire: DEFAULT_EXPIRE,
            key_prefix: String::new(),
            backend: Backend::Memory,
            value_format: ValueFormat::Json,
            client: None,
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("default_limit", &self.default_limit)
            .field("default_expire", &self.default_expire)
            .field("key_prefix", &self.key_prefix)
            .field("backend", &self.backend)
            .field("value_format", &self.value_format)
            .field("client", &self.client.is_some())
            .finish()
    }
}
