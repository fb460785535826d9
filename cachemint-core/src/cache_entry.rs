use std::time::Instant;

/// Internal wrapper that tracks when a value was admitted into a local store.
///
/// `inserted_at` drives lazy TTL expiration. `stamp` is the shared timestamp
/// (microseconds since the Unix epoch) a hybrid store compares against the
/// remote tier; purely local entries keep it at 0.
///
/// # Examples
///
/// ```
/// use cachemint_core::CacheEntry;
///
/// let entry = CacheEntry::new(42);
/// assert_eq!(entry.value, 42);
/// assert!(!entry.is_expired(Some(60)));
/// ```
#[derive(Clone, Debug)]
pub struct CacheEntry<R> {
    pub value: R,
    pub inserted_at: Instant,
    pub stamp: i64,
}

impl<R> CacheEntry<R> {
    /// Creates a new entry admitted now, without a shared stamp.
    pub fn new(value: R) -> Self {
        Self::stamped(value, 0)
    }

    /// Creates a new entry tagged with the given shared stamp.
    pub fn stamped(value: R, stamp: i64) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            stamp,
        }
    }

    /// Returns true once the entry age reaches `ttl` seconds.
    ///
    /// `None` means no expiration.
    ///
    /// ```
    /// use cachemint_core::CacheEntry;
    ///
    /// let entry = CacheEntry::new("data");
    /// assert!(entry.is_expired(Some(0)));
    /// assert!(!entry.is_expired(None));
    /// ```
    pub fn is_expired(&self, ttl: Option<u64>) -> bool {
        match ttl {
            Some(ttl_secs) => self.inserted_at.elapsed().as_secs() >= ttl_secs,
            None => false,
        }
    }
}

/// Current shared timestamp in microseconds since the Unix epoch.
pub fn now_stamp() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
