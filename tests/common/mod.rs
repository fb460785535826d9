#![allow(dead_code)]

use cachemint::{Batch, CacheError, KeyValueClient, MemoryClient, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`MemoryClient`] whose reads, set listings or batches can be made to fail.
#[derive(Default)]
pub struct FlakyClient {
    pub inner: MemoryClient,
    pub fail_get: AtomicBool,
    pub fail_smembers: AtomicBool,
    pub fail_execute: AtomicBool,
}

impl FlakyClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Backend(format!("{} refused", what)));
        }
        Ok(())
    }
}

impl KeyValueClient for FlakyClient {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Self::check(&self.fail_get, "GET")?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.set(key, value)
    }

    fn set_ex(&self, key: &str, value: &[u8], seconds: u64) -> Result<()> {
        self.inner.set_ex(key, value, seconds)
    }

    fn delete(&self, keys: &[String]) -> Result<usize> {
        self.inner.delete(keys)
    }

    fn sadd(&self, set: &str, members: &[String]) -> Result<usize> {
        self.inner.sadd(set, members)
    }

    fn srem(&self, set: &str, members: &[String]) -> Result<usize> {
        self.inner.srem(set, members)
    }

    fn smembers(&self, set: &str) -> Result<Vec<String>> {
        Self::check(&self.fail_smembers, "SMEMBERS")?;
        self.inner.smembers(set)
    }

    fn scard(&self, set: &str) -> Result<usize> {
        self.inner.scard(set)
    }

    fn spop(&self, set: &str) -> Result<Option<String>> {
        self.inner.spop(set)
    }

    fn execute(&self, batch: Batch) -> Result<()> {
        Self::check(&self.fail_execute, "EXEC")?;
        self.inner.execute(batch)
    }
}
