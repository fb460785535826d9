//! External key-value service contract.
//!
//! Remote and hybrid stores never talk to a network protocol themselves; they
//! drive a [`KeyValueClient`]. [`MemoryClient`] is an in-process implementation
//! (lazy per-key TTL, random set pop, atomic batches) used for tests and
//! single-process deployments. With the `redis` feature,
//! [`RedisClient`](crate::RedisClient) adapts the `redis` crate.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::error::Result;

/// One write inside an atomic [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: Vec<u8> },
    SetEx { key: String, value: Vec<u8>, seconds: u64 },
    Delete(Vec<String>),
    SAdd { set: String, members: Vec<String> },
    SRem { set: String, members: Vec<String> },
}

/// Sequence of writes executed by the service as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value,
        });
        self
    }

    pub fn set_ex(&mut self, key: impl Into<String>, value: Vec<u8>, seconds: u64) -> &mut Self {
        self.commands.push(Command::SetEx {
            key: key.into(),
            value,
            seconds,
        });
        self
    }

    /// Writes `value` under `key`, with a TTL unless `expire` is `None`.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>, expire: Option<u64>) -> &mut Self {
        match expire {
            Some(seconds) => self.set_ex(key, value, seconds),
            None => self.set(key, value),
        }
    }

    pub fn delete(&mut self, keys: Vec<String>) -> &mut Self {
        if !keys.is_empty() {
            self.commands.push(Command::Delete(keys));
        }
        self
    }

    pub fn sadd(&mut self, set: impl Into<String>, members: Vec<String>) -> &mut Self {
        self.commands.push(Command::SAdd {
            set: set.into(),
            members,
        });
        self
    }

    pub fn srem(&mut self, set: impl Into<String>, members: Vec<String>) -> &mut Self {
        self.commands.push(Command::SRem {
            set: set.into(),
            members,
        });
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Operations a remote store needs from the external key-value service.
///
/// Implementations own their retry and timeout policy; failures are reported as
/// [`CacheError::Backend`](crate::CacheError::Backend).
pub trait KeyValueClient: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn set_ex(&self, key: &str, value: &[u8], seconds: u64) -> Result<()>;
    /// Deletes plain keys and sets alike; returns how many existed.
    fn delete(&self, keys: &[String]) -> Result<usize>;
    fn sadd(&self, set: &str, members: &[String]) -> Result<usize>;
    fn srem(&self, set: &str, members: &[String]) -> Result<usize>;
    fn smembers(&self, set: &str) -> Result<Vec<String>>;
    fn scard(&self, set: &str) -> Result<usize>;
    /// Removes and returns an arbitrary member.
    fn spop(&self, set: &str) -> Result<Option<String>>;
    /// Applies every command of `batch` atomically.
    fn execute(&self, batch: Batch) -> Result<()>;
}

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Default)]
struct Keyspace {
    values: HashMap<String, StoredValue>,
    sets: HashMap<String, HashSet<String>>,
}

impl Keyspace {
    fn store(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) {
        self.sets.remove(key);
        self.values.insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    fn delete(&mut self, keys: &[String]) -> usize {
        let now = Instant::now();
        keys.iter()
            .filter(|key| {
                let value = self.values.remove(key.as_str()).map_or(false, |v| v.is_live(now));
                let set = self.sets.remove(key.as_str()).is_some();
                value || set
            })
            .count()
    }

    fn sadd(&mut self, set: &str, members: &[String]) -> usize {
        if members.is_empty() {
            return 0;
        }
        let entry = self.sets.entry(set.to_string()).or_default();
        members.iter().filter(|m| entry.insert((*m).clone())).count()
    }

    fn srem(&mut self, set: &str, members: &[String]) -> usize {
        let Some(entry) = self.sets.get_mut(set) else {
            return 0;
        };
        let removed = members.iter().filter(|m| entry.remove(m.as_str())).count();
        if entry.is_empty() {
            self.sets.remove(set);
        }
        removed
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Set { key, value } => self.store(&key, &value, None),
            Command::SetEx {
                key,
                value,
                seconds,
            } => self.store(&key, &value, Some(Duration::from_secs(seconds))),
            Command::Delete(keys) => {
                self.delete(&keys);
            }
            Command::SAdd { set, members } => {
                self.sadd(&set, &members);
            }
            Command::SRem { set, members } => {
                self.srem(&set, &members);
            }
        }
    }
}

/// In-process [`KeyValueClient`].
///
/// All state sits behind one mutex, which also makes [`Batch`] execution
/// atomic. Expired values are dropped lazily when read.
///
/// # Examples
///
/// ```
/// use cachemint_core::{KeyValueClient, MemoryClient};
///
/// let client = MemoryClient::new();
/// client.set("k", b"v").unwrap();
/// assert_eq!(client.get("k").unwrap(), Some(b"v".to_vec()));
/// ```
#[derive(Default)]
pub struct MemoryClient {
    keyspace: Mutex<Keyspace>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every key and set.
    pub fn flushdb(&self) {
        *self.keyspace.lock() = Keyspace::default();
    }

    /// Returns `true` when `key` holds a live value or a non-empty set.
    pub fn exists(&self, key: &str) -> bool {
        let ks = self.keyspace.lock();
        let now = Instant::now();
        ks.values.get(key).map_or(false, |v| v.is_live(now)) || ks.sets.contains_key(key)
    }
}

impl KeyValueClient for MemoryClient {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut ks = self.keyspace.lock();
        let now = Instant::now();
        match ks.values.get(key) {
            Some(v) if v.is_live(now) => Ok(Some(v.bytes.clone())),
            Some(_) => {
                ks.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.keyspace.lock().store(key, value, None);
        Ok(())
    }

    fn set_ex(&self, key: &str, value: &[u8], seconds: u64) -> Result<()> {
        self.keyspace
            .lock()
            .store(key, value, Some(Duration::from_secs(seconds)));
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> Result<usize> {
        Ok(self.keyspace.lock().delete(keys))
    }

    fn sadd(&self, set: &str, members: &[String]) -> Result<usize> {
        Ok(self.keyspace.lock().sadd(set, members))
    }

    fn srem(&self, set: &str, members: &[String]) -> Result<usize> {
        Ok(self.keyspace.lock().srem(set, members))
    }

    fn smembers(&self, set: &str) -> Result<Vec<String>> {
        Ok(self
            .keyspace
            .lock()
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn scard(&self, set: &str) -> Result<usize> {
        Ok(self.keyspace.lock().sets.get(set).map_or(0, HashSet::len))
    }

    fn spop(&self, set: &str) -> Result<Option<String>> {
        let mut ks = self.keyspace.lock();
        let Some(members) = ks.sets.get_mut(set) else {
            return Ok(None);
        };
        let picked = members.iter().nth(fastrand::usize(..members.len())).cloned();
        if let Some(member) = &picked {
            members.remove(member);
        }
        if members.is_empty() {
            ks.sets.remove(set);
        }
        Ok(picked)
    }

    fn execute(&self, batch: Batch) -> Result<()> {
        let mut ks = self.keyspace.lock();
        for command in batch.into_commands() {
            ks.apply(command);
        }
        Ok(())
    }
}
