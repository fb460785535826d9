//! [`KeyValueClient`] over a Redis server (cargo feature `redis`).

use parking_lot::Mutex;

use crate::client::{Batch, Command, KeyValueClient};
use crate::error::{CacheError, Result};

fn backend_error(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// Blocking Redis client sharing one connection.
///
/// Batches run as a `MULTI`/`EXEC` pipeline. Reconnect and timeout policy are
/// whatever the `redis` crate connection provides.
pub struct RedisClient {
    conn: Mutex<redis::Connection>,
}

impl RedisClient {
    /// Connects to `url`, e.g. `redis://127.0.0.1:6379/0`.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        let conn = client.get_connection().map_err(backend_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: redis::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.conn.lock();
        cmd.query(&mut *conn).map_err(backend_error)
    }
}

impl KeyValueClient for RedisClient {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.query(redis::cmd("GET").arg(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.query(redis::cmd("SET").arg(key).arg(value))
    }

    fn set_ex(&self, key: &str, value: &[u8], seconds: u64) -> Result<()> {
        self.query(redis::cmd("SETEX").arg(key).arg(seconds).arg(value))
    }

    fn delete(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.query(redis::cmd("DEL").arg(keys))
    }

    fn sadd(&self, set: &str, members: &[String]) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        self.query(redis::cmd("SADD").arg(set).arg(members))
    }

    fn srem(&self, set: &str, members: &[String]) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        self.query(redis::cmd("SREM").arg(set).arg(members))
    }

    fn smembers(&self, set: &str) -> Result<Vec<String>> {
        self.query(redis::cmd("SMEMBERS").arg(set))
    }

    fn scard(&self, set: &str) -> Result<usize> {
        self.query(redis::cmd("SCARD").arg(set))
    }

    fn spop(&self, set: &str) -> Result<Option<String>> {
        self.query(redis::cmd("SPOP").arg(set))
    }

    fn execute(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in batch.into_commands() {
            match command {
                Command::Set { key, value } => {
                    pipe.cmd("SET").arg(key).arg(value).ignore();
                }
                Command::SetEx {
                    key,
                    value,
                    seconds,
                } => {
                    pipe.cmd("SETEX").arg(key).arg(seconds).arg(value).ignore();
                }
                Command::Delete(keys) => {
                    pipe.cmd("DEL").arg(keys).ignore();
                }
                Command::SAdd { set, members } if !members.is_empty() => {
                    pipe.cmd("SADD").arg(set).arg(members).ignore();
                }
                Command::SRem { set, members } if !members.is_empty() => {
                    pipe.cmd("SREM").arg(set).arg(members).ignore();
                }
                Command::SAdd { .. } | Command::SRem { .. } => {}
            }
        }
        let mut conn = self.conn.lock();
        pipe.query::<()>(&mut *conn).map_err(backend_error)
    }
}
