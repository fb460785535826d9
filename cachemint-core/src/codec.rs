use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::{CacheError, Result};

/// Byte encoding of cached values for the remote tier.
pub trait Codec<R>: Send + Sync {
    fn encode(&self, value: &R) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<R>;
}

/// [`Codec`] backed by `serde_json`.
///
/// # Examples
///
/// ```
/// use cachemint_core::{Codec, JsonCodec};
///
/// let codec = JsonCodec::<Vec<u32>>::new();
/// let bytes = codec.encode(&vec![1, 2, 3]).unwrap();
/// assert_eq!(bytes, b"[1,2,3]");
/// assert_eq!(codec.decode(&bytes).unwrap(), vec![1, 2, 3]);
/// ```
pub struct JsonCodec<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R> JsonCodec<R> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R> Default for JsonCodec<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for JsonCodec<R> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for JsonCodec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<R> Codec<R> for JsonCodec<R>
where
    R: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &R) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<R> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Codec(e.to_string()))
    }
}

/// [`Codec`] writing MessagePack through `rmp_serde`.
///
/// Structs are written as maps so fields can be added without breaking
/// values already stored.
///
/// ```
/// use cachemint_core::{Codec, MsgPackCodec};
///
/// let codec = MsgPackCodec::<(u8, String)>::new();
/// let bytes = codec.encode(&(1, "a".to_string())).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), (1, "a".to_string()));
/// ```
pub struct MsgPackCodec<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R> MsgPackCodec<R> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R> Default for MsgPackCodec<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for MsgPackCodec<R> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for MsgPackCodec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MsgPackCodec")
    }
}

impl<R> Codec<R> for MsgPackCodec<R>
where
    R: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &R) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| CacheError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<R> {
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::Codec(e.to_string()))
    }
}

/// Serialization format of values kept by the remote backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueFormat {
    #[default]
    Json,
    MsgPack,
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueFormat::Json => f.write_str("json"),
            ValueFormat::MsgPack => f.write_str("msgpack"),
        }
    }
}

impl FromStr for ValueFormat {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ValueFormat::Json),
            "msgpack" | "messagepack" => Ok(ValueFormat::MsgPack),
            other => Err(CacheError::Config(format!("unknown value format '{}'", other))),
        }
    }
}
