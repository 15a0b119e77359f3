//! Payload (de)serialization boundary

use std::fmt::Debug;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::CacheError;

/// Converts between a response value and the text stored in the caches
///
/// The cache never looks inside the payload beyond round-tripping it.
pub trait PayloadCodec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<String, CacheError>;

    fn decode(&self, payload: &str) -> Result<T, CacheError>;
}

/// JSON codec for any serde type
pub struct JsonCodec<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> PayloadCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String, CacheError> {
        serde_json::to_string(value).map_err(|e| {
            CacheError::serialization(format!("Failed to serialize payload: {}", e))
        })
    }

    fn decode(&self, payload: &str) -> Result<T, CacheError> {
        serde_json::from_str(payload).map_err(|e| {
            CacheError::deserialization(format!("Failed to deserialize payload: {}", e))
        })
    }
}

/// Codec built from a pair of closures
pub struct FnCodec<T> {
    encode: Box<dyn Fn(&T) -> Result<String, CacheError> + Send + Sync>,
    decode: Box<dyn Fn(&str) -> Result<T, CacheError> + Send + Sync>,
}

impl<T> FnCodec<T> {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&T) -> Result<String, CacheError> + Send + Sync + 'static,
        D: Fn(&str) -> Result<T, CacheError> + Send + Sync + 'static,
    {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }
}

impl<T> Debug for FnCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnCodec")
    }
}

impl<T> PayloadCodec<T> for FnCodec<T> {
    fn encode(&self, value: &T) -> Result<String, CacheError> {
        (self.encode)(value)
    }

    fn decode(&self, payload: &str) -> Result<T, CacheError> {
        (self.decode)(payload)
    }
}
