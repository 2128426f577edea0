//! Pluggable serialization for keys and values
//!
//! The store never interprets key or value bytes itself; everything
//! crossing the disk boundary goes through a [`Marshaller`]. The host
//! cache supplies its own implementation, or uses the JSON one shipped
//! here.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Byte-oriented marshaller for opaque keys and values.
pub trait Marshaller<K, V>: Send + Sync {
    fn key_to_bytes(&self, key: &K) -> Result<Vec<u8>>;
    fn key_from_bytes(&self, bytes: &[u8]) -> Result<K>;
    fn value_to_bytes(&self, value: &V) -> Result<Vec<u8>>;
    fn value_from_bytes(&self, bytes: &[u8]) -> Result<V>;
}

/// Marshaller backed by `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMarshaller;

impl<K, V> Marshaller<K, V> for JsonMarshaller
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn key_to_bytes(&self, key: &K) -> Result<Vec<u8>> {
        serde_json::to_vec(key)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize key: {}", e)))
    }

    fn key_from_bytes(&self, bytes: &[u8]) -> Result<K> {
        serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Serialization(format!("Failed to deserialize key: {}", e)))
    }

    fn value_to_bytes(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize value: {}", e)))
    }

    fn value_from_bytes(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Serialization(format!("Failed to deserialize value: {}", e)))
    }
}
