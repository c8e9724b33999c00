//! C1: persistent key/value store for base-config and per-chain params
//! (spec §3, §4.4).
//!
//! Keys are plain byte strings so the concrete backend doesn't need to know
//! about chain families; the helpers in [`keys`] build the well-known key
//! shapes spec.md names: `chainIDs`, `<type>:params:<chain_id>`,
//! `<type>:base_config`, `<type>:height:<chain_id>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::KvError;

/// Well-known key builders (spec §3 "Persisted key-value keys").
pub mod keys {
    pub const CHAIN_IDS: &[u8] = b"chainIDs";

    pub fn params(chain_type: &str, chain_id: &str) -> Vec<u8> {
        format!("{chain_type}:params:{chain_id}").into_bytes()
    }

    pub fn base_config(chain_type: &str) -> Vec<u8> {
        format!("{chain_type}:base_config").into_bytes()
    }

    pub fn height(chain_type: &str, chain_id: &str) -> Vec<u8> {
        format!("{chain_type}:height:{chain_id}").into_bytes()
    }
}

/// Abstract persistent key/value store.
///
/// Implementations must tolerate concurrent writers (spec §5): all methods
/// take `&self`, not `&mut self`.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;
    async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), KvError>;
    async fn delete(&self, key: &[u8]) -> Result<(), KvError>;
}

/// Typed convenience helpers layered on top of the raw byte-oriented [`KvStore`].
#[async_trait::async_trait]
pub trait KvStoreExt: KvStore {
    async fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, KvError> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &[u8], value: &T) -> Result<(), KvError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes).await
    }
}

impl<T: KvStore + ?Sized> KvStoreExt for T {}

/// `sled`-backed [`KvStore`], mirroring the original relayer's embedded
/// key/value store. `sled`'s API is synchronous; calls are dispatched
/// through [`tokio::task::spawn_blocking`] so the async runtime is never
/// blocked on disk I/O, the same discipline the admin HTTP handlers rely on.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, KvError> {
        let db = sled::open(path).map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait::async_trait]
impl KvStore for SledKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || {
            db.get(&key)
                .map(|opt| opt.map(|ivec| ivec.to_vec()))
                .map_err(|e| KvError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| KvError::Backend(e.to_string()))?
    }

    async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), KvError> {
        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || {
            db.insert(&key, value)
                .map(|_| ())
                .map_err(|e| KvError::Backend(e.to_string()))?;
            db.flush().map_err(|e| KvError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| KvError::Backend(e.to_string()))?
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || {
            db.remove(&key)
                .map(|_| ())
                .map_err(|e| KvError::Backend(e.to_string()))?;
            db.flush().map_err(|e| KvError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| KvError::Backend(e.to_string()))?
    }
}

/// In-memory [`KvStore`] used by unit tests and by examples that don't want
/// to touch disk.
#[derive(Default, Clone)]
pub struct MemoryKvStore {
    inner: Arc<std::sync::Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.inner.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), KvError> {
        self.inner.lock().unwrap().insert(key.to_vec(), value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }
}

/// The `chainIDs -> {chain_id: chain_type}` registry index (spec §3).
pub type ChainIdIndex = BTreeMap<String, String>;

/// Reads the `chainIDs` index, defaulting to an empty map if unset.
pub async fn read_chain_id_index(kv: &dyn KvStore) -> Result<ChainIdIndex, KvError> {
    match kv.get(keys::CHAIN_IDS).await? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(ChainIdIndex::new()),
    }
}

/// Writes the `chainIDs` index.
pub async fn write_chain_id_index(kv: &dyn KvStore, index: &ChainIdIndex) -> Result<(), KvError> {
    let bytes = serde_json::to_vec(index)?;
    kv.set(keys::CHAIN_IDS, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrips_bytes() {
        let kv = MemoryKvStore::default();
        kv.set(b"foo", b"bar".to_vec()).await.unwrap();
        assert_eq!(kv.get(b"foo").await.unwrap(), Some(b"bar".to_vec()));
        kv.delete(b"foo").await.unwrap();
        assert_eq!(kv.get(b"foo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn chain_id_index_roundtrips() {
        let kv = MemoryKvStore::default();
        let mut index = ChainIdIndex::new();
        index.insert("eth-a".to_string(), "eth".to_string());
        write_chain_id_index(&kv, &index).await.unwrap();
        let read_back = read_chain_id_index(&kv).await.unwrap();
        assert_eq!(read_back, index);
    }

    #[test]
    fn key_builders_match_spec_shapes() {
        assert_eq!(keys::params("eth", "eth-a"), b"eth:params:eth-a".to_vec());
        assert_eq!(keys::base_config("eth"), b"eth:base_config".to_vec());
        assert_eq!(keys::height("eth", "eth-a"), b"eth:height:eth-a".to_vec());
    }
}
