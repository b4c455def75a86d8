//! # メモリ内ストレージ
//!
//! ストレージネットワークの代わりにプロセス内のマップへ保存する。
//! `STORAGE_BACKEND=memory` で選択する。プルーフの検証はHTTP実装と同じ。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use wall_crypto::ucan::UPLOAD_ADD;
use wall_crypto::{Cid, Delegation, Did};

use super::{SpaceRegistry, StorageClient};
use crate::error::GatewayError;

/// CIDをキーとするブロブの保存先。
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<Cid, Bytes>>,
}

impl MemoryStore {
    #[cfg(test)]
    pub fn get(&self, cid: &Cid) -> Option<Bytes> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cid)
            .cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, cid: Cid, blob: Bytes) {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cid, blob);
    }
}

/// `MemoryStore` に書き込むクライアント。
pub struct MemoryStorageClient {
    agent: Did,
    store: Arc<MemoryStore>,
    spaces: SpaceRegistry,
}

impl MemoryStorageClient {
    pub fn new(agent: Did, store: Arc<MemoryStore>) -> Self {
        Self {
            agent,
            store,
            spaces: SpaceRegistry::default(),
        }
    }
}

#[async_trait::async_trait]
impl StorageClient for MemoryStorageClient {
    fn agent(&self) -> &Did {
        &self.agent
    }

    async fn add_space(&mut self, proof: &Delegation) -> Result<Did, GatewayError> {
        self.spaces.add(&self.agent, proof)
    }

    fn set_current_space(&mut self, space: &Did) -> Result<(), GatewayError> {
        self.spaces.set_current(space)
    }

    async fn upload_file(&self, blob: Bytes) -> Result<Cid, GatewayError> {
        self.spaces.authorize(UPLOAD_ADD)?;
        let cid = Cid::of(&blob);
        self.store.put(cid, blob);
        Ok(cid)
    }
}
