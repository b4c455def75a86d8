//! # ストレージネットワーク
//!
//! ストレージネットワークのクライアントを抽象化する。
//! Gatewayは委任されたスペースに対してのみ書き込みを行う。
//!
//! ## 実装
//! - `http` — アップロードサービスへ署名付き呼び出しでバイト列を送る（本番用）
//! - `memory` — プロセス内のコンテンツアドレス型ストア（ローカル開発・テスト用）

#[cfg(feature = "vendor-http")]
pub mod http;
pub mod memory;

#[cfg(feature = "vendor-http")]
pub use http::HttpStorageClient;
pub use memory::{MemoryStorageClient, MemoryStore};

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use wall_crypto::{AgentSigner, Cid, Delegation, Did};

use crate::error::GatewayError;

/// ストレージネットワークのクライアント。
///
/// 一つのエージェント鍵に束縛され、委任（プルーフ）で追加したスペースのうち
/// 「現在のスペース」にアップロードする。
#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    /// クライアントが名乗るエージェントのDID
    fn agent(&self) -> &Did;

    /// プルーフを検証してスペースを追加し、そのDIDを返す。
    async fn add_space(&mut self, proof: &Delegation) -> Result<Did, GatewayError>;

    /// 以降のアップロード先を設定する。追加済みのスペースのみ指定できる。
    fn set_current_space(&mut self, space: &Did) -> Result<(), GatewayError>;

    /// バイト列をアップロードし、コンテンツ識別子を返す。
    async fn upload_file(&self, blob: Bytes) -> Result<Cid, GatewayError>;
}

/// 使用するストレージ実装の選択。
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// アップロードサービスのベースURL
    Http { endpoint: String },
    /// 共有のメモリ内ストア（セッションを再構築しても内容は保持される）
    Memory(Arc<MemoryStore>),
}

/// 設定されたバックエンドのクライアントをエージェント鍵で構築する。
pub fn connect(
    backend: &StorageBackend,
    signer: &AgentSigner,
) -> Result<Box<dyn StorageClient>, GatewayError> {
    match backend {
        #[cfg(feature = "vendor-http")]
        StorageBackend::Http { endpoint } => Ok(Box::new(HttpStorageClient::new(
            endpoint.clone(),
            signer.clone(),
        )?)),
        #[cfg(not(feature = "vendor-http"))]
        StorageBackend::Http { .. } => Err(GatewayError::Config(
            "STORAGE_BACKEND=http requires the vendor-http feature".to_string(),
        )),
        StorageBackend::Memory(store) => Ok(Box::new(MemoryStorageClient::new(
            signer.did().clone(),
            store.clone(),
        ))),
    }
}

/// クライアントが保持するスペースとプルーフの一覧。各実装で共有する。
#[derive(Debug, Default)]
pub(crate) struct SpaceRegistry {
    proofs: HashMap<Did, Delegation>,
    current: Option<Did>,
}

impl SpaceRegistry {
    /// プルーフがエージェント宛てで有効ならスペースとして登録する。
    pub(crate) fn add(&mut self, agent: &Did, proof: &Delegation) -> Result<Did, GatewayError> {
        let space = proof
            .validate_for(agent, wall_crypto::now_secs())
            .map_err(|e| GatewayError::Config(format!("authorization proof rejected: {e}")))?;
        self.proofs.insert(space.clone(), proof.clone());
        Ok(space)
    }

    pub(crate) fn set_current(&mut self, space: &Did) -> Result<(), GatewayError> {
        if !self.proofs.contains_key(space) {
            return Err(GatewayError::Config(format!(
                "space {space} has not been added to this client"
            )));
        }
        self.current = Some(space.clone());
        Ok(())
    }

    /// 現在のスペースで操作 `can` を行うためのプルーフを返す。
    ///
    /// プルーフの有効期限はセッション構築後も呼び出しごとに確認する。
    pub(crate) fn authorize(&self, can: &str) -> Result<(&Did, &Delegation), GatewayError> {
        let space = self
            .current
            .as_ref()
            .ok_or_else(|| GatewayError::Config("no current space selected".to_string()))?;
        let proof = self.proofs.get(space).ok_or_else(|| {
            GatewayError::Config(format!("no proof held for space {space}"))
        })?;

        if let Some(exp) = proof.expiration() {
            if exp <= wall_crypto::now_secs() {
                return Err(GatewayError::Upstream(format!(
                    "delegation for space {space} expired at {exp}"
                )));
            }
        }
        if !proof.allows(can) {
            return Err(GatewayError::Upstream(format!(
                "proof does not grant {can} on space {space}"
            )));
        }
        Ok((space, proof))
    }
}
