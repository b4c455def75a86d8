//! # ストレージセッション
//!
//! エージェント鍵・プルーフ・現在のスペースを束ねたクライアント。
//! プロセス内で一つだけ構築し、全リクエストで共有する。
//!
//! ## 構築の流れ
//! 1. 設定されたバックエンドのクライアントをエージェント鍵で構築
//! 2. プルーフからスペースを追加（委任の検証）
//! 3. 追加したスペースが `SPACE_DID` と一致することを確認
//! 4. 現在のスペースに設定
//!
//! 構築は初回利用時に行う。同時に到着したリクエストは同じ構築処理を待ち、
//! 失敗した場合は全員がそのエラーを受け取る。失敗結果は保持しないため、
//! 後続のリクエストで再試行される。

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use wall_crypto::{Cid, Did};

use crate::config::Credentials;
use crate::error::GatewayError;
use crate::storage::{self, StorageBackend, StorageClient};

/// 構築済みのストレージセッション。
pub struct StorageSession {
    space: Did,
    client: Box<dyn StorageClient>,
}

impl std::fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSession")
            .field("space", &self.space)
            .finish_non_exhaustive()
    }
}

impl StorageSession {
    /// プルーフのスペースを追加して現在のスペースに設定する。
    pub async fn establish(
        credentials: &Credentials,
        mut client: Box<dyn StorageClient>,
    ) -> Result<Self, GatewayError> {
        let space = client.add_space(&credentials.proof).await?;
        if space != credentials.space {
            return Err(GatewayError::Config(format!(
                "proof grants access to {space}, not the configured space {}",
                credentials.space
            )));
        }
        client.set_current_space(&space)?;

        tracing::info!(agent = %client.agent(), space = %space, "ストレージスペースに接続しました");
        Ok(Self { space, client })
    }

    /// 現在のスペースにバイト列をアップロードする。
    pub async fn upload(&self, blob: Bytes) -> Result<Cid, GatewayError> {
        self.client.upload_file(blob).await
    }

    pub fn space(&self) -> &Did {
        &self.space
    }
}

// ---------------------------------------------------------------------------
// SessionCell
// ---------------------------------------------------------------------------

type SessionResult = Result<Arc<StorageSession>, GatewayError>;
type PendingSession = Shared<BoxFuture<'static, SessionResult>>;
type SessionInit = dyn Fn() -> BoxFuture<'static, Result<StorageSession, GatewayError>> + Send + Sync;

/// `StorageSession` を一度だけ構築して共有するセル。
pub struct SessionCell {
    init: Box<SessionInit>,
    slot: Mutex<Option<PendingSession>>,
}

impl SessionCell {
    /// 任意の構築処理からセルを作る。構築は `get()` の初回呼び出しまで行わない。
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StorageSession, GatewayError>> + Send + 'static,
    {
        Self {
            init: Box::new(move || init().boxed()),
            slot: Mutex::new(None),
        }
    }

    /// 認証情報とバックエンド設定からセッションを構築するセル。
    pub fn from_credentials(credentials: Arc<Credentials>, backend: StorageBackend) -> Self {
        Self::new(move || {
            let credentials = credentials.clone();
            let backend = backend.clone();
            async move {
                let client = storage::connect(&backend, &credentials.signer)?;
                StorageSession::establish(&credentials, client).await
            }
        })
    }

    /// セッションを取得する。未構築なら構築し、構築中なら完了を待つ。
    pub async fn get(&self) -> SessionResult {
        let pending = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = (self.init)().map(|r| r.map(Arc::new)).boxed().shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;
        if let Err(e) = &result {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            // 別の呼び出しが既に再構築を始めていれば、そちらは残す
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&pending)) {
                tracing::warn!(error = %e, "ストレージセッションの構築に失敗しました");
                *slot = None;
            }
        }
        result
    }

    /// 構築済みのセッションを保持しているか。
    pub fn is_ready(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|pending| pending.peek())
            .is_some_and(|result| result.is_ok())
    }
}
