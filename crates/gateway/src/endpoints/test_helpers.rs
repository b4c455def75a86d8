//! エンドポイントテスト用のスタブとGateway起動ヘルパー

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use wall_crypto::{AgentSigner, Capability, Cid, Delegation, Did};

use crate::config::{Credentials, GatewayState};
use crate::error::GatewayError;
use crate::session::{SessionCell, StorageSession};
use crate::storage::StorageClient;

pub(crate) const TEST_MAX_UPLOAD_SIZE: u64 = 1024 * 1024;

/// スタブのアップロード結果
#[derive(Debug, Clone, Copy)]
pub(crate) enum StubOutcome {
    Ok,
    Fail(&'static str),
}

/// ストレージに接続しないクライアント。アップロード回数を数える。
pub(crate) struct StubStorageClient {
    agent: Did,
    outcome: StubOutcome,
    uploads: Arc<AtomicUsize>,
}

impl StubStorageClient {
    pub(crate) fn new(agent: Did, outcome: StubOutcome, uploads: Arc<AtomicUsize>) -> Self {
        Self {
            agent,
            outcome,
            uploads,
        }
    }
}

#[async_trait::async_trait]
impl StorageClient for StubStorageClient {
    fn agent(&self) -> &Did {
        &self.agent
    }

    async fn add_space(&mut self, proof: &Delegation) -> Result<Did, GatewayError> {
        proof
            .space()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }

    fn set_current_space(&mut self, _space: &Did) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn upload_file(&self, blob: Bytes) -> Result<Cid, GatewayError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            StubOutcome::Ok => Ok(Cid::of(&blob)),
            StubOutcome::Fail(message) => Err(GatewayError::Upstream(message.to_string())),
        }
    }
}

/// スペース鍵から委任を受けたテスト用の認証情報
pub(crate) fn test_credentials() -> Arc<Credentials> {
    let space = AgentSigner::generate();
    let agent = AgentSigner::generate();
    let proof = Delegation::issue(
        &space,
        agent.did(),
        vec![Capability::new(space.did(), "upload/*")],
        None,
    )
    .unwrap();
    Arc::new(Credentials {
        signer: agent,
        proof,
        space: space.did().clone(),
    })
}

/// 任意のセッションセルでGatewayStateを組み立てる
pub(crate) fn state_with_sessions(
    upload_dir: &Path,
    credentials: &Credentials,
    sessions: SessionCell,
    max_upload_size: u64,
) -> Arc<GatewayState> {
    Arc::new(GatewayState {
        sessions,
        upload_dir: upload_dir.to_path_buf(),
        max_upload_size,
        agent: credentials.signer.did().clone(),
        space: credentials.space.clone(),
    })
}

/// スタブクライアントでセッションを構築するセル
pub(crate) fn stub_sessions(
    credentials: &Arc<Credentials>,
    outcome: StubOutcome,
    uploads: &Arc<AtomicUsize>,
) -> SessionCell {
    let credentials = credentials.clone();
    let uploads = uploads.clone();
    SessionCell::new(move || {
        let credentials = credentials.clone();
        let client =
            StubStorageClient::new(credentials.signer.did().clone(), outcome, uploads.clone());
        async move { StorageSession::establish(&credentials, Box::new(client)).await }
    })
}

/// スタブクライアントを使うGatewayState。アップロード回数のカウンタも返す。
pub(crate) fn test_state(
    upload_dir: &Path,
    outcome: StubOutcome,
) -> (Arc<GatewayState>, Arc<AtomicUsize>) {
    let credentials = test_credentials();
    let uploads = Arc::new(AtomicUsize::new(0));
    let sessions = stub_sessions(&credentials, outcome, &uploads);
    let state = state_with_sessions(upload_dir, &credentials, sessions, TEST_MAX_UPLOAD_SIZE);
    (state, uploads)
}

/// ルーターを127.0.0.1の空きポートで起動し、ベースURLを返す
pub(crate) async fn start_gateway(state: Arc<GatewayState>) -> String {
    let app = crate::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    format!("http://{addr}")
}

/// ディレクトリ内に残っているファイル数
pub(crate) fn leftover_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
