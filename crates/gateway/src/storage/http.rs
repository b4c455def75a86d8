//! # HTTPアップロードサービス実装
//!
//! アップロードごとに `upload/add` の呼び出し（Invocation）を署名し、
//! プルーフを添付してアップロードサービスへ送る。
//!
//! ## プロトコル
//! ```text
//! POST {endpoint}/upload
//! Authorization: Bearer <invocation>
//! Content-Type: application/octet-stream
//! <bytes>
//!
//! 200 {"root": "<cid>"}
//! 4xx/5xx {"error": {"message": "..."}}
//! ```

use bytes::Bytes;
use serde::Deserialize;
use wall_crypto::ucan::UPLOAD_ADD;
use wall_crypto::{AgentSigner, Cid, Delegation, Did, Invocation};

use super::{SpaceRegistry, StorageClient};
use crate::error::GatewayError;

/// アップロードサービスの成功レスポンス
#[derive(Debug, Deserialize)]
struct UploadReceipt {
    root: String,
}

/// アップロードサービスのエラーレスポンス
#[derive(Debug, Deserialize)]
struct ServiceError {
    error: ServiceErrorBody,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: String,
}

/// アップロードサービスに接続するストレージクライアント。
pub struct HttpStorageClient {
    endpoint: String,
    signer: AgentSigner,
    http_client: reqwest::Client,
    spaces: SpaceRegistry,
}

impl HttpStorageClient {
    pub fn new(endpoint: impl Into<String>, signer: AgentSigner) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            signer,
            http_client,
            spaces: SpaceRegistry::default(),
        })
    }
}

#[async_trait::async_trait]
impl StorageClient for HttpStorageClient {
    fn agent(&self) -> &Did {
        self.signer.did()
    }

    async fn add_space(&mut self, proof: &Delegation) -> Result<Did, GatewayError> {
        self.spaces.add(self.signer.did(), proof)
    }

    fn set_current_space(&mut self, space: &Did) -> Result<(), GatewayError> {
        self.spaces.set_current(space)
    }

    async fn upload_file(&self, blob: Bytes) -> Result<Cid, GatewayError> {
        let (space, proof) = self.spaces.authorize(UPLOAD_ADD)?;
        let cid = Cid::of(&blob);

        let invocation = Invocation::sign(
            &self.signer,
            None,
            UPLOAD_ADD,
            space,
            serde_json::json!({ "root": cid.to_string(), "size": blob.len() }),
            std::slice::from_ref(proof),
        )
        .map_err(|e| GatewayError::Upstream(format!("failed to sign invocation: {e}")))?;

        let url = format!("{}/upload", self.endpoint);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(invocation.encode())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(blob)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("upload request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to read upload response: {e}")))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ServiceError>(&body) {
                Ok(err) => err.error.message,
                Err(_) if body.trim().is_empty() => format!("upload service returned HTTP {status}"),
                Err(_) => body,
            };
            return Err(GatewayError::Upstream(message));
        }

        let receipt: UploadReceipt = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Upstream(format!("malformed upload response: {e}")))?;
        let root = receipt
            .root
            .parse::<Cid>()
            .map_err(|e| GatewayError::Upstream(format!("upload service returned {e}")))?;

        if root != cid {
            return Err(GatewayError::Upstream(format!(
                "upload service stored {root}, expected {cid}"
            )));
        }
        Ok(root)
    }
}
