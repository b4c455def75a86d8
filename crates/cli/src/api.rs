//! # Gateway APIクライアント
//!
//! `POST /api/upload` にファイルを `file` パートとして送り、CIDを受け取る。
//!
//! ## 失敗の扱い
//! - 2xx以外: レスポンスの `error`、無ければ `"Upload failed"`
//! - 通信エラー: そのメッセージ
//! - JSONとして読めない、または `ok` でないか `cid` が空: 失敗
//! - タイムアウト: `ClientError::Timeout`

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use wall_types::{SpaceInfo, FILE_FIELD, INFO_PATH, UPLOAD_PATH};

use crate::controller::SelectedFile;
use crate::{ClientError, UPLOAD_FAILED};

/// GatewayのベースURL既定値
pub const DEFAULT_API_URL: &str = "http://localhost:8787";
/// リクエストのタイムアウト既定値
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// アップロードAPI。成功時はCIDを返す。
#[async_trait::async_trait]
pub trait UploadApi: Send + Sync {
    async fn upload(&self, file: &SelectedFile) -> Result<String, ClientError>;
}

/// 成功・失敗のどちらのレスポンスも受けられる形
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadReply {
    ok: bool,
    cid: Option<String>,
    error: Option<String>,
}

/// reqwestによる `UploadApi` 実装。
#[derive(Debug, Clone)]
pub struct HttpUploadApi {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpUploadApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/info — Gatewayのエージェントとスペースを取得する。
    pub async fn info(&self) -> Result<SpaceInfo, ClientError> {
        let response = self
            .http_client
            .get(format!("{}{INFO_PATH}", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ClientError::Failed(format!(
                "gateway returned HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Failed(format!("malformed info response: {e}")))
    }
}

#[async_trait::async_trait]
impl UploadApi for HttpUploadApi {
    async fn upload(&self, file: &SelectedFile) -> Result<String, ClientError> {
        let part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
        let form = Form::new().part(FILE_FIELD, part);

        let response = self
            .http_client
            .post(format!("{}{UPLOAD_PATH}", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<UploadReply>(&body)
                .ok()
                .and_then(|reply| reply.error)
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| UPLOAD_FAILED.to_string());
            return Err(ClientError::Failed(message));
        }

        let reply: UploadReply = serde_json::from_str(&body)
            .map_err(|e| ClientError::Failed(format!("malformed response: {e}")))?;
        match reply.cid {
            Some(cid) if reply.ok && !cid.is_empty() => Ok(cid),
            _ => Err(ClientError::Failed(
                reply
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| UPLOAD_FAILED.to_string()),
            )),
        }
    }
}

fn transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Failed(e.to_string())
    }
}
