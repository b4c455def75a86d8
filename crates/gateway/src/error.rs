//! # Gateway エラー型
//!
//! リクエスト境界で `{"ok": false, "error": ...}` に変換される。

use axum::http::StatusCode;
use axum::Json;
use wall_types::{ErrorResponse, NO_FILE_UPLOADED};

/// Gatewayエラー型。
///
/// 共有セッションの初期化結果を複数のリクエストへ配るため `Clone` を実装する。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// 認証情報・プルーフ・スペースIDの欠落または不正。運用者の対応が必要
    #[error("configuration error: {0}")]
    Config(String),
    /// ファイルパートが無いリクエスト
    #[error("{}", NO_FILE_UPLOADED)]
    NoFile,
    /// 不正なリクエスト（multipartの破損等）
    #[error("{0}")]
    BadRequest(String),
    /// アップロードサイズ超過
    #[error("{0}")]
    PayloadTooLarge(String),
    /// ストレージネットワーク側の失敗。メッセージはそのままクライアントに返す
    #[error("{0}")]
    Upstream(String),
    /// 一時ファイルの読み書き失敗
    #[error("local I/O error: {0}")]
    Io(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoFile | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Config(_) | GatewayError::Upstream(_) | GatewayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 呼び出し側の誤りか（サーバー障害としてログに残さない）。
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Io(e.to_string())
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
