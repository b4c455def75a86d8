//! # Upload Wall クライアント
//!
//! Gatewayへファイルをアップロードし、結果のCIDを一覧として保持する。
//!
//! ## 構成
//! | モジュール | 内容 |
//! |-----------|------|
//! | `api` | Gateway APIクライアント |
//! | `controller` | アップロード状態（Idle / Uploading）と履歴の管理 |
//! | `format` | サイズ・経過時間の表示用整形 |

pub mod api;
pub mod controller;
pub mod format;

pub use api::{HttpUploadApi, UploadApi, DEFAULT_API_URL, DEFAULT_TIMEOUT};
pub use controller::{Notification, SelectedFile, UploadController, UploadPhase};

/// 汎用のアップロード失敗メッセージ（サーバーが理由を返さない場合）
pub const UPLOAD_FAILED: &str = "Upload failed";

/// クライアントのエラー型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// 別のアップロードが進行中
    #[error("an upload is already in progress")]
    Busy,
    /// リクエストがタイムアウトした
    #[error("Upload timed out")]
    Timeout,
    /// サーバーのエラーメッセージ、または通信の失敗
    #[error("{0}")]
    Failed(String),
    /// ローカルファイルの読み込み失敗
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}
