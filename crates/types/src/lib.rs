//! # Upload Wall 共有型定義
//!
//! Gateway（アップロードサーバー）とクライアントの間でやり取りされる
//! JSONボディをRust構造体として提供する。
//!
//! ## レスポンス形式
//! - 成功: `{"ok": true, "cid": "<CID>"}`
//! - 失敗: `{"ok": false, "error": "<メッセージ>"}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ルーティング定数
// ---------------------------------------------------------------------------

/// アップロードエンドポイントのパス
pub const UPLOAD_PATH: &str = "/api/upload";

/// スペース情報エンドポイントのパス
pub const INFO_PATH: &str = "/api/info";

/// multipartフォームでファイルを運ぶフィールド名
pub const FILE_FIELD: &str = "file";

/// ファイルパートが無いリクエストに返すエラーメッセージ
pub const NO_FILE_UPLOADED: &str = "No file uploaded";

// ---------------------------------------------------------------------------
// /api/upload
// ---------------------------------------------------------------------------

/// /api/upload 成功レスポンス。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// 常に `true`
    pub ok: bool,
    /// ストレージネットワークが返したコンテンツ識別子
    pub cid: String,
}

impl UploadResponse {
    /// 成功レスポンスを構築する。
    pub fn new(cid: impl Into<String>) -> Self {
        Self {
            ok: true,
            cid: cid.into(),
        }
    }

    /// `ok: true` かつ空でないCIDを持つ場合のみ有効な結果とみなす。
    pub fn is_valid(&self) -> bool {
        self.ok && !self.cid.is_empty()
    }
}

/// 全エンドポイント共通のエラーエンベロープ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 常に `false`
    pub ok: bool,
    /// 呼び出し元に表示するメッセージ
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// /api/info
// ---------------------------------------------------------------------------

/// /api/info レスポンス。
///
/// アップロード先のスペースとGatewayのエージェントDIDを公開する。
/// どちらも秘密情報ではない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceInfo {
    pub ok: bool,
    /// Gatewayが署名に使うエージェントのDID
    pub agent: String,
    /// アップロードが帰属するスペースのDID
    pub space: String,
    /// ストレージセッションが構築済みか（初回アップロード前は `false`）
    pub ready: bool,
}

// ---------------------------------------------------------------------------
// クライアント側レコード
// ---------------------------------------------------------------------------

/// アップロード済みファイルの記録。クライアントのメモリ内にのみ保持される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileRecord {
    /// クライアントが生成した識別子
    pub id: Uuid,
    /// コンテンツ識別子
    pub cid: String,
    /// 元のファイル名
    pub filename: String,
    /// ファイルサイズ（バイト）
    pub size: u64,
    /// アップロード完了時刻
    pub uploaded_at: DateTime<Utc>,
}
