//! # POST /api/upload
//!
//! 1. `file` パートを一時ファイルへ書き出す（無ければ400、ストレージには触れない）
//! 2. ストレージセッションを取得（未構築なら構築）
//! 3. 一時ファイルの内容を読み込む
//! 4. ストレージへアップロード
//! 5. 一時ファイルはどの経路でも削除される（`StagedUpload` の破棄時）
//! 6. 200 `{"ok": true, "cid"}` または `{"ok": false, "error"}`

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use wall_types::{UploadResponse, FILE_FIELD};

use super::staging::{multipart_error, StagedUpload};
use crate::config::GatewayState;
use crate::error::GatewayError;

/// POST /api/upload — ファイルをストレージへ転送しCIDを返す。
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, GatewayError> {
    match upload(&state, multipart).await {
        Ok(response) => Ok(Json(response)),
        Err(e) if e.is_client_error() => {
            tracing::debug!(error = %e, "アップロードリクエストを拒否しました");
            Err(e)
        }
        Err(e) => {
            tracing::error!(error = %e, "アップロードに失敗しました");
            Err(e)
        }
    }
}

async fn upload(
    state: &GatewayState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadResponse, GatewayError> {
    // multipartでないリクエストはファイル無しとして扱う
    let Ok(mut multipart) = multipart else {
        return Err(GatewayError::NoFile);
    };
    let staged = stage_file(state, &mut multipart)
        .await?
        .ok_or(GatewayError::NoFile)?;

    let session = state.sessions.get().await?;
    let blob = staged.read_all().await?;
    let cid = session.upload(Bytes::from(blob)).await?;

    tracing::info!(
        filename = %staged.filename(),
        size = staged.size(),
        cid = %cid,
        space = %session.space(),
        "ファイルをアップロードしました"
    );
    Ok(UploadResponse::new(cid.to_string()))
}

/// 最初の `file` パートを書き出す。他のフィールドは読み飛ばす。
async fn stage_file(
    state: &GatewayState,
    multipart: &mut Multipart,
) -> Result<Option<StagedUpload>, GatewayError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // ファイル未選択のフォーム送信は filename="" になる
        let Some(filename) = field.file_name().filter(|name| !name.is_empty()) else {
            continue;
        };
        let filename = filename.to_string();

        let staged =
            StagedUpload::from_field(field, filename, &state.upload_dir, state.max_upload_size)
                .await?;
        if let Some(path) = staged.path() {
            tracing::debug!(path = %path.display(), size = staged.size(), "一時ファイルに書き出しました");
        }
        return Ok(Some(staged));
    }
    Ok(None)
}
