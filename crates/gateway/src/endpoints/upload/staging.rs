//! # 一時ファイルへのステージング
//!
//! multipartのファイルパートをアップロードディレクトリ内の一意な一時ファイルへ
//! 書き出す。一時ファイルは `StagedUpload` の破棄時に削除される。

use std::path::Path;

use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::GatewayError;

/// 一時ファイルに書き出されたアップロード。
#[derive(Debug)]
pub struct StagedUpload {
    file: Option<NamedTempFile>,
    filename: String,
    size: u64,
}

impl StagedUpload {
    /// ファイルパートを `dir` 内の一時ファイルへ書き出す。
    ///
    /// 書き込み量が `max_size` を超えた時点で中断する（一時ファイルは削除される）。
    pub async fn from_field(
        mut field: Field<'_>,
        filename: String,
        dir: &Path,
        max_size: u64,
    ) -> Result<Self, GatewayError> {
        // 作成とオープンはブロッキングI/Oのためランタイムのワーカー外で行う
        let dir = dir.to_path_buf();
        let (temp, handle) = tokio::task::spawn_blocking(move || {
            let temp = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(dir)?;
            let handle = temp.reopen()?;
            Ok::<_, std::io::Error>((temp, handle))
        })
        .await
        .map_err(|e| GatewayError::Io(format!("staging task failed: {e}")))??;
        let mut staged = Self {
            file: Some(temp),
            filename,
            size: 0,
        };

        let mut writer = tokio::fs::File::from_std(handle);
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            let size = staged.size + chunk.len() as u64;
            if size > max_size {
                return Err(GatewayError::PayloadTooLarge(format!(
                    "file exceeds the maximum upload size of {max_size} bytes"
                )));
            }
            writer.write_all(&chunk).await?;
            staged.size = size;
        }
        writer.flush().await?;

        Ok(staged)
    }

    /// アップロード時の元のファイル名
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    /// 書き出した内容を全て読み込む。
    pub async fn read_all(&self) -> Result<Vec<u8>, GatewayError> {
        let path = self.temp()?.path();
        Ok(tokio::fs::read(path).await?)
    }

    fn temp(&self) -> Result<&NamedTempFile, GatewayError> {
        self.file
            .as_ref()
            .ok_or_else(|| GatewayError::Io("staged file already released".to_string()))
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let path = file.path().to_path_buf();
        // Dropは同期処理のため削除（unlink一回）はこのスレッドで行う。
        // 応答前に一時ファイルが消えていることをテストが前提にしている。
        // 削除に失敗してもリクエストの結果は変えない
        if let Err(e) = file.close() {
            tracing::warn!(path = %path.display(), error = %e, "一時ファイルの削除に失敗しました");
        }
    }
}

/// multipartの読み取りエラーを変換する。本文サイズ上限による中断は413。
pub(crate) fn multipart_error(e: MultipartError) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge(e.body_text())
    } else {
        GatewayError::BadRequest(e.body_text())
    }
}
