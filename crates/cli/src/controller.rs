//! # アップロードコントローラー
//!
//! ```text
//! Idle ──upload()──▶ Uploading ──成功──▶ Idle（履歴の先頭に追加、成功通知）
//!                        └─────失敗──▶ Idle（履歴は変更しない、エラー通知）
//! ```
//!
//! `Uploading` 中の `upload()` はサーバーに接続せず `ClientError::Busy` を返す。

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;
use wall_types::UploadedFileRecord;

use crate::api::UploadApi;
use crate::ClientError;

/// アップロード対象として選ばれたファイル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// ファイルを読み込む。ファイル名はパスの末尾要素。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let io_error = |message: String| ClientError::Io {
            path: path.display().to_string(),
            message,
        };

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| io_error("not a file path".to_string()))?;
        let bytes = std::fs::read(path).map_err(|e| io_error(e.to_string()))?;
        Ok(Self::new(filename, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Idle,
    Uploading,
}

/// 一度だけ表示される通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success { filename: String, cid: String },
    Error(String),
}

#[derive(Debug, Default)]
struct ControllerState {
    phase: UploadPhase,
    /// 新しい順
    files: Vec<UploadedFileRecord>,
    notification: Option<Notification>,
}

/// アップロード状態と履歴を管理する。`Arc` で共有して並行に呼び出せる。
pub struct UploadController<A> {
    api: A,
    state: Mutex<ControllerState>,
}

impl<A: UploadApi> UploadController<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.lock().phase
    }

    pub fn is_uploading(&self) -> bool {
        self.phase() == UploadPhase::Uploading
    }

    /// アップロード済みファイル（新しい順）
    pub fn files(&self) -> Vec<UploadedFileRecord> {
        self.lock().files.clone()
    }

    /// 保留中の通知を取り出す。取り出した通知は消える。
    pub fn take_notification(&self) -> Option<Notification> {
        self.lock().notification.take()
    }

    /// ファイルをアップロードし、成功すれば履歴に追加する。
    pub async fn upload(&self, file: SelectedFile) -> Result<UploadedFileRecord, ClientError> {
        {
            let mut state = self.lock();
            if state.phase == UploadPhase::Uploading {
                return Err(ClientError::Busy);
            }
            state.phase = UploadPhase::Uploading;
            state.notification = None;
        }
        // 以降はどの経路で抜けても Idle に戻る
        let _idle = ResetToIdle(&self.state);

        let result = self.api.upload(&file).await;

        let mut state = self.lock();
        match result {
            Ok(cid) => {
                let record = UploadedFileRecord {
                    id: Uuid::new_v4(),
                    cid: cid.clone(),
                    size: file.size(),
                    filename: file.filename.clone(),
                    uploaded_at: Utc::now(),
                };
                state.files.insert(0, record.clone());
                state.notification = Some(Notification::Success {
                    filename: file.filename,
                    cid,
                });
                Ok(record)
            }
            Err(e) => {
                state.notification = Some(Notification::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ResetToIdle<'a>(&'a Mutex<ControllerState>);

impl Drop for ResetToIdle<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).phase = UploadPhase::Idle;
    }
}
