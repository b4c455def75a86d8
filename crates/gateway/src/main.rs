//! # Upload Wall Gateway
//!
//! ブラウザ等から受け取ったファイルをストレージネットワークへ転送し、
//! コンテンツ識別子（CID）をJSONで返すHTTPサーバー。
//!
//! ## 責務
//! - multipartで受け取った `file` パートの一時保存と確実な削除
//! - 委任されたケイパビリティによるストレージスペースへの書き込み
//! - ストレージセッションの遅延構築（プロセス内で一度だけ）
//!
//! ## 構成
//! | モジュール | 内容 |
//! |-----------|------|
//! | `config` | 環境変数からの設定読み込み、共有状態 |
//! | `error` | エラー型とJSONレスポンスへの変換 |
//! | `session` | ストレージセッションと一度だけ構築するセル |
//! | `storage` | ストレージクライアントの抽象とHTTP/メモリ実装 |
//! | `endpoints` | `/api/upload`, `/api/info` |

mod config;
mod endpoints;
mod error;
mod session;
mod storage;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use wall_types::{INFO_PATH, UPLOAD_PATH};

use crate::config::{GatewayConfig, GatewayState};
use crate::endpoints::{handle_info, handle_upload};
use crate::session::SessionCell;

/// multipartの境界・ヘッダー分の余裕
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// ルーターを構築する。
pub(crate) fn build_router(state: Arc<GatewayState>) -> Router {
    let body_limit = usize::try_from(state.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route(UPLOAD_PATH, post(handle_upload))
        .route(INFO_PATH, get(handle_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// エントリポイント
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env が無くてもよい
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 認証情報が揃っていなければ起動しない
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "設定の読み込みに失敗しました");
            return Err(e.into());
        }
    };

    std::fs::create_dir_all(&config.upload_dir)?;

    let sessions = SessionCell::from_credentials(config.credentials.clone(), config.backend.clone());
    let state = Arc::new(GatewayState::new(&config, sessions));

    tracing::info!(
        agent = %state.agent,
        space = %state.space,
        backend = ?config.backend,
        upload_dir = %config.upload_dir.display(),
        max_upload_size = config.max_upload_size,
        "Gateway設定を読み込みました"
    );

    // 初回リクエストを待たずにセッションを構築しておく。失敗しても次のリクエストで再試行される
    {
        let state = state.clone();
        tokio::spawn(async move {
            let _ = state.sessions.get().await;
        });
    }

    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Gatewayを {} で起動します", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gatewayを停止しました");
    Ok(())
}

/// Ctrl-C または SIGTERM を待つ。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl-Cハンドラを登録できませんでした");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERMハンドラを登録できませんでした");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("終了シグナルを受信しました");
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
