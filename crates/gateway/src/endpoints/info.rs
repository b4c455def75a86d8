//! # GET /api/info
//!
//! アップロード先の確認用。秘密情報は含まない。

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use wall_types::SpaceInfo;

use crate::config::GatewayState;

/// GET /api/info — エージェントDID・スペースDID・セッションの状態を返す。
pub async fn handle_info(State(state): State<Arc<GatewayState>>) -> Json<SpaceInfo> {
    Json(SpaceInfo {
        ok: true,
        agent: state.agent.to_string(),
        space: state.space.to_string(),
        ready: state.sessions.is_ready(),
    })
}
