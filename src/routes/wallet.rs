//! Wallet Summary Endpoint
//!
//! GET /api/v1/wallet/:address/summary?chain=eth

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::types::{networks_for_chain, WalletSnapshot};
use crate::AppState;

/// `?chain=` 쿼리
#[derive(Debug, Deserialize)]
pub struct ChainQuery {
    #[serde(default)]
    pub chain: String,
}

impl ChainQuery {
    /// 지원 체인 → network 목록, 아니면 400
    pub fn networks(&self) -> Result<Vec<String>, ApiError> {
        networks_for_chain(&self.chain).ok_or_else(|| ApiError::UnsupportedChain(self.chain.clone()))
    }
}

/// GET /api/v1/wallet/:address/summary
///
/// 주소 형식은 검증하지 않음
pub async fn get_wallet_summary(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ChainQuery>,
) -> Result<Json<WalletSnapshot>, ApiError> {
    let networks = query.networks()?;

    // 클라이언트가 끊겨 핸들러 future가 drop되면 진행 중인 RPC 재시도도 중단
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let snapshot = state
        .wallet_service
        .snapshot(&address, &networks, &cancel)
        .await?;

    Ok(Json(snapshot))
}
