//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/ready` - readiness (DB/Redis)
//! - `/api/v1/wallet/:address/summary` - 지갑 스냅샷 (JSON)
//! - `/api/v1/wallet/:address/analyze` - AI 리스크 분석 (chunked text)

pub mod health;
pub mod wallet;
pub mod analysis;

use axum::{routing::get, Router};

use crate::AppState;

/// 라우터 생성 (미들웨어는 main에서 추가)
///
/// # Route Structure
///
/// ```text
/// GET  /health                            - 서버 상태 확인
/// GET  /ready                             - 의존성 준비 상태
///
/// GET  /api/v1/wallet/:address/summary    - 스냅샷 (?chain=eth|btc|trx|sol)
/// GET  /api/v1/wallet/:address/analyze    - 분석 스트리밍
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))

        // Wallet
        .route("/api/v1/wallet/:address/summary", get(wallet::get_wallet_summary))
        .route("/api/v1/wallet/:address/analyze", get(analysis::analyze_wallet))

        // 상태 주입
        .with_state(state)
}
