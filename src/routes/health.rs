//! Health Check Endpoint
//!
//! # Interview Q&A
//!
//! Q: Health check 엔드포인트는 왜 필요한가?
//! A: 3가지 용도
//!    1. 로드밸런서 헬스체크 (ALB, nginx)
//!    2. Kubernetes liveness/readiness probe
//!    3. 모니터링 시스템 연동
//!
//! Q: /health와 /ready의 차이는?
//! A: /health는 항상 200 (상태를 body로 보고),
//!    /ready는 DB 또는 Redis가 2초 안에 응답하지 않으면 503 (트래픽 차단용)

use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// readiness 확인 deadline
const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check 응답
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DependencyStatus,
    pub cache: DependencyStatus,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct DependencyStatus {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn probe<F, E>(check: F) -> DependencyStatus
where
    F: std::future::Future<Output = Result<(), E>>,
{
    let start = Instant::now();
    match check.await {
        Ok(()) => DependencyStatus {
            connected: true,
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(_) => DependencyStatus {
            connected: false,
            latency_ms: None,
        },
    }
}

/// GET /health
///
/// 서버 및 의존성 상태 확인
pub async fn health_check(
    State(state): State<AppState>,
) -> Json<HealthResponse> {
    let database = probe(state.repo.health_check()).await;
    let cache = probe(state.wallet_service.cache().ping()).await;

    let healthy = database.connected && cache.connected;

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        cache,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /ready
pub async fn readiness(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadyResponse>) {
    let not_ready = |error: String| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse { status: "not ready".to_string(), error: Some(error) }),
        )
    };

    match tokio::time::timeout(READY_TIMEOUT, state.repo.health_check()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return not_ready(format!("database: {}", err)),
        Err(_) => return not_ready("database: timed out".to_string()),
    }

    match tokio::time::timeout(READY_TIMEOUT, state.wallet_service.cache().ping()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return not_ready(format!("redis: {}", err)),
        Err(_) => return not_ready("redis: timed out".to_string()),
    }

    (
        StatusCode::OK,
        Json(ReadyResponse { status: "ready".to_string(), error: None }),
    )
}
