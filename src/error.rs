//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.
//!
//! Two layers:
//! - `WalletError`: 파이프라인 내부 에러 (RPC, 집계, 캐시, 영속화, 스트림)
//! - `ApiError`: HTTP 응답으로 변환되는 에러

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// 지갑 데이터 파이프라인 에러
///
/// # Retry Policy
///
/// - `Transport`: 네트워크/DNS/타임아웃 → 재시도
/// - `UpstreamStatus`: 5xx만 재시도, 나머지는 즉시 실패
/// - 그 외 전부 terminal
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {status}")]
    UpstreamStatus { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC 레벨 에러 (`error` 필드)
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("operation canceled")]
    Canceled,
}

impl WalletError {
    /// 재시도 가능한 에러인지 판단
    pub fn is_retryable(&self) -> bool {
        match self {
            WalletError::Transport(_) => true,
            WalletError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        WalletError::Transport(err.to_string())
    }
}

impl From<redis::RedisError> for WalletError {
    fn from(err: redis::RedisError) -> Self {
        WalletError::Cache(err.to_string())
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        WalletError::Persistence(err.to_string())
    }
}

/// API 에러 타입
///
/// 민감한 내부 정보(업스트림 응답 바디 등)는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    // ============ 500 Internal Server Error ============
    /// 스트림 시작 전 파이프라인 실패 (RPC, 파싱, 취소 등)
    #[error("Internal server error")]
    InternalError,
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::UnsupportedChain(chain) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_CHAIN",
                "the chain is not supported yet".to_string(),
                Some(chain.clone()),
            ),

            // 5xx 서버 에러
            ApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// 파이프라인 에러는 전부 generic internal error로 축약
impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        tracing::error!(error = %err, "wallet pipeline failed");
        ApiError::InternalError
    }
}
