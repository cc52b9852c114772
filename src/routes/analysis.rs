//! Wallet Analysis Endpoint (streaming)
//!
//! # Interview Q&A
//!
//! Q: 응답 형식은?
//! A: `text/plain; charset=utf-8` + chunked
//!    - LLM chunk가 도착하는 즉시 flush (버퍼링 없음)
//!    - 스트림 시작 후 실패하면 에러 payload 없이 그냥 종료
//!      (이미 200 헤더가 나갔으므로)
//!
//! Q: 스트림 시작 전 실패는?
//! A: 일반 JSON 에러 (UNSUPPORTED_CHAIN 400, 그 외 500)
//!
//! Q: 분석 결과는 어디에 남는가?
//! A: producer 종료 후 별도 task가 `analysis_results`에 기록
//!    (요청 ID, 모델, 프롬프트 해시, 최종 상태, 전체 텍스트)

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::wallet::ChainQuery;
use crate::db::AnalysisRecord;
use crate::error::ApiError;
use crate::services::{build_user_prompt, prompt_hash, RelayHandle, StreamingRelay, SYSTEM_PROMPT};
use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// GET /api/v1/wallet/:address/analyze
pub async fn analyze_wallet(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<ChainQuery>,
) -> Result<Response, ApiError> {
    let networks = query.networks()?;
    let request_id = Uuid::new_v4().to_string();

    // 스냅샷 조회 중 연결이 끊기면 guard가 cancel
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let snapshot = state
        .wallet_service
        .snapshot(&address, &networks, &cancel)
        .await?;
    // 이후 취소는 응답 body(consumer)의 DropGuard가 담당
    guard.disarm();

    let user_prompt = build_user_prompt(&snapshot);
    let hash = prompt_hash(&user_prompt);
    tracing::info!(
        request_id = %request_id,
        address = %address,
        chain = %query.chain,
        prompt_hash = %hash,
        "starting wallet analysis"
    );

    let RelayHandle { consumer, producer } = StreamingRelay::start(
        state.agent.clone(),
        SYSTEM_PROMPT.to_string(),
        user_prompt,
        cancel,
    );

    let record = AnalysisRecord {
        wallet_address: address,
        chain: query.chain.clone(),
        request_id: request_id.clone(),
        model_name: state.agent.model_name().to_string(),
        prompt_hash: hash,
        status: String::new(),
        raw_response: String::new(),
    };
    let repo = state.repo.clone();
    tokio::spawn(async move {
        let outcome = match producer.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(target: "audit", request_id = %record.request_id, error = %err, "analysis producer panicked");
                return;
            }
        };

        let record = AnalysisRecord {
            status: outcome.state.as_str().to_string(),
            raw_response: outcome.full_text,
            ..record
        };
        if let Err(err) = repo.insert_analysis_result(&record).await {
            tracing::error!(
                target: "audit",
                request_id = %record.request_id,
                error = %err,
                "failed to store analysis result"
            );
        }
    });

    let request_id = HeaderValue::from_str(&request_id).map_err(|_| ApiError::InternalError)?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::TRANSFER_ENCODING, "chunked")
        .header(REQUEST_ID_HEADER, request_id)
        .body(Body::from_stream(consumer.into_stream()))
        .map_err(|err| {
            tracing::error!(error = %err, "failed to build streaming response");
            ApiError::InternalError
        })
}
