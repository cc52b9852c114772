//! JSON-RPC Client (Alchemy)
//!
//! # Interview Q&A
//!
//! Q: 어떤 에러를 재시도하는가?
//! A: 일시적인 장애만
//!    - 네트워크/DNS/타임아웃 (transport)
//!    - HTTP 5xx
//!
//!    4xx, JSON 파싱 실패, JSON-RPC `error` 응답은 같은 요청을 다시 보내도
//!    결과가 바뀌지 않으므로 즉시 실패
//!
//! Q: 백오프 공식은?
//! A: `base * 2^attempt` (기본 base 10초, 최대 3회 재시도)
//!
//!    attempt 0 실패 → 10s, 1 → 20s, 2 → 40s, 3 → 에러 반환
//!
//!    백오프 sleep 중에 요청이 취소되면 재시도 소진 에러가 아니라
//!    `WalletError::Canceled`를 바로 반환

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::WalletError;

/// 재시도/타임아웃 설정
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 첫 시도 이후 추가 시도 횟수
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// 시도당 HTTP deadline
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(10),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// `attempt`번째 실패 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a P,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

/// 재시도를 포함한 JSON-RPC 클라이언트
///
/// 호출 간 상태 없음 (재시도 설정만 보유)
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            http,
            url: url.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// JSON-RPC 호출
    ///
    /// `result`를 `R`로 역직렬화해서 반환
    pub async fn call<P, R>(
        &self,
        method: &str,
        params: &P,
        cancel: &CancellationToken,
    ) -> Result<R, WalletError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                outcome = self.send_once(&request) => outcome,
                _ = cancel.cancelled() => return Err(WalletError::Canceled),
            };

            let err = match outcome {
                Ok(value) => {
                    return serde_json::from_value(value)
                        .map_err(|e| WalletError::Protocol(format!("unmarshal rpc result: {}", e)));
                }
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.policy.max_retries {
                tracing::error!(method, attempt, error = %err, "rpc call failed");
                return Err(err);
            }

            let delay = self.policy.backoff(attempt);
            tracing::warn!(
                method,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "rpc call failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(WalletError::Canceled),
            }
            attempt += 1;
        }
    }

    /// 단일 시도: HTTP → status → JSON-RPC envelope
    async fn send_once<P: Serialize>(
        &self,
        request: &JsonRpcRequest<'_, P>,
    ) -> Result<serde_json::Value, WalletError> {
        let resp = self
            .http
            .post(&self.url)
            .timeout(self.policy.timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            return Err(WalletError::UpstreamStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let envelope: JsonRpcResponse = serde_json::from_slice(&body)
            .map_err(|e| WalletError::Protocol(format!("unmarshal rpc response: {}", e)))?;

        if let Some(err) = envelope.error {
            return Err(WalletError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        match envelope.result {
            Some(serde_json::Value::Null) | None => {
                Err(WalletError::Protocol("empty rpc result".to_string()))
            }
            Some(value) => Ok(value),
        }
    }
}
