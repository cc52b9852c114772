//! Streaming Relay
//!
//! AI 분석 결과를 생성(producer)과 전송(consumer)으로 분리해 중계한다.
//!
//! # Interview Q&A
//!
//! Q: 왜 producer / consumer를 분리했는가?
//! A: 두 속도가 다름
//!    - producer: LLM chunk 수신 → bounded channel(100)에 push
//!    - consumer: channel에서 꺼내 HTTP chunked 응답으로 즉시 flush
//!    - 채널이 가득 차면 producer가 대기 (backpressure)
//!
//! Q: 클라이언트가 연결을 끊으면?
//! A: 공유 `CancellationToken`
//!    - axum이 응답 body를 drop → DropGuard가 token cancel
//!    - consumer는 즉시 종료 (producer 종료를 기다리지 않음)
//!    - producer는 같은 token을 보고 스스로 정리
//!
//! Q: 실패 시 부분 결과는?
//! A: 응답에는 더 이상 쓰지 않지만 producer가 누적한 전체 텍스트는
//!    `RelayOutcome`으로 반환되어 감사 로그에 남음
//!
//! # State Machine
//!
//! ```text
//! Start → Running → Completed
//!                 → Failed
//!                 → Canceled
//! ```

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::agent::AnalysisAgent;

/// relay 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Start,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl RelayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::Start => "start",
            RelayState::Running => "running",
            RelayState::Completed => "completed",
            RelayState::Failed => "failed",
            RelayState::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Completed | RelayState::Failed | RelayState::Canceled)
    }
}

/// producer 종료 결과 (감사 로그용)
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub state: RelayState,
    /// 누적된 전체 텍스트 (실패/취소 시 부분 결과)
    pub full_text: String,
    pub error: Option<String>,
}

/// 실행 중인 relay
pub struct RelayHandle {
    pub consumer: RelayConsumer,
    pub producer: JoinHandle<RelayOutcome>,
}

pub struct StreamingRelay;

impl StreamingRelay {
    pub const CHANNEL_CAPACITY: usize = 100;

    /// relay 시작
    ///
    /// producer는 별도 task로 spawn, consumer는 호출자가 소비
    pub fn start(
        agent: Arc<dyn AnalysisAgent>,
        system_prompt: String,
        user_prompt: String,
        cancel: CancellationToken,
    ) -> RelayHandle {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(RelayState::Start);

        let producer = tokio::spawn(produce(
            agent,
            system_prompt,
            user_prompt,
            tx,
            state_tx,
            cancel.clone(),
        ));

        RelayHandle {
            consumer: RelayConsumer {
                rx,
                state: state_rx,
                cancel,
                finished: None,
            },
            producer,
        }
    }
}

async fn produce(
    agent: Arc<dyn AnalysisAgent>,
    system_prompt: String,
    user_prompt: String,
    tx: mpsc::Sender<String>,
    state_tx: watch::Sender<RelayState>,
    cancel: CancellationToken,
) -> RelayOutcome {
    state_tx.send_replace(RelayState::Running);

    let mut full_text = String::new();
    let mut error = None;

    let opened = tokio::select! {
        _ = cancel.cancelled() => None,
        result = agent.stream(&system_prompt, &user_prompt) => Some(result),
    };

    let state = match opened {
        None => RelayState::Canceled,
        Some(Err(err)) => {
            error = Some(err.to_string());
            RelayState::Failed
        }
        Some(Ok(mut stream)) => loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break RelayState::Canceled,
                item = stream.next() => item,
            };

            match item {
                None => break RelayState::Completed,
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    full_text.push_str(&chunk);

                    let sent = tokio::select! {
                        _ = cancel.cancelled() => false,
                        result = tx.send(chunk) => result.is_ok(),
                    };
                    // 수신 측이 사라졌으면 더 보낼 곳이 없음
                    if !sent {
                        break RelayState::Canceled;
                    }
                }
                Some(Err(err)) => {
                    error = Some(err.to_string());
                    break RelayState::Failed;
                }
            }
        },
    };

    // 채널을 닫기 전에 최종 상태 기록 (consumer가 close 직후 읽음)
    state_tx.send_replace(state);
    drop(tx);

    match state {
        RelayState::Failed => tracing::error!(
            target: "audit",
            state = state.as_str(),
            error = error.as_deref().unwrap_or_default(),
            partial = %full_text,
            "analysis stream failed"
        ),
        _ => tracing::info!(
            target: "audit",
            state = state.as_str(),
            chars = full_text.len(),
            full_text = %full_text,
            "analysis stream finished"
        ),
    }

    RelayOutcome { state, full_text, error }
}

/// consumer 측
pub struct RelayConsumer {
    rx: mpsc::Receiver<String>,
    state: watch::Receiver<RelayState>,
    cancel: CancellationToken,
    finished: Option<RelayState>,
}

impl RelayConsumer {
    /// 다음 chunk
    ///
    /// `None`이면 종료: `state()`로 이유 확인
    pub async fn next_chunk(&mut self) -> Option<String> {
        if self.finished.is_some() {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finished = Some(RelayState::Canceled);
            return None;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.finished = Some(RelayState::Canceled);
                None
            }
            chunk = self.rx.recv() => match chunk {
                Some(chunk) => Some(chunk),
                None => {
                    let state = *self.state.borrow();
                    // producer가 상태 기록 없이 사라짐 (panic 등)
                    let state = if state.is_terminal() { state } else { RelayState::Failed };
                    self.finished = Some(state);
                    None
                }
            },
        }
    }

    /// consumer가 관찰한 상태
    pub fn state(&self) -> RelayState {
        self.finished.unwrap_or(RelayState::Running)
    }

    /// HTTP body용 바이트 스트림
    ///
    /// 스트림이 drop되면 (클라이언트 연결 종료 포함) token이 cancel됨
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        let guard = self.cancel.clone().drop_guard();
        futures_util::stream::unfold((self, guard), |(mut consumer, guard): (RelayConsumer, DropGuard)| async move {
            let chunk = consumer.next_chunk().await?;
            Some((Ok(Bytes::from(chunk)), (consumer, guard)))
        })
    }
}
