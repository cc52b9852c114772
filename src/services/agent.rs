//! AI Analysis Agent
//!
//! 외부 LLM(OpenAI 호환 `/chat/completions`)에 분석을 요청하고
//! 응답을 텍스트 chunk 스트림으로 돌려준다.
//!
//! # Interview Q&A
//!
//! Q: 왜 trait로 분리했는가?
//! A: StreamingRelay 테스트
//!    - 실제 LLM 없이 chunk 순서/실패/취소 시나리오 재현
//!    - 모델 공급자 교체 시 relay 코드 변경 없음
//!
//! Q: SSE 파싱은 어떻게 하는가?
//! A: 줄 단위
//!    - `data: {json}` → `choices[0].delta.content`
//!    - `data: [DONE]` → 스트림 종료
//!    - 그 외(빈 줄, `:` 주석, `event:`)는 무시
//!    - TCP 경계가 줄 중간에 걸릴 수 있으므로 개행까지 버퍼링

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// 분석 결과 chunk 스트림
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, WalletError>> + Send>>;

/// 분석 협력자 인터페이스
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// 감사 로그에 기록할 모델 이름
    fn model_name(&self) -> &str;

    async fn stream(&self, system_prompt: &str, user_prompt: &str) -> Result<ChunkStream, WalletError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// SSE 한 줄 해석 결과
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Content(String),
    Done,
    Ignore,
}

/// SSE 한 줄 파싱
pub fn parse_sse_line(line: &str) -> Result<SseLine, WalletError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Ignore);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Ignore);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| WalletError::Stream(format!("malformed completion chunk: {}", e)))?;
    if let Some(error) = chunk.error {
        return Err(WalletError::Stream(format!("completion error: {}", error)));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();
    if content.is_empty() {
        Ok(SseLine::Ignore)
    } else {
        Ok(SseLine::Content(content))
    }
}

/// OpenAI 호환 Chat Completions 스트리밍 클라이언트
#[derive(Clone)]
pub struct ChatCompletionsAgent {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsAgent {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl AnalysisAgent for ChatCompletionsAgent {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, system_prompt: &str, user_prompt: &str) -> Result<ChunkStream, WalletError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            stream: true,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "analysis request rejected");
            return Err(WalletError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(sse_chunks(Box::pin(response.bytes_stream())))
    }
}

struct SseState<S> {
    body: S,
    buf: Vec<u8>,
    pending: VecDeque<Result<String, WalletError>>,
    eof: bool,
    done: bool,
}

/// 바이트 스트림 → content chunk 스트림
fn sse_chunks<S>(body: S) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + Unpin + 'static,
{
    let state = SseState {
        body,
        buf: Vec::new(),
        pending: VecDeque::new(),
        eof: false,
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }

            while let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = st.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                match parse_sse_line(line.trim_end()) {
                    Ok(SseLine::Content(content)) => st.pending.push_back(Ok(content)),
                    Ok(SseLine::Done) => {
                        st.done = true;
                        break;
                    }
                    Ok(SseLine::Ignore) => {}
                    Err(err) => {
                        st.pending.push_back(Err(err));
                        st.done = true;
                        break;
                    }
                }
            }

            if !st.pending.is_empty() || st.done {
                continue;
            }
            if st.eof {
                st.done = true;
                continue;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    st.pending.push_back(Err(WalletError::Stream(err.to_string())));
                    st.done = true;
                }
                None => {
                    // 개행 없이 끝난 마지막 줄
                    if !st.buf.is_empty() {
                        st.buf.push(b'\n');
                    }
                    st.eof = true;
                }
            }
        }
    }))
}

/// 테스트용 스크립트 agent
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// 미리 정한 chunk 목록을 순서대로 내보냄
    ///
    /// `hang_after`가 true면 목록 소진 후 스트림을 끝내지 않음 (클라이언트 끊김 시나리오)
    pub struct ScriptedAgent {
        items: Mutex<Option<Vec<Result<String, WalletError>>>>,
        hang_after: bool,
        open_error: bool,
    }

    impl ScriptedAgent {
        pub fn new(items: Vec<Result<String, WalletError>>) -> Self {
            Self { items: Mutex::new(Some(items)), hang_after: false, open_error: false }
        }

        pub fn chunks(chunks: &[&str]) -> Self {
            Self::new(chunks.iter().map(|c| Ok(c.to_string())).collect())
        }

        pub fn hanging(chunks: &[&str]) -> Self {
            Self { hang_after: true, ..Self::chunks(chunks) }
        }

        pub fn unreachable() -> Self {
            Self { open_error: true, ..Self::new(vec![]) }
        }
    }

    #[async_trait]
    impl AnalysisAgent for ScriptedAgent {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, _system_prompt: &str, _user_prompt: &str) -> Result<ChunkStream, WalletError> {
            if self.open_error {
                return Err(WalletError::Transport("connection refused".into()));
            }
            let items = self.items.lock().unwrap().take().unwrap_or_default();
            let scripted = futures_util::stream::iter(items);
            if self.hang_after {
                Ok(Box::pin(scripted.chain(futures_util::stream::pending())))
            } else {
                Ok(Box::pin(scripted))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#).unwrap(),
            SseLine::Content("hi".into())
        );
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Ignore);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Ignore);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Ignore
        );
    }

    #[test]
    fn test_parse_sse_line_errors() {
        assert!(matches!(parse_sse_line("data: {oops"), Err(WalletError::Stream(_))));
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            Err(WalletError::Stream(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas_in_order() {
        let server = MockServer::start().await;
        let body = format!("{}{}{}data: [DONE]\n\n", delta("Risk "), delta("score: "), delta("12"));
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-test", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let agent = ChatCompletionsAgent::new(reqwest::Client::new(), &server.uri(), "sk-test", "gpt-test");
        let chunks: Vec<String> = agent
            .stream("system", "user")
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["Risk ", "score: ", "12"]);
        assert_eq!(agent.model_name(), "gpt-test");
    }

    #[tokio::test]
    async fn test_stream_without_done_marker_ends_at_eof() {
        let server = MockServer::start().await;
        // 마지막 줄에 개행 없음
        let body = format!("{}data: {}", delta("a"), serde_json::json!({"choices": [{"delta": {"content": "b"}}]}));
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let agent = ChatCompletionsAgent::new(reqwest::Client::new(), &server.uri(), "k", "m");
        let chunks: Vec<String> = agent
            .stream("s", "u")
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stream_error_after_partial_output() {
        let server = MockServer::start().await;
        let body = format!("{}data: {{broken\n\n{}", delta("partial"), delta("never"));
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let agent = ChatCompletionsAgent::new(reqwest::Client::new(), &server.uri(), "k", "m");
        let items: Vec<Result<String, WalletError>> = agent.stream("s", "u").await.unwrap().collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(items[1], Err(WalletError::Stream(_))));
    }

    #[tokio::test]
    async fn test_rejected_request_is_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let agent = ChatCompletionsAgent::new(reqwest::Client::new(), &server.uri(), "bad", "m");
        let err = match agent.stream("s", "u").await {
            Err(err) => err,
            Ok(_) => panic!("expected rejection"),
        };

        assert!(matches!(err, WalletError::UpstreamStatus { status: 401, .. }));
    }
}
