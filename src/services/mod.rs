//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `RpcClient`: 재시도/백오프 JSON-RPC 클라이언트
//! - `AlchemyProvider`: 토큰/NFT/전송 이력 조회 (`ChainDataSource`)
//! - `build_snapshot`: 응답 병합 (순수 함수)
//! - `CacheStore`: Redis cache-aside + freshness marker
//! - `WalletService`: 스냅샷 조회 흐름 orchestration
//! - `ChatCompletionsAgent`: AI 분석 스트리밍 (`AnalysisAgent`)
//! - `StreamingRelay`: producer/consumer 분석 결과 중계

mod rpc_client;
mod provider;
mod aggregator;
mod cache;
mod agent;
mod prompt;
mod relay;
mod wallet_service;

pub use rpc_client::{RetryPolicy, RpcClient};
pub use provider::{AlchemyProvider, ChainDataSource, NftBatchResponse, TokenBatchResponse};
pub use aggregator::build_snapshot;
pub use cache::{CacheStore, FreshnessCategory, KeyValueStore, RedisStore, SNAPSHOT_TTL};
pub use agent::{AnalysisAgent, ChatCompletionsAgent, ChunkStream};
pub use prompt::{build_user_prompt, prompt_hash, SYSTEM_PROMPT};
pub use relay::{RelayConsumer, RelayHandle, RelayOutcome, RelayState, StreamingRelay};
pub use wallet_service::WalletService;

#[cfg(test)]
pub use agent::mock as agent_mock;
#[cfg(test)]
pub use cache::mock as cache_mock;
#[cfg(test)]
pub use provider::mock as provider_mock;
