//! Wallet Copilot API Library
//!
//! # Overview
//!
//! 멀티체인 지갑 스냅샷을 수집/캐시/저장하고, 스냅샷을 기반으로
//! AI 리스크 분석 결과를 스트리밍하는 백엔드 API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          API                              │
//! │                                                           │
//! │  ┌─────────┐  ┌──────────┐  ┌─────────┐  ┌─────────┐     │
//! │  │ Routes  │  │ Services │  │   DB    │  │  Types  │     │
//! │  └────┬────┘  └────┬─────┘  └────┬────┘  └────┬────┘     │
//! │       └────────────┴─────────────┴────────────┘           │
//! └───────────────────────┬───────────────┬───────────────────┘
//!                         │               │
//!                         ▼               ▼
//!              ┌────────────────┐  ┌────────────────┐
//!              │ Alchemy (data, │  │ LLM (chat      │
//!              │ JSON-RPC)      │  │ completions)   │
//!              └────────────────┘  └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: RPC 클라이언트, 집계, 캐시, 분석 스트리밍
//! - `db`: PostgreSQL 영속화
//! - `types`: 지갑 스냅샷 데이터 모델
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wallet_copilot_api::{config::Config, db::Database, routes};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let db = Database::connect(&config.database_url).await?;
//!
//!     // ... AppState 구성 후 routes::create_router(state)
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod db;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ApiError, WalletError};
pub use db::{Database, WalletRepository};
pub use services::{AnalysisAgent, WalletService};

/// 애플리케이션 전역 상태
///
/// 모든 핸들은 main에서 생성되어 주입됨 (전역 싱글톤 없음)
#[derive(Clone)]
pub struct AppState {
    pub wallet_service: Arc<WalletService>,
    pub agent: Arc<dyn AnalysisAgent>,
    pub repo: Arc<dyn WalletRepository>,
    pub config: Arc<Config>,
}
