//! Database Models
//!
//! Row types for the wallet snapshot tables and the analysis audit log.
//! Monetary and balance columns are NUMERIC, mapped to `BigDecimal`.

use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;

/// 가격 출처
pub const PRICE_SOURCE: &str = "alchemy";

/// 지갑 (체인별 1행)
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct WalletRow {
    pub address: String,

    /// Alchemy network id (eth-mainnet 등)
    pub chain: String,

    /// 네이티브 잔액 (최소 단위, 정수)
    pub chain_coins: BigDecimal,

    /// total_value_usd, token_count, nft_count
    pub metadata: serde_json::Value,

    pub last_indexed_at: DateTime<Utc>,
}

/// 보유 토큰
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct WalletTokenRow {
    pub wallet_address: String,
    pub chain: String,
    pub token_address: String,

    /// 최소 단위 잔액 (decimals 적용 전)
    pub balance: BigDecimal,

    /// metadata에 없으면 18
    pub decimals: i32,

    pub symbol: Option<String>,
    pub name: Option<String>,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// 보유 NFT
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct WalletNftRow {
    pub wallet_address: String,
    pub chain: String,
    pub contract_address: String,
    pub token_id: String,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// 토큰 USD 가격
///
/// token_address = NULL → 해당 체인의 네이티브 토큰
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PriceCacheRow {
    pub token_address: Option<String>,
    pub chain: String,
    pub price_usd: BigDecimal,
    pub source: String,
    pub symbol: Option<String>,
    pub logo: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// AI 분석 결과 (감사 로그)
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub wallet_address: String,
    pub chain: String,
    pub request_id: String,
    pub model_name: String,

    /// 사용자 프롬프트의 Keccak-256 (hex)
    pub prompt_hash: String,

    /// completed | failed | canceled
    pub status: String,

    /// 누적된 전체 응답 텍스트 (실패 시 부분 결과)
    pub raw_response: String,
}
