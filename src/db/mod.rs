//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 캐시(Redis)가 있는데 PostgreSQL에도 저장하는 이유는?
//! A: 역할이 다름
//!
//!    1. Redis: 30분 TTL 스냅샷, 응답 속도용 (유실되어도 무방)
//!    2. PostgreSQL: 지갑/토큰/NFT/가격 이력의 source of truth
//!    3. 분석 결과 감사 로그 (analysis_results)
//!
//! Q: 스냅샷 저장은 왜 하나의 트랜잭션인가?
//! A: 금융 데이터는 all-or-nothing
//!    - 캐시는 best-effort지만 DB는 부분 저장 금지
//!    - upsert 하나라도 실패 → 전체 롤백 후 에러 반환
//!    - `ON CONFLICT ... DO UPDATE`라 같은 스냅샷을 두 번 저장해도 결과 동일
//!
//! Q: 잔액을 왜 NUMERIC + BigDecimal로 저장하는가?
//! A: f64는 1e18 wei 단위에서 정밀도 손실, 96비트 고정소수점도 부족
//!    - ERC-20 잔액은 uint256 (최대 78자리) → NUMERIC(78,0)
//!    - sqlx `bigdecimal` feature로 NUMERIC ↔ BigDecimal 직접 매핑
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - 커넥션 재사용 (오버헤드 감소)
//!    - 타임아웃 처리

mod models;
mod repository;

pub use models::*;
pub use repository::WalletRepository;

#[cfg(test)]
pub use repository::mock;

use anyhow::Result;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use num_traits::{Num, Signed, Zero};
use serde_json::json;
use sqlx::types::BigDecimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::error::WalletError;
use crate::types::WalletSnapshot;

/// 토큰 metadata에 decimals가 없을 때
const DEFAULT_DECIMALS: i32 = 18;

/// 데이터베이스 연결 및 쿼리 담당
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 스냅샷 저장 (단일 트랜잭션)
    ///
    /// 에러 시 `tx`가 commit 없이 drop되어 롤백됨
    pub async fn store_snapshot(&self, address: &str, snapshot: &WalletSnapshot) -> Result<(), WalletError> {
        let plan = plan_rows(address, snapshot, Utc::now());

        let mut tx = self.pool.begin().await?;

        for wallet in &plan.wallets {
            sqlx::query(
                r#"
                INSERT INTO wallets (address, chain, chain_coins, metadata, last_indexed_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $5)
                ON CONFLICT (address, chain)
                DO UPDATE SET
                    chain_coins = EXCLUDED.chain_coins,
                    metadata = EXCLUDED.metadata,
                    last_indexed_at = EXCLUDED.last_indexed_at,
                    updated_at = EXCLUDED.updated_at
                "#
            )
            .bind(&wallet.address)
            .bind(&wallet.chain)
            .bind(&wallet.chain_coins)
            .bind(&wallet.metadata)
            .bind(wallet.last_indexed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| persistence_error("wallets", &wallet.chain, e))?;
        }

        for token in &plan.tokens {
            sqlx::query(
                r#"
                INSERT INTO wallet_tokens (
                    wallet_address, chain, token_address, balance, decimals,
                    symbol, name, metadata, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (wallet_address, chain, token_address)
                DO UPDATE SET
                    balance = EXCLUDED.balance,
                    decimals = EXCLUDED.decimals,
                    symbol = EXCLUDED.symbol,
                    name = EXCLUDED.name,
                    metadata = EXCLUDED.metadata,
                    updated_at = EXCLUDED.updated_at
                "#
            )
            .bind(&token.wallet_address)
            .bind(&token.chain)
            .bind(&token.token_address)
            .bind(&token.balance)
            .bind(token.decimals)
            .bind(&token.symbol)
            .bind(&token.name)
            .bind(&token.metadata)
            .bind(token.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| persistence_error("wallet_tokens", &token.chain, e))?;
        }

        for nft in &plan.nfts {
            sqlx::query(
                r#"
                INSERT INTO wallet_nfts (wallet_address, chain, contract_address, token_id, metadata, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (wallet_address, chain, contract_address, token_id)
                DO UPDATE SET
                    metadata = EXCLUDED.metadata,
                    updated_at = EXCLUDED.updated_at
                "#
            )
            .bind(&nft.wallet_address)
            .bind(&nft.chain)
            .bind(&nft.contract_address)
            .bind(&nft.token_id)
            .bind(&nft.metadata)
            .bind(nft.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| persistence_error("wallet_nfts", &nft.chain, e))?;
        }

        for price in &plan.prices {
            sqlx::query(
                r#"
                INSERT INTO price_cache (token_address, chain, price_usd, source, symbol, logo, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (token_address, chain)
                DO UPDATE SET
                    price_usd = EXCLUDED.price_usd,
                    source = EXCLUDED.source,
                    symbol = EXCLUDED.symbol,
                    logo = EXCLUDED.logo,
                    updated_at = EXCLUDED.updated_at
                "#
            )
            .bind(&price.token_address)
            .bind(&price.chain)
            .bind(&price.price_usd)
            .bind(&price.source)
            .bind(&price.symbol)
            .bind(&price.logo)
            .bind(price.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| persistence_error("price_cache", &price.chain, e))?;
        }

        tx.commit().await?;

        tracing::debug!(
            address,
            wallets = plan.wallets.len(),
            tokens = plan.tokens.len(),
            nfts = plan.nfts.len(),
            prices = plan.prices.len(),
            "snapshot persisted"
        );
        Ok(())
    }

    /// 분석 결과 저장
    pub async fn insert_analysis_result(&self, record: &AnalysisRecord) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_results (
                wallet_address, chain, request_id, model_name, prompt_hash, status, raw_response, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#
        )
        .bind(&record.wallet_address)
        .bind(&record.chain)
        .bind(&record.request_id)
        .bind(&record.model_name)
        .bind(&record.prompt_hash)
        .bind(&record.status)
        .bind(&record.raw_response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn persistence_error(table: &str, chain: &str, err: sqlx::Error) -> WalletError {
    tracing::error!(table, chain, error = %err, "upsert failed, rolling back snapshot");
    WalletError::Persistence(format!("{}: {}", table, err))
}

/// 스냅샷 → 저장할 행 목록
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PersistPlan {
    pub wallets: Vec<WalletRow>,
    pub tokens: Vec<WalletTokenRow>,
    pub nfts: Vec<WalletNftRow>,
    pub prices: Vec<PriceCacheRow>,
}

/// 저장 행 계획 (DB 접근 없음)
///
/// # Skip Rules
///
/// - 네이티브 잔액 파싱 실패 → 해당 체인의 wallet 행만 생략 (토큰/NFT는 저장)
/// - 네이티브 토큰 없음 → chain_coins = 0
/// - 가격 행은 USD 가격이 있을 때만
/// - 토큰 잔액 파싱 실패 → 해당 토큰 행만 생략
pub fn plan_rows(address: &str, snapshot: &WalletSnapshot, now: DateTime<Utc>) -> PersistPlan {
    let mut plan = PersistPlan::default();

    for (chain, holding) in &snapshot.chains {
        let chain_coins = match &holding.native_token {
            Some(native) => parse_integer_balance(&native.balance_raw),
            None => Some(BigDecimal::zero()),
        };

        match chain_coins {
            Some(chain_coins) => plan.wallets.push(WalletRow {
                address: address.to_string(),
                chain: chain.clone(),
                chain_coins,
                metadata: json!({
                    "total_value_usd": snapshot.total_value_usd.to_string(),
                    "token_count": holding.tokens.len(),
                    "nft_count": holding.nft_count,
                }),
                last_indexed_at: now,
            }),
            None => tracing::error!(
                target: "audit",
                address,
                chain = %chain,
                "can not parse native balance, skipping wallet row"
            ),
        }

        if let Some(native) = &holding.native_token {
            if let Some(price_usd) = &native.usd_price {
                plan.prices.push(PriceCacheRow {
                    token_address: None,
                    chain: chain.clone(),
                    price_usd: price_usd.clone(),
                    source: PRICE_SOURCE.to_string(),
                    symbol: native.metadata.symbol.clone(),
                    logo: native.metadata.logo.clone(),
                    updated_at: now,
                });
            }
        }

        for token in &holding.tokens {
            let Some(token_address) = token.contract_address.clone() else {
                continue;
            };
            let Some(balance) = parse_integer_balance(&token.balance_raw) else {
                tracing::error!(
                    target: "audit",
                    address,
                    chain = %chain,
                    token_address = %token_address,
                    "can not parse token balance, skipping token row"
                );
                continue;
            };

            plan.tokens.push(WalletTokenRow {
                wallet_address: address.to_string(),
                chain: chain.clone(),
                token_address: token_address.clone(),
                balance,
                decimals: token
                    .metadata
                    .decimals
                    .and_then(|d| i32::try_from(d).ok())
                    .unwrap_or(DEFAULT_DECIMALS),
                symbol: token.metadata.symbol.clone(),
                name: token.metadata.name.clone(),
                metadata: serde_json::to_value(&token.metadata).unwrap_or_default(),
                updated_at: now,
            });

            if let Some(price_usd) = &token.usd_price {
                plan.prices.push(PriceCacheRow {
                    token_address: Some(token_address),
                    chain: chain.clone(),
                    price_usd: price_usd.clone(),
                    source: PRICE_SOURCE.to_string(),
                    symbol: token.metadata.symbol.clone(),
                    logo: token.metadata.logo.clone(),
                    updated_at: now,
                });
            }
        }

        for nft in &holding.nfts {
            plan.nfts.push(WalletNftRow {
                wallet_address: address.to_string(),
                chain: chain.clone(),
                contract_address: nft.contract_address.clone(),
                token_id: nft.token_id.clone(),
                metadata: json!({ "balance": nft.balance }),
                updated_at: now,
            });
        }
    }

    plan
}

/// 최소 단위 정수 잔액 파싱
///
/// 10진 문자열 또는 `0x` hex (Alchemy는 32바이트 zero-padded hex를 반환).
/// 자릿수 제한 없음 (uint256 전체 범위)
pub fn parse_integer_balance(raw: &str) -> Option<BigDecimal> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => BigInt::zero(),
        Some(hex) => BigInt::from_str_radix(hex, 16).ok()?,
        None => BigInt::from_str_radix(raw, 10).ok()?,
    };

    (!value.is_negative()).then(|| BigDecimal::new(value, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainHolding, NftHolding, TokenHolding, TokenMetadata};
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn holding(contract: Option<&str>, balance: &str, price: Option<BigDecimal>) -> TokenHolding {
        TokenHolding {
            contract_address: contract.map(str::to_string),
            balance_raw: balance.to_string(),
            metadata: TokenMetadata {
                symbol: Some("SYM".into()),
                ..Default::default()
            },
            usd_price: price,
        }
    }

    fn snapshot_with(chain: &str, holding: ChainHolding) -> WalletSnapshot {
        let mut snapshot = WalletSnapshot::new("0xw");
        snapshot.chains.insert(chain.to_string(), holding);
        snapshot
    }

    #[test]
    fn test_parse_integer_balance() {
        assert_eq!(parse_integer_balance("1000000000000000000"), Some(dec("1000000000000000000")));
        assert_eq!(
            parse_integer_balance("0x0000000000000000000000000000000000000000000000000de0b6b3a7640000"),
            Some(dec("1000000000000000000"))
        );
        assert_eq!(parse_integer_balance("0x"), Some(BigDecimal::zero()));
        assert_eq!(parse_integer_balance("1.5"), None);
        assert_eq!(parse_integer_balance("-3"), None);
        assert_eq!(parse_integer_balance("lots"), None);
        assert_eq!(parse_integer_balance("1e18"), None);
    }

    #[test]
    fn test_parse_balance_beyond_fixed_precision() {
        // 1e11 units of an 18-decimal token
        assert_eq!(
            parse_integer_balance("100000000000000000000000000000"),
            Some(dec("100000000000000000000000000000"))
        );
        // uint256 max
        let max = "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
        assert_eq!(
            parse_integer_balance(max).unwrap().to_string(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn test_plan_keeps_huge_token_balance() {
        let snapshot = snapshot_with(
            "eth-mainnet",
            ChainHolding {
                native_token: Some(holding(None, "250000000000000000000000000000000", None)),
                tokens: vec![holding(Some("0xspam"), "100000000000000000000000000000", None)],
                ..Default::default()
            },
        );

        let plan = plan_rows("0xw", &snapshot, Utc::now());

        assert_eq!(plan.wallets.len(), 1);
        assert_eq!(plan.wallets[0].chain_coins, dec("250000000000000000000000000000000"));
        assert_eq!(plan.tokens.len(), 1);
        assert_eq!(plan.tokens[0].balance, dec("100000000000000000000000000000"));
    }

    #[test]
    fn test_plan_native_and_token_rows() {
        let now = Utc::now();
        let snapshot = snapshot_with(
            "eth-mainnet",
            ChainHolding {
                native_token: Some(holding(None, "1000000000000000000", Some(dec("2000.00")))),
                tokens: vec![
                    holding(Some("0xusdc"), "5000000", Some(dec("1.0001"))),
                    holding(Some("0xmeme"), "42", None),
                ],
                nfts: vec![],
                nft_count: 0,
            },
        );

        let plan = plan_rows("0xw", &snapshot, now);

        assert_eq!(plan.wallets.len(), 1);
        assert_eq!(plan.wallets[0].chain_coins, dec("1000000000000000000"));
        assert_eq!(plan.tokens.len(), 2);
        assert_eq!(plan.tokens[0].decimals, DEFAULT_DECIMALS);

        // native + usdc, meme은 가격 없음
        assert_eq!(plan.prices.len(), 2);
        assert!(plan.prices[0].token_address.is_none());
        assert_eq!(plan.prices[0].price_usd, dec("2000.00"));
        assert_eq!(plan.prices[1].token_address.as_deref(), Some("0xusdc"));
        assert_eq!(plan.prices[1].price_usd, dec("1.0001"));
    }

    #[test]
    fn test_bad_native_balance_skips_only_wallet_row() {
        let mut snapshot = snapshot_with(
            "eth-mainnet",
            ChainHolding {
                native_token: Some(holding(None, "not-a-number", Some(dec("2000")))),
                tokens: vec![holding(Some("0xusdc"), "10", None)],
                nfts: vec![NftHolding {
                    contract_address: "0xpunks".into(),
                    token_id: "1".into(),
                    balance: "1".into(),
                    chain: "eth-mainnet".into(),
                    owner_address: "0xw".into(),
                }],
                nft_count: 1,
            },
        );
        snapshot.chains.insert(
            "polygon-mainnet".into(),
            ChainHolding {
                native_token: Some(holding(None, "7", None)),
                ..Default::default()
            },
        );

        let plan = plan_rows("0xw", &snapshot, Utc::now());

        assert_eq!(plan.wallets.len(), 1);
        assert_eq!(plan.wallets[0].chain, "polygon-mainnet");
        assert_eq!(plan.tokens.len(), 1);
        assert_eq!(plan.nfts.len(), 1);
        assert_eq!(plan.prices.len(), 1);
    }

    #[test]
    fn test_chain_without_native_gets_zero_coins() {
        let snapshot = snapshot_with("eth-mainnet", ChainHolding::default());

        let plan = plan_rows("0xw", &snapshot, Utc::now());

        assert_eq!(plan.wallets.len(), 1);
        assert_eq!(plan.wallets[0].chain_coins, BigDecimal::zero());
        assert!(plan.prices.is_empty());
    }

    #[test]
    fn test_price_keeps_full_precision() {
        let price = dec("0.000000012345678901234567");
        let snapshot = snapshot_with(
            "eth-mainnet",
            ChainHolding {
                tokens: vec![holding(Some("0xpepe"), "1", Some(price))],
                ..Default::default()
            },
        );

        let plan = plan_rows("0xw", &snapshot, Utc::now());

        assert_eq!(plan.prices[0].price_usd.to_string(), "0.000000012345678901234567");
    }
}
