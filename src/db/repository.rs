//! Repository Pattern Implementation
//!
//! # Interview Q&A
//!
//! Q: Repository 패턴이란?
//! A: 데이터 접근 로직을 추상화하는 패턴
//!
//!    장점:
//!    - 비즈니스 로직과 데이터 접근 분리
//!    - 테스트 시 Mock 구현 쉬움
//!    - DB 교체 시 영향 최소화
//!
//! Q: 여기서 trait로 분리한 이유는?
//! A: WalletService / 분석 라우트가 DB 없이 테스트 가능해야 함
//!    - 영속화는 응답 이후 별도 task에서 실행 (`Arc<dyn WalletRepository>`)
//!    - Mock은 자연키(natural key) 기준 upsert를 흉내내서
//!      "두 번 저장해도 행 수 동일" 성질을 검증

use async_trait::async_trait;

use super::models::AnalysisRecord;
use super::Database;
use crate::error::WalletError;
use crate::types::WalletSnapshot;

/// 지갑 데이터 저장소 인터페이스
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// 스냅샷 전체를 하나의 트랜잭션으로 upsert
    async fn store_snapshot(&self, address: &str, snapshot: &WalletSnapshot) -> Result<(), WalletError>;

    async fn insert_analysis_result(&self, record: &AnalysisRecord) -> Result<(), WalletError>;

    async fn health_check(&self) -> Result<(), WalletError>;
}

// PostgreSQL 구현은 db/mod.rs의 Database 구조체에 있음
#[async_trait]
impl WalletRepository for Database {
    async fn store_snapshot(&self, address: &str, snapshot: &WalletSnapshot) -> Result<(), WalletError> {
        Database::store_snapshot(self, address, snapshot).await
    }

    async fn insert_analysis_result(&self, record: &AnalysisRecord) -> Result<(), WalletError> {
        Database::insert_analysis_result(self, record).await
    }

    async fn health_check(&self) -> Result<(), WalletError> {
        Database::health_check(self)
            .await
            .map_err(|e| WalletError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::db::{plan_rows, PriceCacheRow, WalletNftRow, WalletRow, WalletTokenRow};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    #[derive(Default)]
    struct Tables {
        wallets: HashMap<(String, String), WalletRow>,
        tokens: HashMap<(String, String, String), WalletTokenRow>,
        nfts: HashMap<(String, String, String, String), WalletNftRow>,
        prices: HashMap<(Option<String>, String), PriceCacheRow>,
        analyses: Vec<AnalysisRecord>,
    }

    /// 자연키 기준 upsert Mock
    #[derive(Default)]
    pub struct MockWalletRepository {
        tables: RwLock<Tables>,
        fail: AtomicBool,
    }

    impl MockWalletRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// 이후 store_snapshot 호출 실패 (롤백: 아무것도 기록 안 함)
        pub fn fail_next_store(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        /// (wallets, tokens, nfts, prices)
        pub fn row_counts(&self) -> (usize, usize, usize, usize) {
            let tables = self.tables.read().unwrap();
            (
                tables.wallets.len(),
                tables.tokens.len(),
                tables.nfts.len(),
                tables.prices.len(),
            )
        }

        pub fn analyses(&self) -> Vec<AnalysisRecord> {
            self.tables.read().unwrap().analyses.clone()
        }
    }

    #[async_trait]
    impl WalletRepository for MockWalletRepository {
        async fn store_snapshot(&self, address: &str, snapshot: &WalletSnapshot) -> Result<(), WalletError> {
            if self.fail.swap(false, Ordering::SeqCst) {
                return Err(WalletError::Persistence("injected failure".into()));
            }

            let plan = plan_rows(address, snapshot, Utc::now());
            let mut tables = self.tables.write().unwrap();
            for row in plan.wallets {
                tables.wallets.insert((row.address.clone(), row.chain.clone()), row);
            }
            for row in plan.tokens {
                let key = (row.wallet_address.clone(), row.chain.clone(), row.token_address.clone());
                tables.tokens.insert(key, row);
            }
            for row in plan.nfts {
                let key = (
                    row.wallet_address.clone(),
                    row.chain.clone(),
                    row.contract_address.clone(),
                    row.token_id.clone(),
                );
                tables.nfts.insert(key, row);
            }
            for row in plan.prices {
                tables.prices.insert((row.token_address.clone(), row.chain.clone()), row);
            }
            Ok(())
        }

        async fn insert_analysis_result(&self, record: &AnalysisRecord) -> Result<(), WalletError> {
            self.tables.write().unwrap().analyses.push(record.clone());
            Ok(())
        }

        async fn health_check(&self) -> Result<(), WalletError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockWalletRepository;
    use super::*;
    use crate::types::{ChainHolding, NftHolding, TokenHolding, TokenMetadata};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn snapshot(native_price: BigDecimal) -> WalletSnapshot {
        let mut snapshot = WalletSnapshot::new("0xw");
        snapshot.chains.insert(
            "eth-mainnet".into(),
            ChainHolding {
                native_token: Some(TokenHolding {
                    contract_address: None,
                    balance_raw: "0x0de0b6b3a7640000".into(),
                    metadata: TokenMetadata::default(),
                    usd_price: Some(native_price),
                }),
                tokens: vec![TokenHolding {
                    contract_address: Some("0xusdc".into()),
                    balance_raw: "5000000".into(),
                    metadata: TokenMetadata::default(),
                    usd_price: Some(dec("1")),
                }],
                nfts: vec![NftHolding {
                    contract_address: "0xpunks".into(),
                    token_id: "42".into(),
                    balance: "1".into(),
                    chain: "eth-mainnet".into(),
                    owner_address: "0xw".into(),
                }],
                nft_count: 1,
            },
        );
        snapshot
    }

    #[tokio::test]
    async fn test_store_twice_is_idempotent() {
        let repo = MockWalletRepository::new();

        repo.store_snapshot("0xw", &snapshot(dec("2000"))).await.unwrap();
        let first = repo.row_counts();
        repo.store_snapshot("0xw", &snapshot(dec("2100"))).await.unwrap();

        assert_eq!(first, (1, 1, 1, 2));
        assert_eq!(repo.row_counts(), first);
    }

    #[tokio::test]
    async fn test_failed_store_writes_nothing() {
        let repo = MockWalletRepository::new();
        repo.fail_next_store();

        let err = repo.store_snapshot("0xw", &snapshot(dec("2000"))).await.unwrap_err();

        assert!(matches!(err, WalletError::Persistence(_)));
        assert_eq!(repo.row_counts(), (0, 0, 0, 0));
    }
}
