//! Wallet Snapshot Cache
//!
//! # Interview Q&A
//!
//! Q: 캐시 전략은?
//! A: Cache-aside
//!    - 호출자(WalletService)가 get → miss → fetch → put 순서를 직접 관리
//!    - 캐시는 스스로 원천 데이터를 조회하지 않음
//!    - 캐시가 비거나 오래돼도 정확성 손실 없음 (source of truth는 PostgreSQL)
//!
//! Q: 스냅샷 + freshness marker 5개 쓰기가 원자적이지 않은데?
//! A: 의도적으로 best-effort
//!    - 중간 실패 시 앞의 쓰기를 되돌리지 않음
//!    - 다음 TTL 만료 또는 다음 refresh가 덮어씀
//!
//! # Keys
//! - `snapshot:{address}` (TTL 30분)
//! - `freshness:{native|token|nft|transfers}:{address}` (TTL 없음, RFC3339 timestamp)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::MultiplexedConnection, AsyncCommands};

use crate::error::WalletError;
use crate::types::WalletSnapshot;

/// 스냅샷 TTL
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 60);

/// get / set-with-TTL 저장소 추상화
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError>;

    /// `ttl == None`이면 만료 없음
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), WalletError>;

    async fn ping(&self) -> Result<(), WalletError>;
}

/// Redis 구현
///
/// MultiplexedConnection은 clone해서 동시 요청에 공유 가능
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), WalletError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), WalletError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

/// freshness marker 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessCategory {
    Native,
    Token,
    Nft,
    Transfers,
}

impl FreshnessCategory {
    pub const ALL: [FreshnessCategory; 4] = [
        FreshnessCategory::Native,
        FreshnessCategory::Token,
        FreshnessCategory::Nft,
        FreshnessCategory::Transfers,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            FreshnessCategory::Native => "native",
            FreshnessCategory::Token => "token",
            FreshnessCategory::Nft => "nft",
            FreshnessCategory::Transfers => "transfers",
        }
    }
}

pub fn snapshot_key(address: &str) -> String {
    format!("snapshot:{}", address)
}

pub fn freshness_key(category: FreshnessCategory, address: &str) -> String {
    format!("freshness:{}:{}", category.as_str(), address)
}

/// 지갑 스냅샷 캐시
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// 스냅샷 조회
    ///
    /// 저장소 에러, 역직렬화 실패 모두 miss로 처리 (호출자에게 에러 노출 안 함)
    pub async fn get(&self, address: &str) -> Option<WalletSnapshot> {
        let raw = match self.store.get(&snapshot_key(address)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(address, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(address, error = %err, "cached snapshot is corrupt, treating as miss");
                None
            }
        }
    }

    /// 스냅샷 + freshness marker 4개 기록
    ///
    /// 첫 실패에서 중단하고 에러 반환, 이미 쓴 키는 되돌리지 않음
    pub async fn put(&self, address: &str, snapshot: &WalletSnapshot) -> Result<(), WalletError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| WalletError::Cache(format!("serialize snapshot: {}", e)))?;

        self.store
            .set(&snapshot_key(address), &payload, Some(SNAPSHOT_TTL))
            .await?;

        let now = Utc::now().to_rfc3339();
        for category in FreshnessCategory::ALL {
            self.store
                .set(&freshness_key(category, address), &now, None)
                .await?;
        }

        Ok(())
    }

    /// 저장소 연결 상태
    pub async fn ping(&self) -> Result<(), WalletError> {
        self.store.ping().await
    }
}
