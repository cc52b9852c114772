//! Wallet Service
//!
//! 스냅샷 조회의 진입점. Cache-aside 순서를 직접 관리한다.
//!
//! ```text
//! cache.get ──hit──▶ 반환
//!    │ miss
//!    ▼
//! tokens + nfts (실패 시 요청 실패)
//!    ▼
//! build_snapshot
//!    ▼
//! transfers (best-effort)
//!    ▼
//! cache.put (실패는 로그만)
//!    ▼
//! spawn(store_snapshot)  ← 응답과 독립, 실패는 audit 로그
//! ```
//!
//! 같은 주소에 대한 동시 refresh는 직렬화하지 않음: 둘 다 upsert하므로 결과 동일.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::aggregator::build_snapshot;
use super::cache::CacheStore;
use super::provider::ChainDataSource;
use crate::db::WalletRepository;
use crate::error::WalletError;
use crate::types::WalletSnapshot;

#[derive(Clone)]
pub struct WalletService {
    source: Arc<dyn ChainDataSource>,
    cache: CacheStore,
    repo: Arc<dyn WalletRepository>,
}

impl WalletService {
    pub fn new(source: Arc<dyn ChainDataSource>, cache: CacheStore, repo: Arc<dyn WalletRepository>) -> Self {
        Self { source, cache, repo }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// 지갑 스냅샷 (cache-aside)
    pub async fn snapshot(
        &self,
        address: &str,
        networks: &[String],
        cancel: &CancellationToken,
    ) -> Result<WalletSnapshot, WalletError> {
        if let Some(snapshot) = self.cache.get(address).await {
            tracing::debug!(address, "snapshot cache hit");
            return Ok(snapshot);
        }

        tracing::info!(address, ?networks, "snapshot cache miss, refreshing");
        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WalletError::Canceled),
            result = self.refresh(address, networks, cancel) => result?,
        };

        if let Err(err) = self.cache.put(address, &snapshot).await {
            tracing::warn!(target: "audit", address, error = %err, "cache write failed");
        }

        self.persist_in_background(address, &snapshot);

        Ok(snapshot)
    }

    async fn refresh(
        &self,
        address: &str,
        networks: &[String],
        cancel: &CancellationToken,
    ) -> Result<WalletSnapshot, WalletError> {
        let tokens = self.source.tokens(address, networks).await?;
        let nfts = self.source.nfts(address, networks).await?;
        let mut snapshot = build_snapshot(address, &tokens, &nfts)?;

        match self.source.transfers(address, cancel).await {
            Ok(history) => snapshot.transfers = Some(history),
            Err(WalletError::Canceled) => return Err(WalletError::Canceled),
            Err(err) => {
                tracing::warn!(address, error = %err, "transfer history unavailable, continuing without it");
            }
        }

        Ok(snapshot)
    }

    /// DB 저장 (별도 task)
    pub fn persist_in_background(&self, address: &str, snapshot: &WalletSnapshot) -> JoinHandle<()> {
        let repo = self.repo.clone();
        let address = address.to_string();
        let snapshot = snapshot.clone();

        tokio::spawn(async move {
            match repo.store_snapshot(&address, &snapshot).await {
                Ok(()) => tracing::debug!(address = %address, "snapshot stored"),
                Err(err) => tracing::error!(
                    target: "audit",
                    address = %address,
                    error = %err,
                    "snapshot persistence failed"
                ),
            }
        })
    }
}
