//! Chain Data Provider (Alchemy)
//!
//! Token / NFT balances come from the Data API (REST, single attempt),
//! transfer history from `alchemy_getAssetTransfers` over the retrying RPC client.
//!
//! # Endpoints
//! - `POST {data_url}/{api_key}/assets/tokens/by-address`
//! - `POST {data_url}/{api_key}/assets/nfts/by-address`
//! - JSON-RPC `alchemy_getAssetTransfers` (fromAddress, toAddress 각각 1회)

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::rpc_client::RpcClient;
use crate::error::WalletError;
use crate::types::{AssetTransfer, TransferHistory};

// ============ Wire Types ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub addresses: Vec<AddressNetworks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_metadata: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AddressNetworks {
    pub address: String,
    pub networks: Vec<String>,
}

/// tokens/by-address 응답
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenBatchResponse {
    #[serde(default)]
    pub data: TokenBatchData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBatchData {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    #[serde(default)]
    pub page_key: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    /// 조회한 지갑 주소
    #[serde(default)]
    pub address: Option<String>,
    pub network: String,
    /// 없으면 네이티브 토큰
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub token_balance: String,
    #[serde(default)]
    pub token_metadata: ProviderTokenMetadata,
    #[serde(default)]
    pub token_prices: Vec<TokenPrice>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderTokenMetadata {
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPrice {
    pub currency: String,
    pub value: String,
    #[serde(default)]
    pub last_updated_at: Option<String>,
}

/// nfts/by-address 응답
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NftBatchResponse {
    #[serde(default)]
    pub data: NftBatchData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftBatchData {
    #[serde(default)]
    pub owned_nfts: Vec<OwnedNft>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub page_key: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedNft {
    pub contract_address: String,
    pub token_id: String,
    #[serde(default)]
    pub balance: String,
    #[serde(default)]
    pub is_spam: bool,
    pub network: String,
    #[serde(default)]
    pub address: String,
}

/// `alchemy_getAssetTransfers` 파라미터
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetTransfersParams<'a> {
    from_block: &'static str,
    to_block: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_address: Option<&'a str>,
    category: &'static [&'static str],
    with_metadata: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetTransfersResult {
    #[serde(default)]
    transfers: Vec<AssetTransfer>,
}

const TRANSFER_CATEGORIES: &[&str] = &["external", "internal", "erc20", "erc721", "erc1155"];

// ============ Source Trait ============

/// 지갑 원천 데이터 조회 인터페이스
///
/// WalletService가 의존하는 유일한 외부 데이터 경계 (테스트 시 fake 구현)
#[async_trait]
pub trait ChainDataSource: Send + Sync {
    async fn tokens(&self, address: &str, networks: &[String]) -> Result<TokenBatchResponse, WalletError>;

    async fn nfts(&self, address: &str, networks: &[String]) -> Result<NftBatchResponse, WalletError>;

    async fn transfers(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferHistory, WalletError>;
}

/// Alchemy 구현
pub struct AlchemyProvider {
    http: reqwest::Client,
    data_url: String,
    api_key: String,
    rpc: RpcClient,
}

impl AlchemyProvider {
    pub fn new(http: reqwest::Client, data_url: &str, api_key: &str, rpc: RpcClient) -> Self {
        Self {
            http,
            data_url: data_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            rpc,
        }
    }

    fn assets_url(&self, kind: &str) -> String {
        format!("{}/{}/assets/{}/by-address", self.data_url, self.api_key, kind)
    }

    /// REST POST, 재시도 없음
    ///
    /// non-200이면 바디를 읽어 로그에만 남기고 terminal 에러
    async fn post_assets<R: DeserializeOwned>(
        &self,
        kind: &str,
        request: &BalanceRequest,
    ) -> Result<R, WalletError> {
        let resp = self
            .http
            .post(self.assets_url(kind))
            .timeout(self.rpc.policy().timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        if status != reqwest::StatusCode::OK {
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::error!(kind, status = status.as_u16(), body = %body, "provider returned non-200");
            return Err(WalletError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&body)
            .map_err(|e| WalletError::Protocol(format!("decode {} response: {}", kind, e)))
    }

    fn balance_request(address: &str, networks: &[String], with_metadata: Option<bool>) -> BalanceRequest {
        BalanceRequest {
            addresses: vec![AddressNetworks {
                address: address.to_string(),
                networks: networks.to_vec(),
            }],
            with_metadata,
        }
    }
}

#[async_trait]
impl ChainDataSource for AlchemyProvider {
    async fn tokens(&self, address: &str, networks: &[String]) -> Result<TokenBatchResponse, WalletError> {
        let request = Self::balance_request(address, networks, None);
        self.post_assets("tokens", &request).await
    }

    async fn nfts(&self, address: &str, networks: &[String]) -> Result<NftBatchResponse, WalletError> {
        let request = Self::balance_request(address, networks, Some(false));
        self.post_assets("nfts", &request).await
    }

    async fn transfers(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferHistory, WalletError> {
        let outgoing = [AssetTransfersParams {
            from_block: "0x0",
            to_block: "latest",
            from_address: Some(address),
            to_address: None,
            category: TRANSFER_CATEGORIES,
            with_metadata: true,
        }];
        let incoming = [AssetTransfersParams {
            from_block: "0x0",
            to_block: "latest",
            from_address: None,
            to_address: Some(address),
            category: TRANSFER_CATEGORIES,
            with_metadata: true,
        }];

        let sent: AssetTransfersResult = self
            .rpc
            .call("alchemy_getAssetTransfers", &outgoing, cancel)
            .await?;
        let received: AssetTransfersResult = self
            .rpc
            .call("alchemy_getAssetTransfers", &incoming, cancel)
            .await?;

        Ok(TransferHistory {
            outgoing: sent.transfers,
            incoming: received.transfers,
        })
    }
}

/// 고정 응답 source (라우트 테스트용)
#[cfg(test)]
pub mod mock {
    use super::*;

    pub struct StaticSource {
        pub tokens: TokenBatchResponse,
        pub nfts: NftBatchResponse,
    }

    impl StaticSource {
        /// eth-mainnet: 1 ETH @ 2000.00 USD
        pub fn one_eth() -> Self {
            let tokens = serde_json::from_value(serde_json::json!({
                "data": {"tokens": [{
                    "network": "eth-mainnet",
                    "tokenAddress": null,
                    "tokenBalance": "0x0de0b6b3a7640000",
                    "tokenMetadata": {"symbol": "ETH", "decimals": 18},
                    "tokenPrices": [{"currency": "usd", "value": "2000.00"}]
                }]}
            }))
            .unwrap();
            Self { tokens, nfts: NftBatchResponse::default() }
        }
    }

    #[async_trait]
    impl ChainDataSource for StaticSource {
        async fn tokens(&self, _address: &str, _networks: &[String]) -> Result<TokenBatchResponse, WalletError> {
            Ok(self.tokens.clone())
        }

        async fn nfts(&self, _address: &str, _networks: &[String]) -> Result<NftBatchResponse, WalletError> {
            Ok(self.nfts.clone())
        }

        async fn transfers(
            &self,
            _address: &str,
            _cancel: &CancellationToken,
        ) -> Result<TransferHistory, WalletError> {
            Err(WalletError::Rpc { code: -32601, message: "method not available".into() })
        }
    }
}
