//! Common Types Module
//!
//! 지갑 스냅샷 데이터 모델. 캐시에 JSON으로 직렬화되어 저장되고,
//! 프롬프트 빌더와 영속화 레이어가 그대로 소비한다.

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize};

/// 지원 체인 → Alchemy network 목록
///
/// 주소 형식 검증은 하지 않음 (체인 선택만)
pub fn networks_for_chain(chain: &str) -> Option<Vec<String>> {
    let networks: &[&str] = match chain {
        "eth" => &["eth-mainnet"],
        "btc" => &["bitcoin-mainnet"],
        "trx" => &["tron-mainnet"],
        "sol" => &["solana-mainnet"],
        _ => return None,
    };
    Some(networks.iter().map(|n| n.to_string()).collect())
}

/// 지갑 스냅샷 (캐시/영속화 단위)
///
/// `total_value_usd` = 모든 체인의 USD 가격 합계 (가격 없는 토큰은 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub address: String,
    pub total_value_usd: BigDecimal,
    /// chain id → holdings (정렬 순서 고정: 프롬프트 재현성)
    pub chains: BTreeMap<String, ChainHolding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfers: Option<TransferHistory>,
}

impl WalletSnapshot {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            total_value_usd: BigDecimal::zero(),
            chains: BTreeMap::new(),
            transfers: None,
        }
    }
}

/// 체인별 보유 자산
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainHolding {
    /// token contract 주소가 없는 항목 (ETH 등)
    pub native_token: Option<TokenHolding>,
    pub tokens: Vec<TokenHolding>,
    pub nfts: Vec<NftHolding>,
    /// 항상 `nfts.len()`과 같음
    pub nft_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHolding {
    pub contract_address: Option<String>,
    /// 최소 단위 10진 문자열 (decimals로 나누기 전)
    pub balance_raw: String,
    pub metadata: TokenMetadata,
    pub usd_price: Option<BigDecimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub logo: Option<String>,
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftHolding {
    pub contract_address: String,
    pub token_id: String,
    pub balance: String,
    pub chain: String,
    pub owner_address: String,
}

/// 송신/수신 이력 (`alchemy_getAssetTransfers` 두 번 호출 결과)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferHistory {
    pub outgoing: Vec<AssetTransfer>,
    pub incoming: Vec<AssetTransfer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
    #[serde(default)]
    pub block_num: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    /// Alchemy는 JSON float로 내려줌 (스팸 토큰은 1e30 이상도 흔함)
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub value: Option<BigDecimal>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub category: String,
}

/// 숫자/문자열 모두 허용, 해석 불가 값은 해당 항목만 `None`
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => BigDecimal::from_str(&n.to_string()).ok(),
        Some(serde_json::Value::String(s)) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    })
}
