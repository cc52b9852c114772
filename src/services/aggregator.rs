//! Wallet Aggregator
//!
//! 체인별 token / NFT 응답을 하나의 `WalletSnapshot`으로 병합.
//! 순수 함수: 네트워크, 캐시, DB 접근 없음.

use std::str::FromStr;

use bigdecimal::BigDecimal;

use super::provider::{NftBatchResponse, TokenBatchResponse, TokenEntry};
use crate::error::WalletError;
use crate::types::{NftHolding, TokenHolding, TokenMetadata, WalletSnapshot};

/// USD 가격으로 인정하는 currency 값
const USD: &str = "usd";

/// 스냅샷 생성
///
/// # Rules
///
/// - `tokenAddress` 없음 → 네이티브 토큰 (중복 시 마지막 값으로 덮어씀)
/// - `tokenPrices` 중 `"usd"` 항목만 사용, 파싱 실패는 전체 실패
///   (부분적인 금융 데이터를 캐시/저장하지 않기 위해)
/// - token만 있거나 NFT만 있는 체인도 빈 목록으로 항상 존재
pub fn build_snapshot(
    address: &str,
    tokens: &TokenBatchResponse,
    nfts: &NftBatchResponse,
) -> Result<WalletSnapshot, WalletError> {
    let mut snapshot = WalletSnapshot::new(address);

    for entry in &tokens.data.tokens {
        let usd_price = usd_price(entry)?;
        if let Some(price) = &usd_price {
            snapshot.total_value_usd += price;
        }

        let holding = TokenHolding {
            contract_address: contract_address(entry),
            balance_raw: entry.token_balance.clone(),
            metadata: TokenMetadata {
                symbol: entry.token_metadata.symbol.clone(),
                name: entry.token_metadata.name.clone(),
                logo: entry.token_metadata.logo.clone(),
                decimals: entry.token_metadata.decimals,
            },
            usd_price,
        };

        let chain = snapshot.chains.entry(entry.network.clone()).or_default();
        if holding.contract_address.is_none() {
            if chain.native_token.is_some() {
                tracing::debug!(network = %entry.network, "duplicate native token entry, overwriting");
            }
            chain.native_token = Some(holding);
        } else {
            chain.tokens.push(holding);
        }
    }

    for nft in &nfts.data.owned_nfts {
        let chain = snapshot.chains.entry(nft.network.clone()).or_default();
        chain.nfts.push(NftHolding {
            contract_address: nft.contract_address.clone(),
            token_id: nft.token_id.clone(),
            balance: nft.balance.clone(),
            chain: nft.network.clone(),
            owner_address: nft.address.clone(),
        });
        chain.nft_count += 1;
    }

    Ok(snapshot)
}

fn contract_address(entry: &TokenEntry) -> Option<String> {
    entry
        .token_address
        .as_deref()
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
}

fn usd_price(entry: &TokenEntry) -> Result<Option<BigDecimal>, WalletError> {
    let Some(price) = entry.token_prices.iter().find(|p| p.currency == USD) else {
        return Ok(None);
    };

    BigDecimal::from_str(price.value.trim())
        .map(Some)
        .map_err(|e| {
            tracing::error!(
                network = %entry.network,
                value = %price.value,
                "can not parse usd price from provider"
            );
            WalletError::Parse(format!("usd price {:?}: {}", price.value, e))
        })
}
