//! Analysis Prompt Builder
//!
//! 스냅샷을 LLM 입력 텍스트로 직렬화한다. 섹션 순서가 고정되어 있고
//! 체인은 `BTreeMap` 순서로 출력되므로 같은 스냅샷이면 같은 프롬프트가 나온다.
//!
//! 섹션 순서:
//! 1. Basic Information
//! 2. Holdings (체인별 native → tokens → NFTs)
//! 3. Transfer History
//! 4. Requested Output

use std::fmt::Write;

use sha3::{Digest, Keccak256};

use crate::types::{AssetTransfer, ChainHolding, TokenHolding, WalletSnapshot};

/// 방향별 프롬프트에 포함할 최대 전송 수
const MAX_TRANSFERS_PER_DIRECTION: usize = 50;

pub const SYSTEM_PROMPT: &str = "You are a Web3 security analyst. \
Analyse the wallet described by the user: its assets, its on-chain behaviour and its exposure to risk. \
Base every statement on the data provided and say so when the data is insufficient. \
Answer in plain text without markdown tables.";

/// 사용자 프롬프트 생성
pub fn build_user_prompt(snapshot: &WalletSnapshot) -> String {
    let mut out = String::new();
    // String에 대한 write!는 실패하지 않음
    let _ = render(snapshot, &mut out);
    out
}

/// 감사 로그용 프롬프트 해시 (Keccak-256)
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(prompt.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

fn render(snapshot: &WalletSnapshot, out: &mut String) -> std::fmt::Result {
    writeln!(out, "Analyse the following wallet as a Web3 security expert.")?;
    writeln!(out)?;

    writeln!(out, "## Basic Information")?;
    writeln!(out, "- Address: {}", snapshot.address)?;
    writeln!(out, "- Total value (USD, sum of unit prices): {}", snapshot.total_value_usd)?;
    writeln!(out, "- Chains: {}", snapshot.chains.len())?;
    writeln!(out)?;

    writeln!(out, "## Holdings")?;
    if snapshot.chains.is_empty() {
        writeln!(out, "No holdings found.")?;
    }
    for (chain, holding) in &snapshot.chains {
        render_chain(chain, holding, out)?;
    }
    writeln!(out)?;

    writeln!(out, "## Transfer History")?;
    match &snapshot.transfers {
        Some(history) => {
            render_transfers("Outgoing", &history.outgoing, out)?;
            render_transfers("Incoming", &history.incoming, out)?;
        }
        None => writeln!(out, "Not available.")?,
    }
    writeln!(out)?;

    writeln!(out, "## Requested Output")?;
    writeln!(out, "1. Wallet behaviour summary")?;
    writeln!(out, "2. Risk score (0-100)")?;
    writeln!(out, "3. Risk analysis")?;
    writeln!(out, "4. Recommendations")?;
    Ok(())
}

fn render_chain(chain: &str, holding: &ChainHolding, out: &mut String) -> std::fmt::Result {
    writeln!(out, "### {}", chain)?;

    match &holding.native_token {
        Some(native) => writeln!(out, "- Native: {}", describe_token(native))?,
        None => writeln!(out, "- Native: none")?,
    }

    writeln!(out, "- Tokens ({}):", holding.tokens.len())?;
    for token in &holding.tokens {
        writeln!(out, "  - {}", describe_token(token))?;
    }

    writeln!(out, "- NFTs ({}):", holding.nft_count)?;
    for nft in &holding.nfts {
        writeln!(out, "  - {} #{} x{}", nft.contract_address, nft.token_id, nft.balance)?;
    }
    Ok(())
}

fn describe_token(token: &TokenHolding) -> String {
    let symbol = token.metadata.symbol.as_deref().unwrap_or("UNKNOWN");
    let mut line = format!("{} balance_raw={}", symbol, token.balance_raw);
    if let Some(contract) = &token.contract_address {
        line.push_str(&format!(" contract={}", contract));
    }
    if let Some(decimals) = token.metadata.decimals {
        line.push_str(&format!(" decimals={}", decimals));
    }
    match &token.usd_price {
        Some(price) => line.push_str(&format!(" usd_price={}", price)),
        None => line.push_str(" usd_price=unknown"),
    }
    line
}

fn render_transfers(label: &str, transfers: &[AssetTransfer], out: &mut String) -> std::fmt::Result {
    writeln!(out, "{} ({}):", label, transfers.len())?;
    for transfer in transfers.iter().take(MAX_TRANSFERS_PER_DIRECTION) {
        writeln!(
            out,
            "  - block={} {} -> {} value={} {} [{}] tx={}",
            transfer.block_num,
            transfer.from,
            transfer.to.as_deref().unwrap_or("-"),
            transfer
                .value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string()),
            transfer.asset.as_deref().unwrap_or("-"),
            transfer.category,
            transfer.hash,
        )?;
    }
    if transfers.len() > MAX_TRANSFERS_PER_DIRECTION {
        writeln!(out, "  ... and {} more", transfers.len() - MAX_TRANSFERS_PER_DIRECTION)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NftHolding, TokenMetadata, TransferHistory};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn snapshot() -> WalletSnapshot {
        let mut snapshot = WalletSnapshot::new("0xabc");
        snapshot.total_value_usd = dec("2001.00");
        snapshot.chains.insert(
            "polygon-mainnet".into(),
            ChainHolding {
                nfts: vec![NftHolding {
                    contract_address: "0xpunks".into(),
                    token_id: "9".into(),
                    balance: "1".into(),
                    chain: "polygon-mainnet".into(),
                    owner_address: "0xabc".into(),
                }],
                nft_count: 1,
                ..Default::default()
            },
        );
        snapshot.chains.insert(
            "eth-mainnet".into(),
            ChainHolding {
                native_token: Some(TokenHolding {
                    contract_address: None,
                    balance_raw: "1000000000000000000".into(),
                    metadata: TokenMetadata {
                        symbol: Some("ETH".into()),
                        decimals: Some(18),
                        ..Default::default()
                    },
                    usd_price: Some(dec("2000.00")),
                }),
                ..Default::default()
            },
        );
        snapshot
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{:?} missing from prompt", needle))
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let prompt = build_user_prompt(&snapshot());

        let basic = position(&prompt, "## Basic Information");
        let holdings = position(&prompt, "## Holdings");
        let transfers = position(&prompt, "## Transfer History");
        let output = position(&prompt, "## Requested Output");
        assert!(basic < holdings && holdings < transfers && transfers < output);

        // 체인은 이름순
        assert!(position(&prompt, "### eth-mainnet") < position(&prompt, "### polygon-mainnet"));
        assert!(prompt.contains("ETH balance_raw=1000000000000000000 decimals=18 usd_price=2000.00"));
        assert!(prompt.contains("0xpunks #9 x1"));
        assert!(prompt.contains("Not available."));
        assert!(prompt.contains("2. Risk score (0-100)"));
    }

    #[test]
    fn test_same_snapshot_same_prompt_and_hash() {
        let a = build_user_prompt(&snapshot());
        let b = build_user_prompt(&snapshot());

        assert_eq!(a, b);
        assert_eq!(prompt_hash(&a), prompt_hash(&b));
        assert_eq!(prompt_hash(&a).len(), 66);
    }

    #[test]
    fn test_prompt_hash_known_vector() {
        // keccak256("")
        assert_eq!(
            prompt_hash(""),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_transfers_rendered_and_capped() {
        let mut snapshot = snapshot();
        let transfer = AssetTransfer {
            block_num: "0x10".into(),
            hash: "0xh".into(),
            from: "0xabc".into(),
            to: Some("0xdef".into()),
            value: Some(dec("0.5")),
            asset: Some("ETH".into()),
            category: "external".into(),
        };
        snapshot.transfers = Some(TransferHistory {
            outgoing: vec![transfer.clone(); MAX_TRANSFERS_PER_DIRECTION + 2],
            incoming: vec![],
        });

        let prompt = build_user_prompt(&snapshot);

        assert!(prompt.contains(&format!("Outgoing ({}):", MAX_TRANSFERS_PER_DIRECTION + 2)));
        assert!(prompt.contains("0xabc -> 0xdef value=0.5 ETH [external]"));
        assert!(prompt.contains("... and 2 more"));
        assert!(prompt.contains("Incoming (0):"));
        assert!(!prompt.contains("Not available."));
    }
}
