//! Seams to the on-chain collaborators.
//!
//! The Escrow and Settlement contracts themselves are external; these
//! traits are the whole of what the runtime relies on.

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;

use crate::error::Result;

/// The 32-byte match identifier used on chain: keccak256 of the match
/// id's text form.
pub fn match_id_bytes32(match_id: &str) -> B256 {
    keccak256(match_id.as_bytes())
}

/// Parse a stake string (decimal wei) into its numeric form.
pub fn parse_stake(stake: &str) -> Option<U256> {
    if stake.is_empty() || !stake.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(stake, 10).ok()
}

/// Render an address as 0x-prefixed lowercase hex.
pub fn address_hex(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_slice()))
}

/// Parse a 0x-prefixed 20-byte hex address.
pub fn parse_address(addr: &str) -> Result<Address> {
    let canonical = crate::credentials::canonicalize_address(addr)?;
    let bytes = hex::decode(&canonical[2..])
        .map_err(|e| crate::error::Error::AuthMalformedAddress(e.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Escrow reads: the deposit gate observes these.
#[async_trait]
pub trait EscrowT: Send + Sync {
    /// The minimum stake accepted for staked matches.
    async fn minimum_stake(&self) -> Result<U256>;

    /// Players whose `Deposited(matchIdBytes32, player)` event has been
    /// observed for the given match.
    async fn deposits(&self, match_id: B256) -> Result<Vec<Address>>;
}

/// The outcome tuple submitted once per terminal staked match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeAttestation {
    pub match_id: B256,
    /// Winner address, or zero for a draw.
    pub winner: Address,
    pub draw: bool,
    pub root_hash: B256,
}

#[async_trait]
pub trait SettlementT: Send + Sync {
    /// Submit the attestation with the server's settlement key.
    /// Returns the transaction id.
    async fn submit_outcome(&self, attestation: OutcomeAttestation) -> Result<String>;
}

/// ENS reverse lookup, batched by the edge API.
#[async_trait]
pub trait EnsResolverT: Send + Sync {
    /// One entry per input address; `None` when no reverse record.
    async fn resolve_names(&self, addrs: &[String]) -> Result<Vec<Option<String>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_bytes32_deterministic() {
        let a = match_id_bytes32("7c0e0713-6e41-43a3-9a9e-bc0c0f8f4a17");
        let b = match_id_bytes32("7c0e0713-6e41-43a3-9a9e-bc0c0f8f4a17");
        let c = match_id_bytes32("something-else");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_parse_stake() {
        assert_eq!(parse_stake("0"), Some(U256::ZERO));
        assert_eq!(
            parse_stake("10000000000000000"),
            Some(U256::from(10_000_000_000_000_000u64))
        );
        assert_eq!(parse_stake(""), None);
        assert_eq!(parse_stake("-5"), None);
        assert_eq!(parse_stake("1.5"), None);
        assert_eq!(parse_stake("0x10"), None);
    }

    #[test]
    fn test_address_hex_is_lowercase() {
        let addr = Address::repeat_byte(0xAB);
        assert_eq!(address_hex(addr), format!("0x{}", "ab".repeat(20)));
    }
}
