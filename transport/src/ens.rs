//! ENS reverse lookup.
//!
//! Reverse records live under `<addr-hex>.addr.reverse`; the registry
//! hands out the resolver and the resolver serves `name(bytes32)`.
//! Resolution failures degrade to `None` per address, never to request
//! failures.

use alloy_primitives::{keccak256, B256};
use async_trait::async_trait;
use tracing::debug;

use dork_core::chain::EnsResolverT;
use dork_core::error::Result;

use crate::abi;
use crate::rpc::EthRpc;

/// The canonical ENS registry address, identical across mainnet and the
/// public testnets.
const ENS_REGISTRY: &str = "0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e";
const ZERO_WORD: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(buf);
    }
    node
}

pub struct EnsResolver {
    rpc: EthRpc,
}

impl EnsResolver {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            rpc: EthRpc::new(rpc_url),
        }
    }

    async fn reverse_name(&self, addr: &str) -> Result<Option<String>> {
        let hex_part = addr.strip_prefix("0x").unwrap_or(addr).to_ascii_lowercase();
        let node = namehash(&format!("{hex_part}.addr.reverse"));

        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&abi::selector("resolver(bytes32)"));
        data.extend_from_slice(&abi::word_b256(node));
        let resolver_word = self
            .rpc
            .eth_call(ENS_REGISTRY, &abi::to_hex(&data))
            .await?;
        if resolver_word == ZERO_WORD || resolver_word == "0x" {
            return Ok(None);
        }
        let resolver = abi::decode_address_word(&resolver_word)?;
        if resolver.is_zero() {
            return Ok(None);
        }

        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&abi::selector("name(bytes32)"));
        data.extend_from_slice(&abi::word_b256(node));
        let output = self
            .rpc
            .eth_call(&abi::to_hex(resolver.as_slice()), &abi::to_hex(&data))
            .await?;
        let name = abi::decode_string(&output)?;
        Ok((!name.is_empty()).then_some(name))
    }
}

#[async_trait]
impl EnsResolverT for EnsResolver {
    async fn resolve_names(&self, addrs: &[String]) -> Result<Vec<Option<String>>> {
        let mut out = Vec::with_capacity(addrs.len());
        for addr in addrs {
            match self.reverse_name(addr).await {
                Ok(name) => out.push(name),
                Err(e) => {
                    debug!("ENS lookup failed for {addr}: {e}");
                    out.push(None);
                }
            }
        }
        Ok(out)
    }
}

/// Resolver used when no `ENS_RPC_URL` is configured.
#[derive(Default)]
pub struct NullEnsResolver;

#[async_trait]
impl EnsResolverT for NullEnsResolver {
    async fn resolve_names(&self, addrs: &[String]) -> Result<Vec<Option<String>>> {
        Ok(vec![None; addrs.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namehash_base_cases() {
        assert_eq!(namehash(""), B256::ZERO);
        // namehash("eth") = keccak(0x00*32 ++ keccak("eth"))
        let mut buf = [0u8; 64];
        buf[32..].copy_from_slice(keccak256(b"eth").as_slice());
        assert_eq!(namehash("eth"), keccak256(buf));
    }

    #[test]
    fn test_namehash_is_hierarchical() {
        let eth = namehash("eth");
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(eth.as_slice());
        buf[32..].copy_from_slice(keccak256(b"dork").as_slice());
        assert_eq!(namehash("dork.eth"), keccak256(buf));
    }

    #[tokio::test]
    async fn test_null_resolver_shape() {
        let resolver = NullEnsResolver;
        let out = resolver
            .resolve_names(&["0xaa".into(), "0xbb".into()])
            .await
            .unwrap();
        assert_eq!(out, vec![None, None]);
    }
}
