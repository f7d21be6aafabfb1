//! Outcome attestation submission.
//!
//! One server-signed `submitOutcome(bytes32,address,bool,bytes32)` call
//! per terminal staked match, sent as a legacy EIP-155 transaction.

use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_rlp::{Encodable, RlpEncodable};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

use dork_core::chain::{OutcomeAttestation, SettlementT};
use dork_core::credentials::ServerKey;
use dork_core::error::{Error, Result};

use crate::abi;
use crate::rpc::EthRpc;

const SUBMIT_OUTCOME: &str = "submitOutcome(bytes32,address,bool,bytes32)";
const GAS_LIMIT: u64 = 200_000;

#[derive(RlpEncodable)]
struct UnsignedLegacyTx {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    chain_id: u64,
    zero_r: u8,
    zero_s: u8,
}

#[derive(RlpEncodable)]
struct SignedLegacyTx {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    v: u64,
    r: U256,
    s: U256,
}

pub struct EvmSettlement {
    rpc: EthRpc,
    address: Address,
    key: ServerKey,
    chain_id: OnceCell<u64>,
}

impl EvmSettlement {
    pub fn new(rpc_url: &str, settlement_address: &str, key: ServerKey) -> Result<Self> {
        let raw = abi::from_hex(settlement_address)?;
        if raw.len() != 20 {
            return Err(Error::SettlementError(format!(
                "bad settlement address: {settlement_address}"
            )));
        }
        Ok(Self {
            rpc: EthRpc::new(rpc_url),
            address: Address::from_slice(&raw),
            key,
            chain_id: OnceCell::new(),
        })
    }

    fn encode_call(attestation: &OutcomeAttestation) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32 * 4);
        data.extend_from_slice(&abi::selector(SUBMIT_OUTCOME));
        data.extend_from_slice(&abi::word_b256(attestation.match_id));
        data.extend_from_slice(&abi::word_address(attestation.winner));
        data.extend_from_slice(&abi::word_bool(attestation.draw));
        data.extend_from_slice(&abi::word_b256(attestation.root_hash));
        data
    }

    fn sign_tx(
        &self,
        nonce: u64,
        gas_price: u128,
        chain_id: u64,
        data: Vec<u8>,
    ) -> Result<String> {
        let call_data = Bytes::from(data);
        let unsigned = UnsignedLegacyTx {
            nonce,
            gas_price,
            gas_limit: GAS_LIMIT,
            to: self.address,
            value: U256::ZERO,
            data: call_data.clone(),
            chain_id,
            zero_r: 0,
            zero_s: 0,
        };
        let mut payload = Vec::new();
        unsigned.encode(&mut payload);
        let digest = keccak256(&payload);

        let (sig, recovery_id) = self
            .key
            .signing_key()
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| Error::SettlementError(format!("signing failed: {e}")))?;
        let sig_bytes = sig.to_bytes();

        let signed = SignedLegacyTx {
            nonce,
            gas_price,
            gas_limit: GAS_LIMIT,
            to: self.address,
            value: U256::ZERO,
            data: call_data,
            v: chain_id * 2 + 35 + recovery_id.to_byte() as u64,
            r: U256::from_be_slice(&sig_bytes[..32]),
            s: U256::from_be_slice(&sig_bytes[32..]),
        };
        let mut raw = Vec::new();
        signed.encode(&mut raw);
        Ok(abi::to_hex(&raw))
    }
}

#[async_trait]
impl SettlementT for EvmSettlement {
    async fn submit_outcome(&self, attestation: OutcomeAttestation) -> Result<String> {
        let chain_id = *self
            .chain_id
            .get_or_try_init(|| self.rpc.chain_id())
            .await?;
        let sender = self.key.address();
        let nonce = self.rpc.transaction_count(&sender).await?;
        let gas_price = self.rpc.gas_price().await?;

        let raw = self.sign_tx(
            nonce,
            gas_price,
            chain_id,
            Self::encode_call(&attestation),
        )?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;
        info!(
            "Submitted outcome for {}: tx {}",
            attestation.match_id, tx_hash
        );
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn settlement() -> EvmSettlement {
        let key = ServerKey::from_hex(
            "0x0101010101010101010101010101010101010101010101010101010101010101",
        )
        .unwrap();
        EvmSettlement::new(
            "http://127.0.0.1:8545",
            "0x00000000000000000000000000000000000000ee",
            key,
        )
        .unwrap()
    }

    #[test]
    fn test_call_data_layout() {
        let attestation = OutcomeAttestation {
            match_id: B256::repeat_byte(0x11),
            winner: Address::repeat_byte(0x22),
            draw: false,
            root_hash: B256::repeat_byte(0x33),
        };
        let data = EvmSettlement::encode_call(&attestation);
        assert_eq!(data.len(), 4 + 32 * 4);
        assert_eq!(&data[4..36], B256::repeat_byte(0x11).as_slice());
        assert_eq!(&data[48..68], Address::repeat_byte(0x22).as_slice());
        assert_eq!(data[99], 0); // draw flag
        assert_eq!(&data[100..132], B256::repeat_byte(0x33).as_slice());
    }

    #[test]
    fn test_signed_tx_is_stable_hex() {
        let s = settlement();
        let data = EvmSettlement::encode_call(&OutcomeAttestation {
            match_id: B256::repeat_byte(0x01),
            winner: Address::ZERO,
            draw: true,
            root_hash: B256::repeat_byte(0x02),
        });
        let raw_a = s.sign_tx(7, 1_000_000_000, 1, data.clone()).unwrap();
        let raw_b = s.sign_tx(7, 1_000_000_000, 1, data).unwrap();
        assert_eq!(raw_a, raw_b);
        assert!(raw_a.starts_with("0x"));
    }
}
