//! Escrow contract reads.
//!
//! The server never writes to the Escrow; clients call
//! `depositStake(bytes32)` themselves and the server only observes the
//! resulting `Deposited(bytes32,address)` events.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use dork_core::chain::EscrowT;
use dork_core::error::{Error, Result};

use crate::abi;
use crate::rpc::EthRpc;

const DEPOSITED_EVENT: &str = "Deposited(bytes32,address)";

pub struct EvmEscrow {
    rpc: EthRpc,
    address: String,
}

impl EvmEscrow {
    pub fn new(rpc_url: &str, escrow_address: &str) -> Self {
        Self {
            rpc: EthRpc::new(rpc_url),
            address: escrow_address.to_owned(),
        }
    }
}

#[async_trait]
impl EscrowT for EvmEscrow {
    async fn minimum_stake(&self) -> Result<U256> {
        let data = abi::to_hex(&abi::selector("minimumStake()"));
        let output = self.rpc.eth_call(&self.address, &data).await?;
        abi::decode_u256(&output)
    }

    async fn deposits(&self, match_id: B256) -> Result<Vec<Address>> {
        let topics: Vec<Value> = vec![
            json!(abi::to_hex(abi::event_topic(DEPOSITED_EVENT).as_slice())),
            json!(abi::to_hex(match_id.as_slice())),
        ];
        let logs = self.rpc.get_logs(&self.address, topics).await?;
        let mut players = Vec::with_capacity(logs.len());
        for log in logs {
            // The player is the second indexed topic; older contract
            // builds carried it unindexed in the data word.
            let player = if log.topics.len() >= 3 {
                abi::decode_address_word(&log.topics[2])
            } else if !log.data.is_empty() && log.data != "0x" {
                abi::decode_address_word(&log.data)
            } else {
                Err(Error::TransportError("deposit log without player".into()))
            }?;
            debug!("Observed deposit for {match_id}: {player}");
            if !players.contains(&player) {
                players.push(player);
            }
        }
        Ok(players)
    }
}
