//! Scriptable chain adapters.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

use dork_core::chain::{EscrowT, OutcomeAttestation, SettlementT};
use dork_core::error::{Error, Result};

/// Escrow whose deposits are driven by the test.
pub struct DummyEscrow {
    minimum: Mutex<U256>,
    deposits: Arc<Mutex<HashMap<B256, Vec<Address>>>>,
}

impl Default for DummyEscrow {
    fn default() -> Self {
        Self {
            minimum: Mutex::new(U256::from(1_000_000u64)),
            deposits: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl DummyEscrow {
    pub fn set_minimum(&self, minimum: U256) {
        *self.minimum.lock().unwrap() = minimum;
    }

    /// Simulate an observed `Deposited(matchId, player)` event.
    pub fn add_deposit(&self, match_id: B256, player: Address) {
        let mut deposits = self.deposits.lock().unwrap();
        let entry = deposits.entry(match_id).or_default();
        if !entry.contains(&player) {
            entry.push(player);
        }
    }
}

#[async_trait]
impl EscrowT for DummyEscrow {
    async fn minimum_stake(&self) -> Result<U256> {
        Ok(*self.minimum.lock().unwrap())
    }

    async fn deposits(&self, match_id: B256) -> Result<Vec<Address>> {
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .get(&match_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Settlement sink recording every submitted attestation.
#[derive(Default)]
pub struct DummySettlement {
    submitted: Arc<Mutex<Vec<OutcomeAttestation>>>,
    fail_remaining: Mutex<u32>,
}

impl DummySettlement {
    pub fn submitted(&self) -> impl Deref<Target = Vec<OutcomeAttestation>> + '_ {
        self.submitted.lock().unwrap()
    }

    /// Make the next `n` submissions fail.
    pub fn fail_next(&self, n: u32) {
        *self.fail_remaining.lock().unwrap() = n;
    }
}

#[async_trait]
impl SettlementT for DummySettlement {
    async fn submit_outcome(&self, attestation: OutcomeAttestation) -> Result<String> {
        {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::SettlementError("simulated failure".into()));
            }
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(attestation);
        Ok(format!("0xtx{:04x}", submitted.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_escrow_scripting() {
        let escrow = DummyEscrow::default();
        let match_id = B256::repeat_byte(1);
        assert!(escrow.deposits(match_id).await.unwrap().is_empty());

        let player = Address::repeat_byte(2);
        escrow.add_deposit(match_id, player);
        escrow.add_deposit(match_id, player);
        assert_eq!(escrow.deposits(match_id).await.unwrap(), vec![player]);
    }

    #[tokio::test]
    async fn test_dummy_settlement_fail_then_succeed() {
        let settlement = DummySettlement::default();
        settlement.fail_next(2);
        let attestation = OutcomeAttestation {
            match_id: B256::repeat_byte(1),
            winner: Address::ZERO,
            draw: true,
            root_hash: B256::repeat_byte(2),
        };
        assert!(settlement.submit_outcome(attestation.clone()).await.is_err());
        assert!(settlement.submit_outcome(attestation.clone()).await.is_err());
        let tx = settlement.submit_outcome(attestation).await.unwrap();
        assert!(tx.starts_with("0xtx"));
        assert_eq!(settlement.submitted().len(), 1);
    }
}
