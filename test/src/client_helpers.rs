//! A simulated player: fresh EVM keypair plus signing helpers for the
//! HTTP auth envelope and the session HELLO.

use k256::ecdsa::SigningKey;
use serde_json::{json, Value};

use dork_core::credentials::{canonical_auth_message, ServerKey};
use dork_core::frame::{Frame, FrameType};

pub struct TestClient {
    key: ServerKey,
}

impl TestClient {
    pub fn new() -> Self {
        let key = SigningKey::random(&mut rand::thread_rng());
        Self::from_signing_key(key)
    }

    /// Deterministic client for reproducible fixtures.  `seed` must be
    /// non-zero.
    pub fn from_seed(seed: u8) -> Self {
        assert_ne!(seed, 0, "zero is not a valid key");
        let key = SigningKey::from_slice(&[seed; 32]).expect("valid scalar");
        Self::from_signing_key(key)
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let hex_key = format!("0x{}", hex::encode(key.to_bytes()));
        Self {
            key: ServerKey::from_hex(&hex_key).expect("round-trips"),
        }
    }

    /// Lowercase 0x address of this client.
    pub fn addr(&self) -> String {
        self.key.address()
    }

    /// Sign the canonical auth message at `now`.
    pub fn sign_auth(&self, now: u64) -> String {
        let message = canonical_auth_message(&self.addr(), now);
        self.key.sign_message(&message).expect("signing works")
    }

    /// The `{playerId, signature, timestamp}` envelope merged into
    /// authenticated request bodies.
    pub fn auth_fields(&self, now: u64) -> Value {
        json!({
            "playerId": self.addr(),
            "signature": self.sign_auth(now),
            "timestamp": now,
        })
    }

    /// An authenticated request body: `extra` plus the auth envelope.
    pub fn auth_body(&self, now: u64, extra: Value) -> Value {
        let mut body = self.auth_fields(now);
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        body
    }

    /// First-attach HELLO consuming a WS token.
    pub fn hello_with_token(&self, match_id: &str, token: &str) -> Frame {
        Frame::new(
            FrameType::Hello,
            match_id,
            json!({"token": token, "playerId": self.addr()}),
        )
    }

    /// Signed reattach HELLO.
    pub fn hello_signed(&self, match_id: &str, now: u64) -> Frame {
        Frame::new(
            FrameType::Hello,
            match_id,
            json!({
                "playerId": self.addr(),
                "signature": self.sign_auth(now),
                "timestamp": now,
            }),
        )
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_core::credentials::verify_player_auth;

    #[test]
    fn test_auth_round_trip() {
        let client = TestClient::new();
        let now = 1_700_000_000_000;
        let sig = client.sign_auth(now);
        let verified = verify_player_auth(&client.addr(), &sig, now, now).unwrap();
        assert_eq!(verified, client.addr());
    }

    #[test]
    fn test_from_seed_is_stable() {
        assert_eq!(TestClient::from_seed(7).addr(), TestClient::from_seed(7).addr());
        assert_ne!(TestClient::from_seed(7).addr(), TestClient::from_seed(8).addr());
    }
}
