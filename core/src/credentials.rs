//! EVM key authentication.
//!
//! Players authenticate by personal-signing (EIP-191) the canonical
//! message `"dork.fun authentication for <addr> at <timestamp>"`.  The
//! server recovers the signer and requires it to match the claimed
//! address; timestamps are bounded to a 5 minute window.

use alloy_primitives::keccak256;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::{Error, Result};

/// Signature validity window in milliseconds.
pub const AUTH_WINDOW_MS: u64 = 5 * 60 * 1000;

pub fn canonical_auth_message(player_id: &str, timestamp: u64) -> String {
    format!("dork.fun authentication for {player_id} at {timestamp}")
}

/// Canonicalize an EVM address to 0x-prefixed lowercase hex.
pub fn canonicalize_address(addr: &str) -> Result<String> {
    let stripped = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .ok_or_else(|| Error::AuthMalformedAddress(addr.to_owned()))?;
    if stripped.len() != 40 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::AuthMalformedAddress(addr.to_owned()));
    }
    Ok(format!("0x{}", stripped.to_ascii_lowercase()))
}

/// EIP-191 digest of an arbitrary message.
pub fn personal_sign_digest(message: &str) -> [u8; 32] {
    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    keccak256(prefixed.as_bytes()).0
}

/// Recover the lowercase signer address of a personal-signed message.
/// The signature is 65 bytes `r || s || v` in hex, `v` either 0/1 or
/// 27/28.
pub fn recover_address(message: &str, signature: &str) -> Result<String> {
    let raw = signature.strip_prefix("0x").unwrap_or(signature);
    let bytes = hex::decode(raw).map_err(|_| Error::AuthInvalidSignature)?;
    if bytes.len() != 65 {
        return Err(Error::AuthInvalidSignature);
    }
    let sig = Signature::from_slice(&bytes[..64]).map_err(|_| Error::AuthInvalidSignature)?;
    let v = match bytes[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        _ => return Err(Error::AuthInvalidSignature),
    };
    let recovery_id = RecoveryId::from_byte(v).ok_or(Error::AuthInvalidSignature)?;
    let digest = personal_sign_digest(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| Error::AuthInvalidSignature)?;
    Ok(address_of(&key))
}

fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Verify a `{playerId, signature, timestamp}` triple against the
/// canonical auth message.
pub fn verify_player_auth(
    player_id: &str,
    signature: &str,
    timestamp: u64,
    now: u64,
) -> Result<String> {
    let player_id = canonicalize_address(player_id)?;
    if now.abs_diff(timestamp) > AUTH_WINDOW_MS {
        return Err(Error::AuthExpiredTimestamp);
    }
    let message = canonical_auth_message(&player_id, timestamp);
    let recovered = recover_address(&message, signature)?;
    if recovered != player_id {
        return Err(Error::AuthInvalidSignature);
    }
    Ok(player_id)
}

/// The server's settlement key.
#[derive(Clone)]
pub struct ServerKey {
    key: SigningKey,
}

impl ServerKey {
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let raw = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = hex::decode(raw)
            .map_err(|e| Error::InternalError(format!("bad server key: {e}")))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| Error::InternalError(format!("bad server key: {e}")))?;
        Ok(Self { key })
    }

    pub fn address(&self) -> String {
        address_of(self.key.verifying_key())
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// Personal-sign a message; 65-byte hex with `v` in {27, 28}.
    pub fn sign_message(&self, message: &str) -> Result<String> {
        let digest = personal_sign_digest(message);
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| Error::InternalError(format!("signing failed: {e}")))?;
        let mut out = sig.to_bytes().to_vec();
        out.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", hex::encode(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> ServerKey {
        ServerKey::from_hex("0x0101010101010101010101010101010101010101010101010101010101010101")
            .unwrap()
    }

    #[test]
    fn test_sign_and_recover_round_trip() {
        let key = test_key();
        let msg = canonical_auth_message(&key.address(), 1_700_000_000_000);
        let sig = key.sign_message(&msg).unwrap();
        assert_eq!(recover_address(&msg, &sig).unwrap(), key.address());
    }

    #[test]
    fn test_verify_player_auth_happy_path() {
        let key = test_key();
        let now = 1_700_000_000_000;
        let msg = canonical_auth_message(&key.address(), now);
        let sig = key.sign_message(&msg).unwrap();
        let recovered = verify_player_auth(&key.address(), &sig, now, now + 1000).unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let key = test_key();
        let signed_at = 1_700_000_000_000;
        let msg = canonical_auth_message(&key.address(), signed_at);
        let sig = key.sign_message(&msg).unwrap();
        let err = verify_player_auth(&key.address(), &sig, signed_at, signed_at + AUTH_WINDOW_MS + 1)
            .unwrap_err();
        assert_eq!(err, Error::AuthExpiredTimestamp);
    }

    #[test]
    fn test_wrong_claimed_address_rejected() {
        let key = test_key();
        let now = 1_700_000_000_000;
        let other = "0x00000000000000000000000000000000000000aa";
        let msg = canonical_auth_message(other, now);
        let sig = key.sign_message(&msg).unwrap();
        let err = verify_player_auth(other, &sig, now, now).unwrap_err();
        assert_eq!(err, Error::AuthInvalidSignature);
    }

    #[test]
    fn test_canonicalize_address() {
        assert_eq!(
            canonicalize_address("0xAbCd000000000000000000000000000000000001").unwrap(),
            "0xabcd000000000000000000000000000000000001"
        );
        assert!(canonicalize_address("abcd").is_err());
        assert!(canonicalize_address("0x123").is_err());
        assert!(canonicalize_address("0xzz00000000000000000000000000000000000000").is_err());
    }

    #[test]
    fn test_malformed_signature_rejected() {
        assert!(recover_address("hi", "0x1234").is_err());
        assert!(recover_address("hi", "not-hex").is_err());
    }
}
