//! Minimal ABI encoding for the handful of fixed contract calls the
//! server makes.

use alloy_primitives::{keccak256, Address, B256, U256};

use dork_core::error::{Error, Result};

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

pub fn word_b256(value: B256) -> [u8; 32] {
    value.0
}

pub fn word_address(value: Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(value.as_slice());
    out
}

pub fn word_bool(value: bool) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[31] = value as u8;
    out
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| Error::TransportError(format!("bad hex: {e}")))
}

pub fn decode_u256(output: &str) -> Result<U256> {
    let bytes = from_hex(output)?;
    if bytes.len() < 32 {
        return Err(Error::TransportError(format!(
            "short abi word: {} bytes",
            bytes.len()
        )));
    }
    Ok(U256::from_be_slice(&bytes[..32]))
}

pub fn decode_address_word(word: &str) -> Result<Address> {
    let bytes = from_hex(word)?;
    if bytes.len() < 32 {
        return Err(Error::TransportError(format!(
            "short address word: {} bytes",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes[12..32]))
}

/// Decode a single dynamic `string` return value.
pub fn decode_string(output: &str) -> Result<String> {
    let bytes = from_hex(output)?;
    if bytes.len() < 64 {
        return Err(Error::TransportError("short string output".into()));
    }
    let offset = U256::from_be_slice(&bytes[..32]).to::<usize>();
    if bytes.len() < offset + 32 {
        return Err(Error::TransportError("truncated string output".into()));
    }
    let len = U256::from_be_slice(&bytes[offset..offset + 32]).to::<usize>();
    let start = offset + 32;
    if bytes.len() < start + len {
        return Err(Error::TransportError("truncated string output".into()));
    }
    String::from_utf8(bytes[start..start + len].to_vec())
        .map_err(|e| Error::TransportError(format!("non-utf8 string output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_shapes() {
        let addr = Address::repeat_byte(0x11);
        let word = word_address(addr);
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], addr.as_slice());

        assert_eq!(word_bool(true)[31], 1);
        assert_eq!(word_bool(false), [0u8; 32]);
    }

    #[test]
    fn test_decode_string() {
        // abi encoding of ("dork.eth")
        let mut buf = Vec::new();
        buf.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
        buf.extend_from_slice(&U256::from(8u64).to_be_bytes::<32>());
        let mut data = b"dork.eth".to_vec();
        data.resize(32, 0);
        buf.extend_from_slice(&data);
        assert_eq!(decode_string(&to_hex(&buf)).unwrap(), "dork.eth");
    }

    #[test]
    fn test_decode_u256_and_address() {
        let value = U256::from(12345u64);
        let word = value.to_be_bytes::<32>();
        assert_eq!(decode_u256(&to_hex(&word)).unwrap(), value);

        let addr = Address::repeat_byte(0xab);
        assert_eq!(
            decode_address_word(&to_hex(&word_address(addr))).unwrap(),
            addr
        );
    }

    #[test]
    fn test_selector_is_four_bytes_of_keccak() {
        let sel = selector("minimumStake()");
        let topic = event_topic("minimumStake()");
        assert_eq!(&sel[..], &topic[..4]);
    }
}
