//! Thin JSON-RPC client for EVM nodes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use dork_core::error::{Error, Result};

pub struct EthRpc {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl EthRpc {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_owned(),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::TransportError(format!("{method}: {e}")))?;
        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::TransportError(format!("{method}: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(Error::TransportError(format!(
                "{method}: rpc error {}: {}",
                error.code, error.message
            )));
        }
        parsed
            .result
            .ok_or_else(|| Error::TransportError(format!("{method}: empty result")))
    }

    /// `eth_call` against a contract; returns the raw hex output.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String> {
        self.call("eth_call", json!([{"to": to, "data": data}, "latest"]))
            .await
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let hex_id: String = self.call("eth_chainId", json!([])).await?;
        parse_hex_u64(&hex_id)
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let hex_price: String = self.call("eth_gasPrice", json!([])).await?;
        parse_hex_u64(&hex_price).map(u128::from)
    }

    pub async fn transaction_count(&self, addr: &str) -> Result<u64> {
        let hex_nonce: String = self
            .call("eth_getTransactionCount", json!([addr, "pending"]))
            .await?;
        parse_hex_u64(&hex_nonce)
    }

    pub async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String> {
        self.call("eth_sendRawTransaction", json!([raw_hex])).await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

impl EthRpc {
    pub async fn get_logs(&self, address: &str, topics: Vec<Value>) -> Result<Vec<LogEntry>> {
        self.call(
            "eth_getLogs",
            json!([{
                "address": address,
                "topics": topics,
                "fromBlock": "0x0",
                "toBlock": "latest",
            }]),
        )
        .await
    }
}

pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| Error::TransportError(format!("bad hex quantity {value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x2a").unwrap(), 42);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0xzz").is_err());
    }
}
