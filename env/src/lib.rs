//! Configuration of the application.
//!
//! Everything comes from the environment; unset optional values fall
//! back to development defaults (sqlite file database, in-memory
//! coordination store, no chain connectivity).

use std::env;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_STALE_MATCH_TIMEOUT_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_DEPOSIT_TIMEOUT_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_MOVE_TIMEOUT_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub rpc_url: Option<String>,
    pub ens_rpc_url: Option<String>,
    pub server_private_key: Option<String>,
    pub escrow_address: Option<String>,
    pub settlement_address: Option<String>,
    pub settlement_enabled: bool,
    pub admin_secret: Option<String>,
    pub port: u16,
    pub stale_match_timeout_ms: u64,
    pub deposit_timeout_ms: u64,
    pub default_move_timeout_ms: u64,
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional(var) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match optional("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var: "PORT", value })?,
            None => DEFAULT_PORT,
        };
        let settlement_enabled = match optional("SETTLEMENT_ENABLED").as_deref() {
            None => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(value) => {
                return Err(ConfigError::InvalidValue {
                    var: "SETTLEMENT_ENABLED",
                    value: value.to_owned(),
                })
            }
        };
        Ok(Self {
            database_url: optional("DATABASE_URL").unwrap_or_else(|| "dork.db".to_owned()),
            redis_url: optional("REDIS_URL"),
            rpc_url: optional("RPC_URL"),
            ens_rpc_url: optional("ENS_RPC_URL"),
            server_private_key: optional("SERVER_PRIVATE_KEY"),
            escrow_address: optional("ESCROW_ADDRESS"),
            settlement_address: optional("SETTLEMENT_ADDRESS"),
            settlement_enabled,
            admin_secret: optional("ADMIN_SECRET"),
            port,
            stale_match_timeout_ms: parse_u64(
                "STALE_MATCH_TIMEOUT_MS",
                DEFAULT_STALE_MATCH_TIMEOUT_MS,
            )?,
            deposit_timeout_ms: parse_u64("DEPOSIT_TIMEOUT_MS", DEFAULT_DEPOSIT_TIMEOUT_MS)?,
            default_move_timeout_ms: parse_u64("MOVE_TIMEOUT_MS", DEFAULT_MOVE_TIMEOUT_MS)?,
        })
    }

    /// A configuration suitable for tests: no chain, no redis, in-memory
    /// database.
    pub fn for_tests() -> Self {
        Self {
            database_url: ":memory:".to_owned(),
            redis_url: None,
            rpc_url: None,
            ens_rpc_url: None,
            server_private_key: None,
            escrow_address: None,
            settlement_address: None,
            settlement_enabled: true,
            admin_secret: Some("test-admin-secret".to_owned()),
            port: 0,
            stale_match_timeout_ms: DEFAULT_STALE_MATCH_TIMEOUT_MS,
            deposit_timeout_ms: DEFAULT_DEPOSIT_TIMEOUT_MS,
            default_move_timeout_ms: DEFAULT_MOVE_TIMEOUT_MS,
        }
    }
}
