//! Request authentication for the edge API.

use axum::http::HeaderMap;
use serde_json::Value;

use dork_core::credentials::verify_player_auth;
use dork_core::error::{Error, Result};
use dork_core::types::current_timestamp;

use dork_env::Config;

/// Verify the `{playerId, signature, timestamp}` envelope of an
/// authenticated request body.  Returns the canonical player address.
pub fn player_auth(body: &Value) -> Result<String> {
    let player_id = body
        .get("playerId")
        .and_then(Value::as_str)
        .ok_or(Error::AuthMissingSignature)?;
    let signature = body
        .get("signature")
        .and_then(Value::as_str)
        .ok_or(Error::AuthMissingSignature)?;
    let timestamp = body
        .get("timestamp")
        .and_then(Value::as_u64)
        .ok_or(Error::AuthMissingSignature)?;
    verify_player_auth(player_id, signature, timestamp, current_timestamp())
}

/// Admin endpoints require a bearer token equal to the configured
/// secret.  An unset secret rejects everything.
pub fn admin_auth(config: &Config, headers: &HeaderMap) -> Result<()> {
    let Some(secret) = config.admin_secret.as_deref() else {
        return Err(Error::AuthInvalidSignature);
    };
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::AuthMissingSignature)?;
    if presented != secret {
        return Err(Error::AuthInvalidSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn test_admin_auth() {
        let config = Config::for_tests();
        let mut headers = HeaderMap::new();
        assert!(admin_auth(&config, &headers).is_err());

        headers.insert(AUTHORIZATION, "Bearer test-admin-secret".parse().unwrap());
        assert!(admin_auth(&config, &headers).is_ok());

        headers.insert(AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(admin_auth(&config, &headers).is_err());
    }

    #[test]
    fn test_player_auth_requires_all_fields() {
        let err = player_auth(&serde_json::json!({"playerId": "0xaa"})).unwrap_err();
        assert_eq!(err, Error::AuthMissingSignature);
    }
}
