// ABOUTME: Principal serialization used inside protected tokens
// ABOUTME: Versioned JSON payload; unknown versions and invalid payloads read as no principal

use std::collections::BTreeMap;

use oidc_forge_core::errors::{ForgeError, ForgeResult};
use serde_json::Value;

use crate::principal::Principal;

/// Current payload version
pub const FORMAT_VERSION: u8 = 1;

/// Converts principals to bytes and back
pub trait TokenFormatter: Send + Sync {
    /// Serialize a principal
    ///
    /// # Errors
    ///
    /// Returns a serialization error when a claim cannot be encoded
    fn write_token(&self, principal: &Principal) -> ForgeResult<Vec<u8>>;

    /// Deserialize a principal, `None` when the payload is not recognized
    fn read_token(&self, payload: &[u8]) -> Option<Principal>;
}

/// JSON formatter prefixed with a version byte
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTokenFormatter;

impl TokenFormatter for JsonTokenFormatter {
    fn write_token(&self, principal: &Principal) -> ForgeResult<Vec<u8>> {
        let mut payload = vec![FORMAT_VERSION];
        serde_json::to_writer(&mut payload, principal).map_err(|source| {
            ForgeError::Serialization {
                context: "token principal",
                source,
            }
        })?;
        Ok(payload)
    }

    fn read_token(&self, payload: &[u8]) -> Option<Principal> {
        let (&version, body) = payload.split_first()?;
        if version != FORMAT_VERSION {
            return None;
        }
        serde_json::from_slice::<BTreeMap<String, Value>>(body)
            .ok()
            .map(Principal::from_claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidc_forge_core::models::TokenType;

    #[test]
    fn test_payload_keeps_private_claims() {
        let mut principal = Principal::for_subject("alice");
        principal
            .set_token_type(TokenType::AuthorizationCode)
            .set_claim("fg_reduri", "https://client.example/cb");

        let formatter = JsonTokenFormatter;
        let payload = formatter.write_token(&principal).unwrap();
        assert_eq!(payload[0], FORMAT_VERSION);
        assert_eq!(formatter.read_token(&payload), Some(principal));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let formatter = JsonTokenFormatter;
        assert_eq!(formatter.read_token(b"\x09{}"), None);
        assert_eq!(formatter.read_token(b""), None);
        assert_eq!(formatter.read_token(b"\x01not json"), None);
    }
}
