// ABOUTME: JWT token format signing principals with HS256
// ABOUTME: Lifetime and audience checks are left to the validation handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use oidc_forge_core::constants::claims;
use oidc_forge_core::errors::{ForgeError, ForgeResult};
use oidc_forge_core::models::TokenType;
use serde_json::Value;
use tracing::trace;

use super::keys::{derive_key, KeyProvider};
use super::{TokenDecode, TokenFormat};
use crate::principal::Principal;

const BACKEND: &str = "jwt";
const KEY_PURPOSE: &str = "oidc-forge.jwt.hs256.v1";

/// Signed JWT token format
pub struct JwtTokenFormat {
    keys: Arc<dyn KeyProvider>,
    issuer: Option<String>,
}

impl JwtTokenFormat {
    /// Create a JWT format; `issuer` is stamped on tokens that carry none
    #[must_use]
    pub fn new(keys: Arc<dyn KeyProvider>, issuer: Option<String>) -> Self {
        Self { keys, issuer }
    }

    fn secret(&self) -> ForgeResult<zeroize::Zeroizing<[u8; 32]>> {
        let master = self
            .keys
            .master_key()
            .map_err(|e| ForgeError::backend_unavailable(BACKEND, e.to_string()))?;
        Ok(derive_key(&master, KEY_PURPOSE))
    }

    const fn media_type(token_type: TokenType) -> &'static str {
        match token_type {
            TokenType::AccessToken => "at+jwt",
            _ => "JWT",
        }
    }
}

impl TokenFormat for JwtTokenFormat {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn write_token(&self, principal: &Principal, token_type: TokenType) -> ForgeResult<String> {
        let mut principal = principal.clone();
        principal.set_token_type(token_type);
        if let Some(issuer) = &self.issuer {
            if !principal.has_claim(claims::ISSUER) {
                principal.set_claim(claims::ISSUER, issuer.as_str());
            }
        }

        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some(Self::media_type(token_type).to_owned());

        let secret = self.secret()?;
        encode(&header, &principal.into_claims(), &EncodingKey::from_secret(&secret[..])).map_err(
            |e| ForgeError::TokenGeneration {
                backend: BACKEND,
                reason: e.to_string(),
            },
        )
    }

    fn read_token(&self, token: &str, token_type: TokenType) -> ForgeResult<TokenDecode> {
        let secret = self.secret()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = match decode::<BTreeMap<String, Value>>(
            token.trim(),
            &DecodingKey::from_secret(&secret[..]),
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::InvalidSignature => "signature verification failed",
                    ErrorKind::InvalidAlgorithm => "unexpected signing algorithm",
                    ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                        "malformed token segments"
                    }
                    _ => "token rejected",
                };
                trace!(candidate = %token_type, error = %e, reason, "jwt token not applicable");
                return Ok(TokenDecode::NotApplicable);
            }
        };

        let principal = Principal::from_claims(claims);
        if principal.token_type() != Some(token_type) {
            trace!(candidate = %token_type, "jwt token usage mismatch");
            return Ok(TokenDecode::NotApplicable);
        }
        Ok(TokenDecode::Decoded(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::keys::StaticKeyProvider;

    fn format(key: u8) -> JwtTokenFormat {
        JwtTokenFormat::new(
            Arc::new(StaticKeyProvider::new(vec![key; 32]).unwrap()),
            Some("https://id.example".to_owned()),
        )
    }

    #[test]
    fn test_round_trip_stamps_issuer_and_usage() {
        let format = format(1);
        let mut principal = Principal::for_subject("carol");
        principal.set_scopes(["openid"]);

        let token = format.write_token(&principal, TokenType::AccessToken).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = format
            .read_token(&token, TokenType::AccessToken)
            .unwrap()
            .into_principal()
            .unwrap();
        assert_eq!(decoded.claim_str(claims::ISSUER), Some("https://id.example"));
        assert_eq!(decoded.scopes(), vec!["openid".to_owned()]);
        assert_eq!(decoded.token_type(), Some(TokenType::AccessToken));
    }

    #[test]
    fn test_wrong_key_and_garbage_are_not_applicable() {
        let token = format(1)
            .write_token(&Principal::for_subject("carol"), TokenType::RefreshToken)
            .unwrap();

        assert_eq!(
            format(2).read_token(&token, TokenType::RefreshToken).unwrap(),
            TokenDecode::NotApplicable
        );
        assert_eq!(
            format(1).read_token("garbage", TokenType::RefreshToken).unwrap(),
            TokenDecode::NotApplicable
        );
        assert_eq!(
            format(1).read_token(&token, TokenType::AccessToken).unwrap(),
            TokenDecode::NotApplicable
        );
    }
}
