// ABOUTME: Sealed token format using AES-256-GCM with per-usage derived keys
// ABOUTME: Wire form is base64url(nonce || ciphertext); tokens of another usage fail authentication
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::sync::Arc;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use oidc_forge_core::errors::{ForgeError, ForgeResult};
use oidc_forge_core::models::TokenType;
use rand::RngCore;
use tracing::trace;

use super::formatter::{JsonTokenFormatter, TokenFormatter};
use super::keys::{derive_key, KeyProvider};
use super::{TokenDecode, TokenFormat};
use crate::principal::Principal;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const BACKEND: &str = "sealed";

/// Authenticated-encryption token format
///
/// Each token usage is encrypted under its own key, so an access token can
/// never be read back as a refresh token: decryption with the wrong purpose
/// key fails authentication and the token is reported as not applicable.
pub struct SealedTokenFormat {
    keys: Arc<dyn KeyProvider>,
    formatter: Arc<dyn TokenFormatter>,
}

impl SealedTokenFormat {
    /// Create a sealed format with the JSON formatter
    #[must_use]
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self::with_formatter(keys, Arc::new(JsonTokenFormatter))
    }

    /// Create a sealed format with a custom principal formatter
    #[must_use]
    pub fn with_formatter(keys: Arc<dyn KeyProvider>, formatter: Arc<dyn TokenFormatter>) -> Self {
        Self { keys, formatter }
    }

    /// Key derivation purpose for a token usage
    #[must_use]
    pub fn purpose(token_type: TokenType) -> String {
        format!("oidc-forge.server.{token_type}.v1")
    }

    fn cipher(&self, token_type: TokenType) -> ForgeResult<Aes256Gcm> {
        let master = self
            .keys
            .master_key()
            .map_err(|e| ForgeError::backend_unavailable(BACKEND, e.to_string()))?;
        let key = derive_key(&master, &Self::purpose(token_type));
        Ok(Aes256Gcm::new(GenericArray::from_slice(&key[..])))
    }
}

impl TokenFormat for SealedTokenFormat {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn write_token(&self, principal: &Principal, token_type: TokenType) -> ForgeResult<String> {
        let mut principal = principal.clone();
        principal.set_token_type(token_type);
        let payload = self.formatter.write_token(&principal)?;

        let cipher = self.cipher(token_type)?;
        let mut nonce_bytes = [0_u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, payload.as_slice())
            .map_err(|e| ForgeError::TokenGeneration {
                backend: BACKEND,
                reason: format!("encryption failed: {e}"),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn read_token(&self, token: &str, token_type: TokenType) -> ForgeResult<TokenDecode> {
        let Ok(sealed) = URL_SAFE_NO_PAD.decode(token.trim()) else {
            trace!(candidate = %token_type, "sealed token is not valid base64url");
            return Ok(TokenDecode::NotApplicable);
        };
        if sealed.len() < NONCE_LENGTH + TAG_LENGTH {
            trace!(candidate = %token_type, "sealed token is too short");
            return Ok(TokenDecode::NotApplicable);
        }

        let cipher = self.cipher(token_type)?;
        let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
        let Ok(payload) = cipher.decrypt(GenericArray::from_slice(nonce), ciphertext) else {
            trace!(candidate = %token_type, "sealed token failed authentication");
            return Ok(TokenDecode::NotApplicable);
        };

        let Some(principal) = self.formatter.read_token(&payload) else {
            trace!(candidate = %token_type, "sealed token payload is not a principal");
            return Ok(TokenDecode::NotApplicable);
        };
        if principal.token_type() != Some(token_type) {
            trace!(candidate = %token_type, "sealed token usage mismatch");
            return Ok(TokenDecode::NotApplicable);
        }
        Ok(TokenDecode::Decoded(principal))
    }
}
