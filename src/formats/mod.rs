// ABOUTME: Token formats turning principals into wire tokens and back
// ABOUTME: Sealed (AES-256-GCM) and JWT (HS256) backends plus the multi-candidate read loop
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

//! # Token formats
//!
//! A [`TokenFormat`] writes a [`Principal`] for a given [`TokenType`] and reads
//! it back. Reading never fails on malformed input: a token that does not
//! belong to the requested type yields [`TokenDecode::NotApplicable`] so the
//! caller can try the next candidate type. Failures of the decoding
//! infrastructure itself (for example key material that cannot be loaded)
//! are returned as errors and abort the transaction.

/// Principal serialization contract
pub mod formatter;
/// JWT backend
pub mod jwt;
/// Key material providers
pub mod keys;
/// Authenticated-encryption backend
pub mod sealed;

pub use formatter::{JsonTokenFormatter, TokenFormatter};
pub use jwt::JwtTokenFormat;
pub use keys::{KeyProvider, StaticKeyProvider};
pub use sealed::SealedTokenFormat;

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use oidc_forge_core::errors::ForgeResult;
use oidc_forge_core::models::TokenType;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::principal::Principal;

/// Result of reading a token for one candidate type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDecode {
    /// The token was produced for the requested type
    Decoded(Principal),
    /// The token is malformed or belongs to another type
    NotApplicable,
}

impl TokenDecode {
    /// Principal, when decoded
    #[must_use]
    pub fn into_principal(self) -> Option<Principal> {
        match self {
            Self::Decoded(principal) => Some(principal),
            Self::NotApplicable => None,
        }
    }
}

/// Backend producing and reading wire tokens
pub trait TokenFormat: Send + Sync {
    /// Backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Serialize and protect a principal for the given token type
    ///
    /// # Errors
    ///
    /// Returns an error when key material is unavailable or protection fails
    fn write_token(&self, principal: &Principal, token_type: TokenType) -> ForgeResult<String>;

    /// Read a token expected to be of the given type
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot operate; malformed or
    /// foreign tokens produce [`TokenDecode::NotApplicable`]
    fn read_token(&self, token: &str, token_type: TokenType) -> ForgeResult<TokenDecode>;
}

/// Try each candidate type in order and stop at the first successful decode
///
/// # Errors
///
/// Propagates backend failures from [`TokenFormat::read_token`]
pub fn read_token_with_candidates(
    format: &dyn TokenFormat,
    token: &str,
    candidates: &[TokenType],
) -> ForgeResult<Option<(TokenType, Principal)>> {
    for &candidate in candidates {
        match format.read_token(token, candidate)? {
            TokenDecode::Decoded(principal) => return Ok(Some((candidate, principal))),
            TokenDecode::NotApplicable => {
                trace!(format = format.name(), candidate = %candidate, "token candidate not applicable");
            }
        }
    }
    Ok(None)
}

/// Token format selected for newly issued tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFormatKind {
    /// Authenticated encryption, opaque to clients
    #[default]
    Sealed,
    /// Signed JWT
    Jwt,
}

impl TokenFormatKind {
    /// Lower-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sealed => "sealed",
            Self::Jwt => "jwt",
        }
    }

    /// Parse the lower-case name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sealed" => Some(Self::Sealed),
            "jwt" => Some(Self::Jwt),
            _ => None,
        }
    }
}

impl Display for TokenFormatKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Both token backends, registered as a service for the handlers
pub struct TokenFormats {
    sealed: Arc<dyn TokenFormat>,
    jwt: Arc<dyn TokenFormat>,
}

impl TokenFormats {
    /// Build the default backends over one key provider
    #[must_use]
    pub fn new(keys: Arc<dyn KeyProvider>, issuer: Option<String>) -> Self {
        Self {
            sealed: Arc::new(SealedTokenFormat::new(Arc::clone(&keys))),
            jwt: Arc::new(JwtTokenFormat::new(keys, issuer)),
        }
    }

    /// Use custom backends
    #[must_use]
    pub fn from_formats(sealed: Arc<dyn TokenFormat>, jwt: Arc<dyn TokenFormat>) -> Self {
        Self { sealed, jwt }
    }

    /// Backend for a format kind
    #[must_use]
    pub fn get(&self, kind: TokenFormatKind) -> &dyn TokenFormat {
        match kind {
            TokenFormatKind::Sealed => self.sealed.as_ref(),
            TokenFormatKind::Jwt => self.jwt.as_ref(),
        }
    }
}
