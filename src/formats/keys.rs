// ABOUTME: Key material providers backing the token formats
// ABOUTME: Derives one 256-bit key per purpose from a zeroized master key

use std::fmt::{self, Debug, Formatter};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use oidc_forge_core::errors::{ForgeError, ForgeResult};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Minimum master key length in bytes
pub const MIN_KEY_LENGTH: usize = 32;

/// Source of the master key used by the token formats
///
/// Implementations may fetch the key from a vault or rotate it; failures are
/// reported as [`ForgeError::TokenBackendUnavailable`] and abort the request.
pub trait KeyProvider: Send + Sync {
    /// Current master key
    ///
    /// # Errors
    ///
    /// Returns an error when the key cannot be loaded
    fn master_key(&self) -> ForgeResult<Zeroizing<Vec<u8>>>;
}

/// Derive a purpose-bound 256-bit key: `SHA-256(master || purpose)`
#[must_use]
pub fn derive_key(master: &[u8], purpose: &str) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(master);
    hasher.update(purpose.as_bytes());
    Zeroizing::new(hasher.finalize().into())
}

/// Key provider holding a fixed in-memory master key
pub struct StaticKeyProvider {
    key: Zeroizing<Vec<u8>>,
}

impl StaticKeyProvider {
    /// Wrap existing key bytes
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the key is shorter than 32 bytes
    pub fn new(key: Vec<u8>) -> ForgeResult<Self> {
        let key = Zeroizing::new(key);
        if key.len() < MIN_KEY_LENGTH {
            return Err(ForgeError::configuration(format!(
                "signing key must be at least {MIN_KEY_LENGTH} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self { key })
    }

    /// Decode a base64 (standard alphabet) key
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the value is not valid base64 or too short
    pub fn from_base64(encoded: &str) -> ForgeResult<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ForgeError::configuration(format!("signing key is not valid base64: {e}")))?;
        Self::new(key)
    }

    /// Generate a random ephemeral key
    ///
    /// # Errors
    ///
    /// Returns an error if the system random generator fails
    pub fn generate() -> ForgeResult<Self> {
        let mut key = vec![0_u8; MIN_KEY_LENGTH];
        SystemRandom::new().fill(&mut key).map_err(|_| {
            ForgeError::backend_unavailable("system-random", "failed to generate key material")
        })?;
        Self::new(key)
    }
}

impl Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyProvider")
            .field("key", &"<redacted>")
            .field("length", &self.key.len())
            .finish()
    }
}

impl KeyProvider for StaticKeyProvider {
    fn master_key(&self) -> ForgeResult<Zeroizing<Vec<u8>>> {
        Ok(self.key.clone())
    }
}
