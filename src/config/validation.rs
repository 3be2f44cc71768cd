// ABOUTME: Resource-server validation options: audiences, token entry checks, format and key
// ABOUTME: Loaded from OIDC_FORGE_VALIDATION_* environment variables or built in code

use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};

use zeroize::Zeroizing;

use super::{env_bool, env_list, env_string};
use crate::formats::TokenFormatKind;

/// Prefix of every validation environment variable
pub const ENV_PREFIX: &str = "OIDC_FORGE_VALIDATION_";

/// Options snapshot shared by every validation transaction
#[derive(Clone, Default)]
pub struct ValidationOptions {
    /// Accepted audiences; empty accepts any audience
    pub audiences: BTreeSet<String>,
    /// Check the token entry in the token store (required for reference tokens)
    pub validate_token_entries: bool,
    /// Expected access token format
    pub format: TokenFormatKind,
    /// Base64 master key shared with the server
    pub signing_key: Option<Zeroizing<String>>,
}

impl ValidationOptions {
    /// Load options from `OIDC_FORGE_VALIDATION_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let key = |name: &str| format!("{ENV_PREFIX}{name}");
        Self {
            audiences: env_list(&key("AUDIENCES"))
                .map(|list| list.into_iter().collect())
                .unwrap_or_default(),
            validate_token_entries: env_bool(&key("VALIDATE_TOKEN_ENTRIES"), false),
            format: env_string(&key("TOKEN_FORMAT"))
                .and_then(|raw| TokenFormatKind::parse(&raw))
                .unwrap_or_default(),
            signing_key: env_string(&key("SIGNING_KEY")).map(Zeroizing::new),
        }
    }

    /// Accept an audience
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.insert(audience.into());
        self
    }

    /// Check token entries against the token store
    #[must_use]
    pub const fn with_token_entry_validation(mut self) -> Self {
        self.validate_token_entries = true;
        self
    }

    /// Select the expected format
    #[must_use]
    pub const fn with_format(mut self, format: TokenFormatKind) -> Self {
        self.format = format;
        self
    }

    /// Set the base64 master key
    #[must_use]
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = Some(Zeroizing::new(key.into()));
        self
    }
}

impl Debug for ValidationOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("audiences", &self.audiences)
            .field("validate_token_entries", &self.validate_token_entries)
            .field("format", &self.format)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
