// ABOUTME: Authorization server options: endpoints, passthrough, token storage, formats and lifetimes
// ABOUTME: Loaded from OIDC_FORGE_* environment variables or built in code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};

use chrono::{Duration, Utc};
use oidc_forge_core::constants::{lifetimes, scopes};
use oidc_forge_core::models::TokenType;
use zeroize::Zeroizing;

use super::{env_bool, env_list, env_parse, env_string};
use crate::formats::TokenFormatKind;
use crate::protocol::EndpointKind;

/// Prefix of every server environment variable
pub const ENV_PREFIX: &str = "OIDC_FORGE_";

/// Options snapshot shared by every server transaction
#[derive(Clone)]
pub struct ServerOptions {
    /// Issuer identifier stamped on tokens
    pub issuer: Option<String>,
    /// Endpoints answering requests; disabled endpoints reject everything
    pub enabled_endpoints: BTreeSet<EndpointKind>,
    /// Endpoints whose handle stage is delegated to the host application
    pub passthrough_endpoints: BTreeSet<EndpointKind>,
    /// Do not persist token entries (no revocation, no reference tokens)
    pub disable_token_storage: bool,
    /// Issue access tokens as opaque reference identifiers
    pub use_reference_access_tokens: bool,
    /// Issue refresh tokens as opaque reference identifiers
    pub use_reference_refresh_tokens: bool,
    /// Format used for newly issued tokens
    pub preferred_format: TokenFormatKind,
    /// Trust client parameters without consulting the application store
    pub degraded_mode: bool,
    /// Skip `ept:`/`gt:`/`scp:` permission checks
    pub ignore_permissions: bool,
    /// Require PKCE for every authorization code request
    pub require_pkce: bool,
    /// Access token lifetime
    pub access_token_lifetime: Duration,
    /// Authorization code lifetime
    pub authorization_code_lifetime: Duration,
    /// Refresh token lifetime
    pub refresh_token_lifetime: Duration,
    /// Device code lifetime
    pub device_code_lifetime: Duration,
    /// User code lifetime
    pub user_code_lifetime: Duration,
    /// Verification page shown to users of the device flow
    pub verification_uri: Option<String>,
    /// Scopes the server recognizes in addition to the scope store
    pub registered_scopes: BTreeSet<String>,
    /// Base64 master key for the token formats; generated when absent
    pub signing_key: Option<Zeroizing<String>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            issuer: None,
            enabled_endpoints: EndpointKind::ALL.into_iter().collect(),
            passthrough_endpoints: BTreeSet::new(),
            disable_token_storage: false,
            use_reference_access_tokens: false,
            use_reference_refresh_tokens: false,
            preferred_format: TokenFormatKind::Sealed,
            degraded_mode: false,
            ignore_permissions: false,
            require_pkce: false,
            access_token_lifetime: Duration::seconds(lifetimes::ACCESS_TOKEN),
            authorization_code_lifetime: Duration::seconds(lifetimes::AUTHORIZATION_CODE),
            refresh_token_lifetime: Duration::seconds(lifetimes::REFRESH_TOKEN),
            device_code_lifetime: Duration::seconds(lifetimes::DEVICE_CODE),
            user_code_lifetime: Duration::seconds(lifetimes::USER_CODE),
            verification_uri: None,
            registered_scopes: [scopes::OPENID, scopes::OFFLINE_ACCESS, scopes::PROFILE, scopes::EMAIL]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            signing_key: None,
        }
    }
}

impl ServerOptions {
    /// Load options from `OIDC_FORGE_*` environment variables
    ///
    /// Invalid values are logged and replaced by their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let key = |name: &str| format!("{ENV_PREFIX}{name}");
        let seconds = |name: &str, default: Duration| env_lifetime(&key(name), default);

        Self {
            issuer: env_string(&key("ISSUER")),
            enabled_endpoints: env_list(&key("ENABLED_ENDPOINTS"))
                .map_or(defaults.enabled_endpoints, |names| parse_endpoints(&names)),
            passthrough_endpoints: env_list(&key("PASSTHROUGH_ENDPOINTS"))
                .map_or(defaults.passthrough_endpoints, |names| parse_endpoints(&names)),
            disable_token_storage: env_bool(&key("DISABLE_TOKEN_STORAGE"), false),
            use_reference_access_tokens: env_bool(&key("USE_REFERENCE_ACCESS_TOKENS"), false),
            use_reference_refresh_tokens: env_bool(&key("USE_REFERENCE_REFRESH_TOKENS"), false),
            preferred_format: env_string(&key("TOKEN_FORMAT"))
                .and_then(|raw| TokenFormatKind::parse(&raw))
                .unwrap_or(defaults.preferred_format),
            degraded_mode: env_bool(&key("DEGRADED_MODE"), false),
            ignore_permissions: env_bool(&key("IGNORE_PERMISSIONS"), false),
            require_pkce: env_bool(&key("REQUIRE_PKCE"), false),
            access_token_lifetime: seconds("ACCESS_TOKEN_LIFETIME", defaults.access_token_lifetime),
            authorization_code_lifetime: seconds(
                "AUTHORIZATION_CODE_LIFETIME",
                defaults.authorization_code_lifetime,
            ),
            refresh_token_lifetime: seconds("REFRESH_TOKEN_LIFETIME", defaults.refresh_token_lifetime),
            device_code_lifetime: seconds("DEVICE_CODE_LIFETIME", defaults.device_code_lifetime),
            user_code_lifetime: seconds("USER_CODE_LIFETIME", defaults.user_code_lifetime),
            verification_uri: env_string(&key("VERIFICATION_URI")),
            registered_scopes: env_list(&key("SCOPES"))
                .map_or(defaults.registered_scopes, |list| list.into_iter().collect()),
            signing_key: env_string(&key("SIGNING_KEY")).map(Zeroizing::new),
        }
    }

    /// Set the issuer
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Disable an endpoint
    #[must_use]
    pub fn without_endpoint(mut self, endpoint: EndpointKind) -> Self {
        self.enabled_endpoints.remove(&endpoint);
        self
    }

    /// Delegate the handle stage of an endpoint to the host application
    #[must_use]
    pub fn with_passthrough(mut self, endpoint: EndpointKind) -> Self {
        self.passthrough_endpoints.insert(endpoint);
        self
    }

    /// Disable token storage
    #[must_use]
    pub const fn with_token_storage_disabled(mut self) -> Self {
        self.disable_token_storage = true;
        self
    }

    /// Issue reference access tokens
    #[must_use]
    pub const fn with_reference_access_tokens(mut self) -> Self {
        self.use_reference_access_tokens = true;
        self
    }

    /// Select the token format
    #[must_use]
    pub const fn with_format(mut self, format: TokenFormatKind) -> Self {
        self.preferred_format = format;
        self
    }

    /// Enable degraded mode
    #[must_use]
    pub const fn with_degraded_mode(mut self) -> Self {
        self.degraded_mode = true;
        self
    }

    /// Skip permission checks
    #[must_use]
    pub const fn with_permissions_ignored(mut self) -> Self {
        self.ignore_permissions = true;
        self
    }

    /// Require PKCE
    #[must_use]
    pub const fn with_pkce_required(mut self) -> Self {
        self.require_pkce = true;
        self
    }

    /// Register an additional scope
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.registered_scopes.insert(scope.into());
        self
    }

    /// Set the device verification page
    #[must_use]
    pub fn with_verification_uri(mut self, uri: impl Into<String>) -> Self {
        self.verification_uri = Some(uri.into());
        self
    }

    /// Set the base64 master key
    #[must_use]
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = Some(Zeroizing::new(key.into()));
        self
    }

    /// Whether the endpoint answers requests
    #[must_use]
    pub fn is_endpoint_enabled(&self, endpoint: EndpointKind) -> bool {
        self.enabled_endpoints.contains(&endpoint)
    }

    /// Whether the endpoint's handle stage is delegated to the host
    #[must_use]
    pub fn is_passthrough_enabled(&self, endpoint: EndpointKind) -> bool {
        self.passthrough_endpoints.contains(&endpoint)
    }

    /// Lifetime applied to a token type
    #[must_use]
    pub const fn lifetime(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::AccessToken => self.access_token_lifetime,
            TokenType::RefreshToken => self.refresh_token_lifetime,
            TokenType::AuthorizationCode => self.authorization_code_lifetime,
            TokenType::DeviceCode => self.device_code_lifetime,
            TokenType::UserCode => self.user_code_lifetime,
        }
    }

    /// Whether tokens of this type are issued as reference identifiers
    ///
    /// User codes are always short reference identifiers when token storage
    /// is enabled, so users can type them.
    #[must_use]
    pub const fn uses_reference_identifier(&self, token_type: TokenType) -> bool {
        if self.disable_token_storage {
            return false;
        }
        match token_type {
            TokenType::AccessToken => self.use_reference_access_tokens,
            TokenType::RefreshToken => self.use_reference_refresh_tokens,
            TokenType::UserCode => true,
            TokenType::AuthorizationCode | TokenType::DeviceCode => false,
        }
    }
}

impl Debug for ServerOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("issuer", &self.issuer)
            .field("enabled_endpoints", &self.enabled_endpoints)
            .field("passthrough_endpoints", &self.passthrough_endpoints)
            .field("disable_token_storage", &self.disable_token_storage)
            .field("use_reference_access_tokens", &self.use_reference_access_tokens)
            .field("use_reference_refresh_tokens", &self.use_reference_refresh_tokens)
            .field("preferred_format", &self.preferred_format)
            .field("degraded_mode", &self.degraded_mode)
            .field("ignore_permissions", &self.ignore_permissions)
            .field("require_pkce", &self.require_pkce)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("verification_uri", &self.verification_uri)
            .field("registered_scopes", &self.registered_scopes)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

// Positive number of seconds that still yields a representable expiration date.
fn env_lifetime(key: &str, default: Duration) -> Duration {
    let seconds = env_parse(key, default.num_seconds());
    match Duration::try_seconds(seconds) {
        Some(lifetime)
            if seconds > 0 && Utc::now().checked_add_signed(lifetime).is_some() =>
        {
            lifetime
        }
        _ => {
            tracing::warn!(key, seconds, "ignoring out-of-range token lifetime");
            default
        }
    }
}

fn parse_endpoints(names: &[String]) -> BTreeSet<EndpointKind> {
    names
        .iter()
        .filter_map(|name| {
            let parsed = EndpointKind::parse(name);
            if parsed.is_none() {
                tracing::warn!(endpoint = %name, "ignoring unknown endpoint name");
            }
            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_every_endpoint() {
        let options = ServerOptions::default();
        assert!(EndpointKind::ALL
            .iter()
            .all(|endpoint| options.is_endpoint_enabled(*endpoint)));
        assert!(!options.is_passthrough_enabled(EndpointKind::Userinfo));
        assert_eq!(options.lifetime(TokenType::AccessToken), Duration::hours(1));
    }

    #[test]
    fn test_reference_identifiers_require_token_storage() {
        let options = ServerOptions::default().with_reference_access_tokens();
        assert!(options.uses_reference_identifier(TokenType::AccessToken));
        assert!(!options
            .with_token_storage_disabled()
            .uses_reference_identifier(TokenType::AccessToken));
    }

    #[test]
    fn test_out_of_range_lifetimes_keep_the_default() {
        let key = "OIDC_FORGE_TEST_ONLY_LIFETIME";
        let default = Duration::hours(1);

        for raw in ["9223372036854775807", "10000000000000", "0", "-30"] {
            std::env::set_var(key, raw);
            assert_eq!(env_lifetime(key, default), default, "value {raw}");
        }
        std::env::set_var(key, "90");
        assert_eq!(env_lifetime(key, default), Duration::seconds(90));
        std::env::remove_var(key);
    }

    #[test]
    fn test_debug_redacts_signing_key() {
        let options = ServerOptions::default().with_signing_key("c2VjcmV0");
        let rendered = format!("{options:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("c2VjcmV0"));
    }
}
