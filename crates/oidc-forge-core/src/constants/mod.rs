// ABOUTME: Protocol constants organized by domain
// ABOUTME: Parameter names, grant and response types, claims, permissions and statuses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

//! Constants module
//!
//! Constants are grouped into domain modules rather than one flat list.

/// Claim names, including the private claims used to carry token metadata
pub mod claims;

/// Request and response parameter names
pub mod parameters;

/// Application permissions and their prefixes
pub mod permissions;

/// Grant types accepted by the token endpoint
pub mod grant_types {
    /// Authorization code grant (RFC 6749 section 4.1)
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// Client credentials grant (RFC 6749 section 4.4)
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    /// Refresh token grant (RFC 6749 section 6)
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Device authorization grant (RFC 8628)
    pub const DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
}

/// Response types accepted by the authorization endpoint
pub mod response_types {
    /// Authorization code response type
    pub const CODE: &str = "code";
}

/// PKCE code challenge methods
pub mod code_challenge_methods {
    /// SHA-256 transformation (RFC 7636 required method)
    pub const S256: &str = "S256";
    /// Plain transformation, rejected by the server
    pub const PLAIN: &str = "plain";
}

/// Token type hints accepted by introspection and revocation
pub mod token_type_hints {
    /// Access token hint
    pub const ACCESS_TOKEN: &str = "access_token";
    /// Refresh token hint
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

/// Well-known scope values
pub mod scopes {
    /// OpenID Connect scope
    pub const OPENID: &str = "openid";
    /// Scope requesting a refresh token
    pub const OFFLINE_ACCESS: &str = "offline_access";
    /// Profile claims scope
    pub const PROFILE: &str = "profile";
    /// Email claims scope
    pub const EMAIL: &str = "email";
}

/// Transaction property keys shared between handlers
pub mod properties {
    /// Application entity resolved from `client_id`
    pub const APPLICATION: &str = ".application";
    /// Token entity backing the authenticated token
    pub const TOKEN_ENTRY: &str = ".token_entry";
    /// Validated redirect URI
    pub const REDIRECT_URI: &str = ".redirect_uri";
    /// Validated post-logout redirect URI, promoted to the redirect target on sign-out
    pub const POST_LOGOUT_REDIRECT_URI: &str = ".post_logout_redirect_uri";
}

/// Lifetimes applied when the options don't override them (seconds)
pub mod lifetimes {
    /// Access token lifetime
    pub const ACCESS_TOKEN: i64 = 3600;
    /// Authorization code lifetime
    pub const AUTHORIZATION_CODE: i64 = 300;
    /// Refresh token lifetime
    pub const REFRESH_TOKEN: i64 = 14 * 24 * 3600;
    /// Device code lifetime
    pub const DEVICE_CODE: i64 = 600;
    /// User code lifetime
    pub const USER_CODE: i64 = 600;
}
