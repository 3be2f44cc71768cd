// ABOUTME: OAuth2 / OpenID Connect protocol error codes and the error response payload
// ABOUTME: Maps each code to its wire name, HTTP status and RFC reference
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Standard OAuth2 and OpenID Connect error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorCode {
    /// Malformed or incomplete request
    InvalidRequest,
    /// Client authentication failed
    InvalidClient,
    /// Grant (code, refresh token, device code) is invalid or expired
    InvalidGrant,
    /// Client is not allowed to use this grant or response type
    UnauthorizedClient,
    /// Grant type not supported by the server
    UnsupportedGrantType,
    /// Response type not supported by the server
    UnsupportedResponseType,
    /// Token type not supported by the revocation endpoint
    UnsupportedTokenType,
    /// Requested scope is unknown or not allowed
    InvalidScope,
    /// Bearer token is invalid
    InvalidToken,
    /// Bearer token lacks a required scope
    InsufficientScope,
    /// Resource owner or server denied the request
    AccessDenied,
    /// Unexpected server condition
    ServerError,
    /// Server temporarily unable to handle the request
    TemporarilyUnavailable,
    /// Device authorization still pending
    AuthorizationPending,
    /// Device polling too fast
    SlowDown,
    /// Device code expired
    ExpiredToken,
}

impl ProtocolErrorCode {
    /// Wire representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedTokenType => "unsupported_token_type",
            Self::InvalidScope => "invalid_scope",
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
            Self::AccessDenied => "access_denied",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
        }
    }

    /// HTTP status code the host should use for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            // 401 Unauthorized
            Self::InvalidClient | Self::InvalidToken => 401,

            // 403 Forbidden
            Self::InsufficientScope | Self::AccessDenied => 403,

            // 500 Internal Server Error
            Self::ServerError => 500,

            // 503 Service Unavailable
            Self::TemporarilyUnavailable => 503,

            // 400 Bad Request
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::UnsupportedResponseType
            | Self::UnsupportedTokenType
            | Self::InvalidScope
            | Self::AuthorizationPending
            | Self::SlowDown
            | Self::ExpiredToken => 400,
        }
    }

    /// Default human readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "The request is missing a required parameter or is malformed",
            Self::InvalidClient => "Client authentication failed",
            Self::InvalidGrant => "The specified grant is invalid, expired or revoked",
            Self::UnauthorizedClient => "The client is not allowed to use this flow",
            Self::UnsupportedGrantType => "The specified grant type is not supported",
            Self::UnsupportedResponseType => "The specified response type is not supported",
            Self::UnsupportedTokenType => "The specified token type cannot be revoked",
            Self::InvalidScope => "The requested scope is invalid or unknown",
            Self::InvalidToken => "The specified token is invalid",
            Self::InsufficientScope => "The token does not carry the required scope",
            Self::AccessDenied => "The authorization was denied",
            Self::ServerError => "An internal server error occurred",
            Self::TemporarilyUnavailable => "The server is temporarily unavailable",
            Self::AuthorizationPending => "The authorization request is still pending",
            Self::SlowDown => "Polling too frequently",
            Self::ExpiredToken => "The device code has expired",
        }
    }

    /// Reference describing the error in the relevant RFC
    #[must_use]
    pub const fn error_uri(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::UnauthorizedClient
            | Self::UnsupportedResponseType
            | Self::InvalidScope
            | Self::AccessDenied
            | Self::ServerError
            | Self::TemporarilyUnavailable => {
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1"
            }
            Self::InvalidClient | Self::InvalidGrant | Self::UnsupportedGrantType => {
                "https://datatracker.ietf.org/doc/html/rfc6749#section-5.2"
            }
            Self::UnsupportedTokenType => "https://datatracker.ietf.org/doc/html/rfc7009#section-2.2.1",
            Self::InvalidToken | Self::InsufficientScope => {
                "https://datatracker.ietf.org/doc/html/rfc6750#section-3.1"
            }
            Self::AuthorizationPending | Self::SlowDown | Self::ExpiredToken => {
                "https://datatracker.ietf.org/doc/html/rfc8628#section-3.5"
            }
        }
    }
}

impl Display for ProtocolErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth2 error response payload attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthError {
    /// Error code
    pub error: ProtocolErrorCode,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuthError {
    /// Create an error with an explicit description
    #[must_use]
    pub fn new(error: ProtocolErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            error_uri: Some(error.error_uri().to_owned()),
        }
    }

    /// Create an error using the code's default description
    #[must_use]
    pub fn from_code(error: ProtocolErrorCode) -> Self {
        Self::new(error, error.description())
    }

    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::new(ProtocolErrorCode::InvalidRequest, description)
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client(description: &str) -> Self {
        Self::new(ProtocolErrorCode::InvalidClient, description)
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::new(ProtocolErrorCode::InvalidGrant, description)
    }

    /// Create an `invalid_token` error
    #[must_use]
    pub fn invalid_token(description: &str) -> Self {
        Self::new(ProtocolErrorCode::InvalidToken, description)
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self::new(ProtocolErrorCode::InvalidScope, description)
    }

    /// Create an `unauthorized_client` error
    /// Used when a client attempts a flow it was not registered for
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self::new(ProtocolErrorCode::UnauthorizedClient, description)
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::from_code(ProtocolErrorCode::UnsupportedGrantType)
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self::from_code(ProtocolErrorCode::UnsupportedResponseType)
    }

    /// HTTP status code the host should use
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.error.http_status()
    }
}

impl Display for OAuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}
