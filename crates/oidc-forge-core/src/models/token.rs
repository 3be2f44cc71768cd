// ABOUTME: Token entity persisted when token storage is enabled, and token usages
// ABOUTME: Entries track status (valid, redeemed, revoked) and reference identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use super::{new_concurrency_token, Entity, EntityKind};

/// Usage of a token issued by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Access token presented to resource servers
    AccessToken,
    /// Refresh token redeemed at the token endpoint
    RefreshToken,
    /// Authorization code redeemed at the token endpoint
    AuthorizationCode,
    /// Device code polled by the device
    DeviceCode,
    /// User code typed by the user on the verification page
    UserCode,
}

impl TokenType {
    /// Order in which token types are tried when the caller doesn't know the type
    pub const CANDIDATES: [Self; 5] = [
        Self::AccessToken,
        Self::RefreshToken,
        Self::AuthorizationCode,
        Self::DeviceCode,
        Self::UserCode,
    ];

    /// Wire / claim representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::AuthorizationCode => "authorization_code",
            Self::DeviceCode => "device_code",
            Self::UserCode => "user_code",
        }
    }

    /// Parse the wire representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::CANDIDATES.into_iter().find(|t| t.as_str() == value)
    }
}

impl Display for TokenType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a stored token entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Token can be used
    Valid,
    /// Single-use token (code) already redeemed
    Redeemed,
    /// Token was revoked
    Revoked,
    /// Token was never fully issued
    Inactive,
}

/// Stored token entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Unique identifier
    pub id: Option<String>,
    /// Identifier of the application the token was issued to
    pub application_id: Option<String>,
    /// Identifier of the authorization the token belongs to
    pub authorization_id: Option<String>,
    /// Subject
    pub subject: Option<String>,
    /// Token usage
    pub token_type: TokenType,
    /// Status
    pub status: TokenStatus,
    /// Opaque identifier handed out instead of the payload (reference tokens)
    pub reference_id: Option<String>,
    /// Serialized token when the wire form is a reference identifier
    pub payload: Option<String>,
    /// Creation date
    pub creation_date: DateTime<Utc>,
    /// Expiration date
    pub expiration_date: Option<DateTime<Utc>>,
    /// Redemption date
    pub redemption_date: Option<DateTime<Utc>>,
    /// Concurrency token
    pub concurrency_token: String,
}

impl Token {
    /// Create a valid token entry
    #[must_use]
    pub fn new(token_type: TokenType) -> Self {
        Self {
            id: None,
            application_id: None,
            authorization_id: None,
            subject: None,
            token_type,
            status: TokenStatus::Valid,
            reference_id: None,
            payload: None,
            creation_date: Utc::now(),
            expiration_date: None,
            redemption_date: None,
            concurrency_token: new_concurrency_token(),
        }
    }

    /// Whether the entry can still be used
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == TokenStatus::Valid
    }

    /// Whether the entry has expired at the given instant
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expiration| expiration <= now)
    }
}

impl Entity for Token {
    const KIND: EntityKind = EntityKind::Token;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn concurrency_token(&self) -> &str {
        &self.concurrency_token
    }

    fn set_concurrency_token(&mut self, token: String) {
        self.concurrency_token = token;
    }

    fn client_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }
}
