// ABOUTME: Endpoint families served by the engine
// ABOUTME: Used to tag transactions and to key per-endpoint options

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Endpoint a transaction was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Authorization endpoint
    Authorization,
    /// Token endpoint
    Token,
    /// Introspection endpoint
    Introspection,
    /// Revocation endpoint
    Revocation,
    /// Userinfo endpoint
    Userinfo,
    /// Device authorization endpoint
    Device,
    /// End-session (logout) endpoint
    Logout,
    /// No endpoint (validation transactions, unrecognized requests)
    Unknown,
}

impl EndpointKind {
    /// Every server endpoint
    pub const ALL: [Self; 7] = [
        Self::Authorization,
        Self::Token,
        Self::Introspection,
        Self::Revocation,
        Self::Userinfo,
        Self::Device,
        Self::Logout,
    ];

    /// Lower-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Token => "token",
            Self::Introspection => "introspection",
            Self::Revocation => "revocation",
            Self::Userinfo => "userinfo",
            Self::Device => "device",
            Self::Logout => "logout",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the lower-case name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl Display for EndpointKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
