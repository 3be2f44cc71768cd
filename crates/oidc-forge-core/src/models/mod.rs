// ABOUTME: Persistence entities shared by the stores and the server handlers
// ABOUTME: Defines the Entity base contract, entity kinds and token usages
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

/// Client application entity
pub mod application;
/// Authorization (consent) entity
pub mod authorization;
/// Scope entity
pub mod scope;
/// Token entity and token usages
pub mod token;

pub use application::{Application, ClientType, ConsentType};
pub use authorization::{Authorization, AuthorizationStatus, AuthorizationType};
pub use scope::Scope;
pub use token::{Token, TokenStatus, TokenType};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

/// The four entity families managed by the stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Client applications
    Application,
    /// Authorizations
    Authorization,
    /// Scopes
    Scope,
    /// Tokens
    Token,
}

impl EntityKind {
    /// Lower-case name of the entity family
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Authorization => "authorization",
            Self::Scope => "scope",
            Self::Token => "token",
        }
    }

    /// Name of the built-in base entity every custom entity must wrap
    #[must_use]
    pub const fn base_type_name(&self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Authorization => "Authorization",
            Self::Scope => "Scope",
            Self::Token => "Token",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base contract implemented by every persisted entity
///
/// Custom entities implement this trait by delegating to the built-in entity
/// they wrap, which is what makes them usable by the generic stores.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    /// Entity family
    const KIND: EntityKind;

    /// Unique identifier, `None` until the entity is created
    fn id(&self) -> Option<&str>;

    /// Assign the identifier (called by the store on creation)
    fn set_id(&mut self, id: String);

    /// Optimistic concurrency token
    fn concurrency_token(&self) -> &str;

    /// Replace the concurrency token (called by the store on update)
    fn set_concurrency_token(&mut self, token: String);

    /// Client identifier the entity belongs to, when the entity has one
    ///
    /// Applications return their own `client_id`; tokens and authorizations
    /// return the identifier of their application.
    fn client_id(&self) -> Option<&str> {
        None
    }
}

/// Generate a fresh concurrency token
#[must_use]
pub fn new_concurrency_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
