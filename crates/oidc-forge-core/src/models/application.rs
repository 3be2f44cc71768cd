// ABOUTME: Client application entity registered with the authorization server
// ABOUTME: Holds redirect URIs, hashed secret, permissions and requirements
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use serde::{Deserialize, Serialize};

use super::{new_concurrency_token, Entity, EntityKind};

/// Client type (RFC 6749 section 2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Client able to keep a secret
    #[default]
    Confidential,
    /// Client unable to keep a secret (SPA, native)
    Public,
}

/// How consent is collected for this application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    /// Consent must be given explicitly by the user
    #[default]
    Explicit,
    /// Consent is given by an administrator
    External,
    /// Consent is implied
    Implicit,
}

/// Client application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Unique identifier
    pub id: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Hashed client secret (`None` for public clients)
    pub client_secret: Option<String>,
    /// Client type
    pub client_type: ClientType,
    /// Consent type
    pub consent_type: ConsentType,
    /// Display name
    pub display_name: Option<String>,
    /// Permissions (`gt:`, `ept:`, `scp:` prefixed)
    pub permissions: Vec<String>,
    /// Allowed redirect URIs
    pub redirect_uris: Vec<String>,
    /// Allowed post-logout redirect URIs
    pub post_logout_redirect_uris: Vec<String>,
    /// Requirements (e.g. PKCE)
    pub requirements: Vec<String>,
    /// Additional properties
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Concurrency token
    pub concurrency_token: String,
}

/// Requirement forcing PKCE for an application
pub const REQUIREMENT_PKCE: &str = "ft:pkce";

impl Application {
    /// Create a confidential application with the given client identifier
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            id: None,
            client_id: client_id.into(),
            client_secret: None,
            client_type: ClientType::Confidential,
            consent_type: ConsentType::Explicit,
            display_name: None,
            permissions: Vec::new(),
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            requirements: Vec::new(),
            properties: serde_json::Map::new(),
            concurrency_token: new_concurrency_token(),
        }
    }

    /// Mark the application as a public client
    #[must_use]
    pub fn public(mut self) -> Self {
        self.client_type = ClientType::Public;
        self.client_secret = None;
        self
    }

    /// Set the (already hashed) client secret
    #[must_use]
    pub fn with_hashed_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Add an allowed redirect URI
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    /// Add an allowed post-logout redirect URI
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uris.push(uri.into());
        self
    }

    /// Add a permission
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Add a requirement
    #[must_use]
    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    /// Whether this is a public client
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }

    /// Whether the application carries the given permission
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Whether the application declares any permission with the given prefix
    #[must_use]
    pub fn has_permissions_with_prefix(&self, prefix: &str) -> bool {
        self.permissions.iter().any(|p| p.starts_with(prefix))
    }

    /// Whether the application carries the given requirement
    #[must_use]
    pub fn has_requirement(&self, requirement: &str) -> bool {
        self.requirements.iter().any(|r| r == requirement)
    }
}

impl Entity for Application {
    const KIND: EntityKind = EntityKind::Application;

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
        Some(&self.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::permissions;

    #[test]
    fn test_public_application_has_no_secret() {
        let application = Application::new("spa")
            .with_hashed_secret("irrelevant")
            .public();

        assert!(application.is_public());
        assert!(application.client_secret.is_none());
    }

    #[test]
    fn test_permission_lookup() {
        let application = Application::new("console")
            .with_permission(permissions::grant_type("client_credentials"));

        assert!(application.has_permission("gt:client_credentials"));
        assert!(!application.has_permission("gt:refresh_token"));
        assert!(application.has_permissions_with_prefix(permissions::GRANT_TYPE_PREFIX));
        assert!(!application.has_permissions_with_prefix(permissions::SCOPE_PREFIX));
    }
}
