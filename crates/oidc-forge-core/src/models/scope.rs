// ABOUTME: Scope entity describing a permission clients can request
// ABOUTME: Scopes list the resources (audiences) they grant access to

use serde::{Deserialize, Serialize};

use super::{new_concurrency_token, Entity, EntityKind};

/// Registered scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Unique identifier
    pub id: Option<String>,
    /// Scope name as used on the wire
    pub name: String,
    /// Display name
    pub display_name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Resources (audiences) associated with the scope
    pub resources: Vec<String>,
    /// Concurrency token
    pub concurrency_token: String,
}

impl Scope {
    /// Create a scope with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            display_name: None,
            description: None,
            resources: Vec::new(),
            concurrency_token: new_concurrency_token(),
        }
    }

    /// Add a resource
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }
}

impl Entity for Scope {
    const KIND: EntityKind = EntityKind::Scope;

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
}
