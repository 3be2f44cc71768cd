// ABOUTME: Authorization entity recording a subject's grant to an application
// ABOUTME: Tokens reference their authorization so revoking it revokes them all

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_concurrency_token, Entity, EntityKind};

/// Authorization status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// Authorization can be used
    Valid,
    /// Authorization was revoked
    Revoked,
}

/// Authorization type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    /// Created for a single flow
    AdHoc,
    /// Reusable across flows
    Permanent,
}

/// Authorization granted by a subject to an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Unique identifier
    pub id: Option<String>,
    /// Identifier of the application
    pub application_id: Option<String>,
    /// Subject that granted the authorization
    pub subject: String,
    /// Status
    pub status: AuthorizationStatus,
    /// Type
    pub kind: AuthorizationType,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Creation date
    pub creation_date: DateTime<Utc>,
    /// Concurrency token
    pub concurrency_token: String,
}

impl Authorization {
    /// Create a valid ad-hoc authorization
    #[must_use]
    pub fn ad_hoc(subject: impl Into<String>, application_id: Option<String>) -> Self {
        Self {
            id: None,
            application_id,
            subject: subject.into(),
            status: AuthorizationStatus::Valid,
            kind: AuthorizationType::AdHoc,
            scopes: Vec::new(),
            creation_date: Utc::now(),
            concurrency_token: new_concurrency_token(),
        }
    }

    /// Whether the authorization can still be used
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == AuthorizationStatus::Valid
    }
}

impl Entity for Authorization {
    const KIND: EntityKind = EntityKind::Authorization;

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
