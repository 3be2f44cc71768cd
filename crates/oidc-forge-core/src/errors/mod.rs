// ABOUTME: Unified error types for pipeline, store and token-format failures
// ABOUTME: Separates fatal faults (ForgeError) from OAuth2 protocol outcomes (OAuthError)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

//! # Error handling
//!
//! Two families of failures flow through the framework:
//!
//! - [`ForgeError`] is a *fault*. It aborts the current transaction and is
//!   returned to the host (configuration mistakes, store outages, key material
//!   that cannot be loaded).
//! - [`OAuthError`] is a *protocol outcome*. Handlers attach it to the
//!   transaction and it is rendered as a regular OAuth2 error response.

/// OAuth2 protocol error codes and payload
pub mod protocol;

pub use protocol::{OAuthError, ProtocolErrorCode};

use crate::models::EntityKind;

/// Result alias used across the workspace
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Fatal errors raised by the pipeline, the stores and the token formats
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Invalid pipeline, options or store setup
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human readable explanation of what must be fixed
        message: String,
    },

    /// A handler failed in a way it could not translate into a protocol error
    #[error("Handler '{handler}' failed while processing {context}: {details}")]
    Handler {
        /// Type name of the failing handler
        handler: &'static str,
        /// Type name of the context being processed
        context: &'static str,
        /// Error details
        details: String,
    },

    /// The decoding infrastructure of a token format cannot be used
    #[error("Token backend '{backend}' is unavailable: {reason}")]
    TokenBackendUnavailable {
        /// Name of the token format
        backend: &'static str,
        /// Reason reported by the key source or cipher
        reason: String,
    },

    /// A token could not be produced
    #[error("Token generation failed in '{backend}': {reason}")]
    TokenGeneration {
        /// Name of the token format
        backend: &'static str,
        /// Failure details
        reason: String,
    },

    /// A store backend failed
    #[error("Store operation '{operation}' failed for {entity}: {reason}")]
    Store {
        /// Entity kind handled by the store
        entity: EntityKind,
        /// Operation that failed
        operation: &'static str,
        /// Failure details
        reason: String,
    },

    /// Optimistic concurrency check failed on update
    #[error("Concurrency conflict while updating {entity} '{id}'")]
    ConcurrencyConflict {
        /// Entity kind being updated
        entity: EntityKind,
        /// Identifier of the entity
        id: String,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed for {context}")]
    Serialization {
        /// Where serialization failed
        context: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// An operation was attempted on a transaction in the wrong state
    #[error("Invalid transaction state: {0}")]
    InvalidState(String),
}

impl ForgeError {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a store error
    #[must_use]
    pub fn store(entity: EntityKind, operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Store {
            entity,
            operation,
            reason: reason.into(),
        }
    }

    /// Create a backend-unavailable error for a token format
    #[must_use]
    pub fn backend_unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::TokenBackendUnavailable {
            backend,
            reason: reason.into(),
        }
    }

    /// Whether this error describes a configuration problem
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let error = ForgeError::configuration("no store registered");
        assert!(error.is_configuration());
        assert_eq!(error.to_string(), "Configuration error: no store registered");
    }

    #[test]
    fn test_store_error_names_entity() {
        let error = ForgeError::store(EntityKind::Token, "update", "disk full");
        assert_eq!(
            error.to_string(),
            "Store operation 'update' failed for token: disk full"
        );
        assert!(!error.is_configuration());
    }
}
