// ABOUTME: Stage contexts of the resource-server validation pipeline
// ABOUTME: Request processing extracts the bearer token, token validation turns it into a principal

use oidc_forge_core::models::TokenType;

use crate::config::ValidationOptions;
use crate::impl_event_context;
use crate::pipeline::Transaction;

/// Transaction type used by the validation side
pub type ValidationTransaction = Transaction<ValidationOptions>;

/// Extract the access token from the host request
pub struct ProcessRequestContext {
    transaction: ValidationTransaction,
    /// Access token found in the request
    pub token: Option<String>,
}

impl ProcessRequestContext {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ValidationTransaction) -> Self {
        Self {
            transaction,
            token: None,
        }
    }
}

impl_event_context!(ProcessRequestContext, ValidationOptions);

/// Decode and verify an access token
pub struct ValidateTokenContext {
    transaction: ValidationTransaction,
    /// Token being validated; reference identifiers are replaced by their payload
    pub token: String,
    /// Type the token decoded as
    pub token_type: Option<TokenType>,
}

impl ValidateTokenContext {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ValidationTransaction, token: String) -> Self {
        Self {
            transaction,
            token,
            token_type: None,
        }
    }
}

impl_event_context!(ValidateTokenContext, ValidationOptions);
