// ABOUTME: Stage contexts of the authorization server pipeline
// ABOUTME: Request stages are generic over the endpoint; processing stages are shared

use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;

use oidc_forge_core::errors::OAuthError;
use oidc_forge_core::models::{Token, TokenType};

use super::endpoints::{Endpoint, TokenDemand};
use crate::config::ServerOptions;
use crate::impl_event_context;
use crate::pipeline::Transaction;
use crate::principal::Principal;
use crate::protocol::HostResponse;

/// Transaction type used by the server
pub type ServerTransaction = Transaction<ServerOptions>;

/// Extract the protocol request from the host request
pub struct ExtractRequestContext<E: Endpoint> {
    transaction: ServerTransaction,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E: Endpoint> ExtractRequestContext<E> {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ServerTransaction) -> Self {
        Self {
            transaction,
            _endpoint: PhantomData,
        }
    }
}

impl_event_context!(ExtractRequestContext<E: Endpoint>, ServerOptions);

/// Validate the extracted request
pub struct ValidateRequestContext<E: Endpoint> {
    transaction: ServerTransaction,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E: Endpoint> ValidateRequestContext<E> {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ServerTransaction) -> Self {
        Self {
            transaction,
            _endpoint: PhantomData,
        }
    }
}

impl_event_context!(ValidateRequestContext<E: Endpoint>, ServerOptions);

/// Handle a validated request
///
/// Handlers ask for a sign-in or a sign-out by setting the matching field;
/// the provider runs the processing stage once the handle stage is over.
pub struct HandleRequestContext<E: Endpoint> {
    transaction: ServerTransaction,
    /// Principal to sign in
    pub sign_in: Option<Principal>,
    /// Whether to sign the user out
    pub sign_out: bool,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E: Endpoint> HandleRequestContext<E> {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ServerTransaction) -> Self {
        Self {
            transaction,
            sign_in: None,
            sign_out: false,
            _endpoint: PhantomData,
        }
    }
}

impl_event_context!(HandleRequestContext<E: Endpoint>, ServerOptions);

/// Render the protocol response into a host response
pub struct ApplyResponseContext<E: Endpoint> {
    transaction: ServerTransaction,
    /// Error the request was rejected with, if any
    pub error: Option<OAuthError>,
    /// Host response produced by the apply handlers
    pub response: Option<HostResponse>,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E: Endpoint> ApplyResponseContext<E> {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ServerTransaction, error: Option<OAuthError>) -> Self {
        Self {
            transaction,
            error,
            response: None,
            _endpoint: PhantomData,
        }
    }
}

impl_event_context!(ApplyResponseContext<E: Endpoint>, ServerOptions);

/// Resolve the principal carried by a token parameter
pub struct ProcessAuthenticationContext {
    transaction: ServerTransaction,
    /// Token requested by the endpoint
    pub demand: TokenDemand,
    /// Token as read by the formats; reference identifiers are replaced by
    /// their stored payload
    pub token: Option<String>,
    /// Type the token was decoded as
    pub token_type: Option<TokenType>,
}

impl ProcessAuthenticationContext {
    /// Wrap a transaction
    #[must_use]
    pub fn new(transaction: ServerTransaction, demand: TokenDemand) -> Self {
        let token = demand.token.clone();
        Self {
            transaction,
            demand,
            token,
            token_type: None,
        }
    }

    /// Reject a required token or forget an optional one
    ///
    /// Optional tokens (introspection, revocation) never fail the request:
    /// the principal is dropped and the endpoint answers as if the token
    /// were unknown.
    pub fn fail(&mut self, description: &str) {
        if self.demand.required {
            self.transaction
                .reject(OAuthError::new(self.demand.error, description));
        } else {
            self.transaction.principal = None;
            self.token_type = None;
        }
    }
}

impl_event_context!(ProcessAuthenticationContext, ServerOptions);

/// Per-token-type slots, iterated in candidate order
#[derive(Clone)]
pub struct TokenSet<T> {
    slots: [Option<T>; 5],
}

impl<T> TokenSet<T> {
    const fn index(token_type: TokenType) -> usize {
        match token_type {
            TokenType::AccessToken => 0,
            TokenType::RefreshToken => 1,
            TokenType::AuthorizationCode => 2,
            TokenType::DeviceCode => 3,
            TokenType::UserCode => 4,
        }
    }

    /// Value stored for a token type
    #[must_use]
    pub fn get(&self, token_type: TokenType) -> Option<&T> {
        self.slots[Self::index(token_type)].as_ref()
    }

    /// Mutable value stored for a token type
    pub fn get_mut(&mut self, token_type: TokenType) -> Option<&mut T> {
        self.slots[Self::index(token_type)].as_mut()
    }

    /// Store a value, returning the previous one
    pub fn insert(&mut self, token_type: TokenType, value: T) -> Option<T> {
        self.slots[Self::index(token_type)].replace(value)
    }

    /// Remove a value
    pub fn remove(&mut self, token_type: TokenType) -> Option<T> {
        self.slots[Self::index(token_type)].take()
    }

    /// Stored values in candidate order
    pub fn iter(&self) -> impl Iterator<Item = (TokenType, &T)> {
        TokenType::CANDIDATES
            .into_iter()
            .filter_map(|token_type| self.get(token_type).map(|value| (token_type, value)))
    }

    /// Whether no value is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl<T> Default for TokenSet<T> {
    fn default() -> Self {
        Self {
            slots: [None, None, None, None, None],
        }
    }
}

impl<T: Debug> Debug for TokenSet<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Issue tokens for a principal
pub struct ProcessSigninContext {
    transaction: ServerTransaction,
    /// Principal being signed in
    pub principal: Principal,
    /// Token types to issue
    pub included: Vec<TokenType>,
    /// Per-token principals
    pub principals: TokenSet<Principal>,
    /// Stored token entries
    pub entries: TokenSet<Token>,
    /// Wire tokens
    pub tokens: TokenSet<String>,
}

impl ProcessSigninContext {
    /// Wrap a transaction
    #[must_use]
    pub fn new(transaction: ServerTransaction, principal: Principal) -> Self {
        Self {
            transaction,
            principal,
            included: Vec::new(),
            principals: TokenSet::default(),
            entries: TokenSet::default(),
            tokens: TokenSet::default(),
        }
    }

    /// Whether a token of this type is issued
    #[must_use]
    pub fn includes(&self, token_type: TokenType) -> bool {
        self.included.contains(&token_type)
    }

    /// Issue a token of this type
    pub fn include(&mut self, token_type: TokenType) {
        if !self.includes(token_type) {
            self.included.push(token_type);
        }
    }
}

impl_event_context!(ProcessSigninContext, ServerOptions);

/// Sign the user out
pub struct ProcessSignoutContext {
    transaction: ServerTransaction,
}

impl ProcessSignoutContext {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ServerTransaction) -> Self {
        Self { transaction }
    }
}

impl_event_context!(ProcessSignoutContext, ServerOptions);

/// Turn a rejection into error response parameters
pub struct ProcessErrorContext {
    transaction: ServerTransaction,
    /// Error being reported
    pub error: OAuthError,
}

impl ProcessErrorContext {
    /// Wrap a transaction
    #[must_use]
    pub const fn new(transaction: ServerTransaction, error: OAuthError) -> Self {
        Self { transaction, error }
    }
}

impl_event_context!(ProcessErrorContext, ServerOptions);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_set_iterates_in_candidate_order() {
        let mut set = TokenSet::default();
        set.insert(TokenType::UserCode, "user");
        set.insert(TokenType::AccessToken, "access");

        let order: Vec<TokenType> = set.iter().map(|(token_type, _)| token_type).collect();
        assert_eq!(order, vec![TokenType::AccessToken, TokenType::UserCode]);
        assert_eq!(set.remove(TokenType::UserCode), Some("user"));
        assert!(!set.is_empty());
    }
}
