// ABOUTME: Request-scoped transaction and the stage-context contract handlers operate on
// ABOUTME: Transactions carry request, response, principal, options, properties and the outcome
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use oidc_forge_core::errors::{OAuthError, ProtocolErrorCode};
use uuid::Uuid;

use crate::principal::Principal;
use crate::protocol::{EndpointKind, HostRequest, OpenIdRequest, OpenIdResponse};

/// Terminal state of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Processing continues with the next handler
    #[default]
    Continue,
    /// Request rejected with an OAuth2 error
    Error(OAuthError),
    /// A handler produced the response itself
    Handled,
    /// The host application takes over (passthrough)
    Skipped,
}

impl Outcome {
    /// Whether the outcome stops the current dispatch
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// Short name used in logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Error(_) => "error",
            Self::Handled => "handled",
            Self::Skipped => "skipped",
        }
    }
}

/// State of one protocol exchange, threaded through every stage context
pub struct Transaction<O> {
    id: Uuid,
    created_at: DateTime<Utc>,
    /// Endpoint the request was received on
    pub endpoint: EndpointKind,
    /// Raw host request, when the transaction was created from one
    pub host_request: Option<HostRequest>,
    /// Parsed protocol request
    pub request: OpenIdRequest,
    /// Protocol response being built
    pub response: OpenIdResponse,
    /// Principal resolved by authentication or supplied at sign-in
    pub principal: Option<Principal>,
    options: Arc<O>,
    properties: HashMap<String, Box<dyn Any + Send + Sync>>,
    outcome: Outcome,
}

impl<O> Transaction<O> {
    /// Create a transaction for an endpoint
    #[must_use]
    pub fn new(options: Arc<O>, endpoint: EndpointKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            endpoint,
            host_request: None,
            request: OpenIdRequest::new(),
            response: OpenIdResponse::new(),
            principal: None,
            options,
            properties: HashMap::new(),
            outcome: Outcome::Continue,
        }
    }

    /// Unique identifier, used to correlate log lines
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Creation instant
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Options snapshot taken when the transaction was created
    #[must_use]
    pub fn options(&self) -> &O {
        &self.options
    }

    /// Shared handle to the options snapshot
    #[must_use]
    pub fn options_arc(&self) -> Arc<O> {
        Arc::clone(&self.options)
    }

    /// Current outcome
    #[must_use]
    pub const fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Error attached to the transaction, if rejected
    #[must_use]
    pub const fn error(&self) -> Option<&OAuthError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the transaction was rejected
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Reject the request with an OAuth2 error
    pub fn reject(&mut self, error: OAuthError) {
        self.outcome = Outcome::Error(error);
    }

    /// Reject the request with an error code and description
    pub fn reject_with(&mut self, code: ProtocolErrorCode, description: impl Into<String>) {
        self.reject(OAuthError::new(code, description));
    }

    /// Mark the request as fully handled
    pub fn handle_request(&mut self) {
        self.outcome = Outcome::Handled;
    }

    /// Hand the request over to the host application
    pub fn skip_request(&mut self) {
        self.outcome = Outcome::Skipped;
    }

    /// Reset the outcome so processing can resume in a later stage
    pub fn resume(&mut self) {
        self.outcome = Outcome::Continue;
    }

    /// Store a typed property
    pub fn set_property<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.properties.insert(key.into(), Box::new(value));
    }

    /// Read a typed property; `None` when absent or of another type
    #[must_use]
    pub fn property<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.properties.get(key)?.downcast_ref::<T>()
    }

    /// Remove a typed property
    pub fn take_property<T: Send + Sync + 'static>(&mut self, key: &str) -> Option<T> {
        let value = self.properties.remove(key)?;
        value.downcast::<T>().ok().map(|boxed| *boxed)
    }
}

impl<O> Debug for Transaction<O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.properties.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("principal", &self.principal)
            .field("properties", &keys)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Contract implemented by every stage context
///
/// A context exclusively owns the transaction while its stage runs; stage
/// transitions move the transaction into the next context.
pub trait EventContext: Send + Sync + 'static {
    /// Options type carried by the transaction
    type Options: Send + Sync + 'static;

    /// Borrow the transaction
    fn transaction(&self) -> &Transaction<Self::Options>;

    /// Mutably borrow the transaction
    fn transaction_mut(&mut self) -> &mut Transaction<Self::Options>;

    /// Give the transaction back once the stage is over
    fn into_transaction(self) -> Transaction<Self::Options>
    where
        Self: Sized;

    /// Options snapshot
    fn options(&self) -> &Self::Options {
        self.transaction().options()
    }

    /// Protocol request
    fn request(&self) -> &OpenIdRequest {
        &self.transaction().request
    }

    /// Protocol response
    fn response_mut(&mut self) -> &mut OpenIdResponse {
        &mut self.transaction_mut().response
    }

    /// Reject the request with an error code and description
    fn reject(&mut self, code: ProtocolErrorCode, description: impl Into<String>)
    where
        Self: Sized,
    {
        self.transaction_mut().reject_with(code, description);
    }

    /// Whether the transaction was rejected
    fn is_rejected(&self) -> bool {
        self.transaction().is_rejected()
    }
}

/// Implement [`EventContext`] for a struct holding its transaction in a
/// `transaction` field
#[macro_export]
macro_rules! impl_event_context {
    ($context:ident < $($param:ident : $bound:path),* >, $options:ty) => {
        impl<$($param: $bound),*> $crate::pipeline::EventContext for $context<$($param),*> {
            type Options = $options;

            fn transaction(&self) -> &$crate::pipeline::Transaction<$options> {
                &self.transaction
            }

            fn transaction_mut(&mut self) -> &mut $crate::pipeline::Transaction<$options> {
                &mut self.transaction
            }

            fn into_transaction(self) -> $crate::pipeline::Transaction<$options> {
                self.transaction
            }
        }
    };
    ($context:ty, $options:ty) => {
        impl $crate::pipeline::EventContext for $context {
            type Options = $options;

            fn transaction(&self) -> &$crate::pipeline::Transaction<$options> {
                &self.transaction
            }

            fn transaction_mut(&mut self) -> &mut $crate::pipeline::Transaction<$options> {
                &mut self.transaction
            }

            fn into_transaction(self) -> $crate::pipeline::Transaction<$options> {
                self.transaction
            }
        }
    };
}
