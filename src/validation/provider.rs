// ABOUTME: Validation provider authenticating bearer tokens for resource servers
// ABOUTME: Runs the request and token validation stages and reports a principal or an error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::sync::Arc;

use oidc_forge_core::errors::{ForgeError, ForgeResult, OAuthError};
use tracing::{debug, info};

use super::events::{ProcessRequestContext, ValidateTokenContext, ValidationTransaction};
use super::handlers;
use crate::config::ValidationOptions;
use crate::formats::{KeyProvider, StaticKeyProvider, TokenFormats};
use crate::pipeline::{
    Dispatcher, EventContext, HandlerRegistrations, HandlerRegistry, Outcome, ServiceProvider,
};
use crate::principal::Principal;
use crate::protocol::{EndpointKind, HostRequest};
use crate::server::handlers::userinfo::bearer_challenge;
use crate::stores::StoreResolver;

/// Result of authenticating a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The token is valid
    Valid(Principal),
    /// The token is missing or invalid
    Invalid(OAuthError),
}

impl ValidationResult {
    /// Principal, when valid
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Valid(principal) => Some(principal),
            Self::Invalid(_) => None,
        }
    }

    /// `WWW-Authenticate` challenge to send back, when invalid
    #[must_use]
    pub fn challenge(&self) -> Option<String> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(error) => Some(bearer_challenge(error)),
        }
    }
}

/// Resource-server entry point
pub struct ValidationProvider {
    options: Arc<ValidationOptions>,
    dispatcher: Dispatcher,
}

impl ValidationProvider {
    /// Start building a provider
    #[must_use]
    pub fn builder(options: ValidationOptions) -> ValidationProviderBuilder {
        ValidationProviderBuilder {
            options,
            registrations: HandlerRegistrations::new(),
            resolver: None,
            keys: None,
            formats: None,
        }
    }

    /// Options shared by every transaction
    #[must_use]
    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Resolved handler registry
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        self.dispatcher.registry()
    }

    /// Create an empty validation transaction
    #[must_use]
    pub fn create_transaction(&self) -> ValidationTransaction {
        ValidationTransaction::new(Arc::clone(&self.options), EndpointKind::Unknown)
    }

    /// Dispatch a single stage context
    ///
    /// # Errors
    ///
    /// Propagates handler and filter failures
    pub async fn dispatch<C>(&self, context: &mut C) -> ForgeResult<Outcome>
    where
        C: EventContext<Options = ValidationOptions>,
    {
        self.dispatcher.dispatch(context).await
    }

    /// Authenticate the bearer token of a host request
    ///
    /// # Errors
    ///
    /// Returns an error when a handler fails; invalid tokens produce
    /// [`ValidationResult::Invalid`]
    pub async fn authenticate(&self, request: HostRequest) -> ForgeResult<ValidationResult> {
        let mut transaction = self.create_transaction();
        transaction.host_request = Some(request);

        let mut context = ProcessRequestContext::new(transaction);
        self.dispatcher.dispatch(&mut context).await?;
        let token = context.token.take();
        let transaction = context.into_transaction();
        if let Some(error) = transaction.error() {
            return Ok(ValidationResult::Invalid(error.clone()));
        }
        let Some(token) = token else {
            return Ok(ValidationResult::Invalid(OAuthError::invalid_token(
                "The access token is missing.",
            )));
        };

        self.validate_transaction(transaction, token).await
    }

    /// Validate a token obtained by other means
    ///
    /// # Errors
    ///
    /// Returns an error when a handler fails
    pub async fn validate_token(&self, token: &str) -> ForgeResult<ValidationResult> {
        self.validate_transaction(self.create_transaction(), token.to_owned())
            .await
    }

    async fn validate_transaction(
        &self,
        transaction: ValidationTransaction,
        token: String,
    ) -> ForgeResult<ValidationResult> {
        let mut context = ValidateTokenContext::new(transaction, token);
        self.dispatcher.dispatch(&mut context).await?;
        let mut transaction = context.into_transaction();

        if let Some(error) = transaction.error() {
            debug!(transaction = %transaction.id(), error = %error.error, "access token rejected");
            return Ok(ValidationResult::Invalid(error.clone()));
        }
        match transaction.principal.take() {
            Some(principal) => Ok(ValidationResult::Valid(principal)),
            None => Ok(ValidationResult::Invalid(OAuthError::invalid_token(
                "The access token is invalid.",
            ))),
        }
    }
}

/// Builder for [`ValidationProvider`]
pub struct ValidationProviderBuilder {
    options: ValidationOptions,
    registrations: HandlerRegistrations,
    resolver: Option<Arc<StoreResolver>>,
    keys: Option<Arc<dyn KeyProvider>>,
    formats: Option<Arc<TokenFormats>>,
}

impl ValidationProviderBuilder {
    /// Add, remove or replace handlers
    #[must_use]
    pub fn with_registrations(mut self, registrations: HandlerRegistrations) -> Self {
        self.registrations = registrations;
        self
    }

    /// Token store used for entry validation
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<StoreResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Key material shared with the server
    #[must_use]
    pub fn with_key_provider(mut self, keys: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Reuse the token formats of a co-located server
    #[must_use]
    pub fn with_formats(mut self, formats: Arc<TokenFormats>) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Build the provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no key material is available or
    /// entry validation is enabled without a store resolver
    pub fn build(self) -> ForgeResult<ValidationProvider> {
        let options = Arc::new(self.options);

        let formats = match (self.formats, self.keys, options.signing_key.as_deref()) {
            (Some(formats), _, _) => formats,
            (None, Some(keys), _) => Arc::new(TokenFormats::new(keys, None)),
            (None, None, Some(encoded)) => {
                let keys: Arc<dyn KeyProvider> = Arc::new(StaticKeyProvider::from_base64(encoded)?);
                Arc::new(TokenFormats::new(keys, None))
            }
            (None, None, None) => {
                return Err(ForgeError::configuration(
                    "the validation provider needs the server's key material or token formats",
                ))
            }
        };

        let services = ServiceProvider::new();
        services.insert(Arc::clone(&options));
        services.insert(formats);
        match self.resolver {
            Some(resolver) => services.insert(resolver),
            None if options.validate_token_entries => {
                return Err(ForgeError::configuration(
                    "token entry validation requires a store resolver",
                ))
            }
            None => debug!("no store resolver configured, token entries are not checked"),
        }

        let registry = HandlerRegistry::build(handlers::default_handlers()?, self.registrations);
        info!(
            handlers = registry.len(),
            audiences = options.audiences.len(),
            entry_validation = options.validate_token_entries,
            "validation provider built"
        );

        Ok(ValidationProvider {
            dispatcher: Dispatcher::new(Arc::new(registry), Arc::new(services)),
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    #[test]
    fn test_build_requires_key_material() {
        let result = ValidationProvider::builder(ValidationOptions::default()).build();
        assert!(matches!(result, Err(ForgeError::Configuration { .. })));
    }

    #[test]
    fn test_entry_validation_requires_resolver() {
        let options = ValidationOptions::default()
            .with_token_entry_validation()
            .with_signing_key(STANDARD.encode([9_u8; 32]));
        let result = ValidationProvider::builder(options).build();
        assert!(matches!(result, Err(ForgeError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_missing_token_is_invalid() {
        let keys: Arc<dyn KeyProvider> = Arc::new(StaticKeyProvider::generate().unwrap());
        let provider = ValidationProvider::builder(ValidationOptions::default())
            .with_key_provider(keys)
            .build()
            .unwrap();

        let result = provider.authenticate(HostRequest::get("")).await.unwrap();
        assert!(result.principal().is_none());
        assert_eq!(
            result.challenge().as_deref(),
            Some("Bearer error=\"invalid_token\", error_description=\"The access token is missing.\"")
        );
    }
}
