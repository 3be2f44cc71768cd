// ABOUTME: Server provider running complete endpoint flows over the handler pipeline
// ABOUTME: Extract, validate, authenticate, handle, sign-in/out, error and apply stages in sequence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::marker::PhantomData;
use std::sync::Arc;

use oidc_forge_core::constants::{claims, parameters, properties};
use oidc_forge_core::errors::{ForgeError, ForgeResult, OAuthError, ProtocolErrorCode};
use oidc_forge_core::models::{Token, TokenStatus, TokenType};
use tracing::{debug, info, warn};

use super::endpoints::{Endpoint, TokenDemand};
use super::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext, ProcessAuthenticationContext,
    ProcessErrorContext, ProcessSigninContext, ProcessSignoutContext, ServerTransaction,
    ValidateRequestContext,
};
use super::handlers::{self, common::status_for, signin::normalize_user_code};
use crate::config::ServerOptions;
use crate::formats::{KeyProvider, StaticKeyProvider, TokenFormats};
use crate::pipeline::{
    Dispatcher, EventContext, HandlerRegistrations, HandlerRegistry, Outcome, ServiceProvider,
};
use crate::principal::Principal;
use crate::protocol::{EndpointKind, HostRequest, HostResponse, OpenIdRequest};
use crate::stores::{MemoryDatabase, MemoryStoreAdapter, StoreResolver};

/// Name of the in-memory database created when no resolver is supplied
pub const DEFAULT_DATABASE_NAME: &str = "oidc-forge";

/// Result of running an endpoint flow
#[derive(Debug)]
pub enum FlowResult<E: Endpoint> {
    /// The flow produced a response for the host to send
    Response(HostResponse),
    /// The handle stage was delegated to the host application
    Passthrough(PendingRequest<E>),
}

impl<E: Endpoint> FlowResult<E> {
    /// Response, when the flow completed
    #[must_use]
    pub fn into_response(self) -> Option<HostResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Passthrough(_) => None,
        }
    }

    /// Pending request, when the flow was handed over to the host
    #[must_use]
    pub fn into_pending(self) -> Option<PendingRequest<E>> {
        match self {
            Self::Response(_) => None,
            Self::Passthrough(pending) => Some(pending),
        }
    }
}

/// Request suspended in passthrough mode, waiting for the host to decide
///
/// The host inspects the validated request, then resumes the flow through
/// [`ServerProvider::sign_in`], [`ServerProvider::sign_out`],
/// [`ServerProvider::reject`] or [`ServerProvider::complete`].
#[derive(Debug)]
pub struct PendingRequest<E: Endpoint> {
    transaction: ServerTransaction,
    _endpoint: PhantomData<fn() -> E>,
}

impl<E: Endpoint> PendingRequest<E> {
    const fn new(transaction: ServerTransaction) -> Self {
        Self {
            transaction,
            _endpoint: PhantomData,
        }
    }

    /// Validated protocol request
    #[must_use]
    pub fn request(&self) -> &OpenIdRequest {
        &self.transaction.request
    }

    /// Principal resolved from the request token, if any
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.transaction.principal.as_ref()
    }

    /// Suspended transaction
    #[must_use]
    pub const fn transaction(&self) -> &ServerTransaction {
        &self.transaction
    }

    /// Mutable access, e.g. to fill response parameters before [`ServerProvider::complete`]
    pub fn transaction_mut(&mut self) -> &mut ServerTransaction {
        &mut self.transaction
    }
}

/// Authorization server entry point
pub struct ServerProvider {
    options: Arc<ServerOptions>,
    resolver: Arc<StoreResolver>,
    formats: Arc<TokenFormats>,
    dispatcher: Dispatcher,
}

impl ServerProvider {
    /// Start building a provider
    #[must_use]
    pub fn builder(options: ServerOptions) -> ServerProviderBuilder {
        ServerProviderBuilder::new(options)
    }

    /// Options shared by every transaction
    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Store resolver used by the handlers
    #[must_use]
    pub fn resolver(&self) -> &Arc<StoreResolver> {
        &self.resolver
    }

    /// Token format backends
    #[must_use]
    pub fn formats(&self) -> &Arc<TokenFormats> {
        &self.formats
    }

    /// Resolved handler registry
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        self.dispatcher.registry()
    }

    /// Create an empty transaction for an endpoint
    #[must_use]
    pub fn create_transaction(&self, endpoint: EndpointKind) -> ServerTransaction {
        ServerTransaction::new(Arc::clone(&self.options), endpoint)
    }

    /// Dispatch a single stage context
    ///
    /// # Errors
    ///
    /// Propagates handler and filter failures
    pub async fn dispatch<C>(&self, context: &mut C) -> ForgeResult<Outcome>
    where
        C: EventContext<Options = ServerOptions>,
    {
        self.dispatcher.dispatch(context).await
    }

    /// Run the flow of endpoint `E` for a host request
    ///
    /// # Errors
    ///
    /// Returns an error when a handler fails; protocol errors are rendered
    /// into the response instead
    pub async fn process<E: Endpoint>(&self, request: HostRequest) -> ForgeResult<FlowResult<E>> {
        let mut transaction = self.create_transaction(E::KIND);
        transaction.host_request = Some(request);
        self.run::<E>(transaction).await
    }

    /// Run the flow of endpoint `E` for already parsed parameters
    ///
    /// # Errors
    ///
    /// Returns an error when a handler fails
    pub async fn process_request<E: Endpoint>(
        &self,
        request: OpenIdRequest,
    ) -> ForgeResult<FlowResult<E>> {
        let mut transaction = self.create_transaction(E::KIND);
        transaction.request = request;
        self.run::<E>(transaction).await
    }

    /// Issue tokens for a principal chosen by the host
    ///
    /// # Errors
    ///
    /// Returns an error when a sign-in handler fails
    pub async fn sign_in<E: Endpoint>(
        &self,
        pending: PendingRequest<E>,
        principal: Principal,
    ) -> ForgeResult<HostResponse> {
        let mut transaction = pending.transaction;
        transaction.resume();
        let transaction = self.sign_in_transaction(transaction, principal).await?;
        self.finish::<E>(transaction).await
    }

    /// Sign the user out
    ///
    /// # Errors
    ///
    /// Returns an error when a sign-out handler fails
    pub async fn sign_out<E: Endpoint>(&self, pending: PendingRequest<E>) -> ForgeResult<HostResponse> {
        let mut transaction = pending.transaction;
        transaction.resume();
        let transaction = self.sign_out_transaction(transaction).await?;
        self.finish::<E>(transaction).await
    }

    /// Reject a pending request
    ///
    /// # Errors
    ///
    /// Returns an error when an error or apply handler fails
    pub async fn reject<E: Endpoint>(
        &self,
        pending: PendingRequest<E>,
        error: OAuthError,
    ) -> ForgeResult<HostResponse> {
        let mut transaction = pending.transaction;
        transaction.reject(error);
        self.finish::<E>(transaction).await
    }

    /// Render the response the host filled in itself
    ///
    /// # Errors
    ///
    /// Returns an error when an apply handler fails
    pub async fn complete<E: Endpoint>(&self, pending: PendingRequest<E>) -> ForgeResult<HostResponse> {
        let mut transaction = pending.transaction;
        transaction.handle_request();
        self.finish::<E>(transaction).await
    }

    /// Approve the device authorization identified by a user code
    ///
    /// The device code entry receives the subject of `principal` and becomes
    /// valid, so the next token request of the device succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error on store or token backend failures; unknown, expired
    /// or used user codes produce `Ok(Err(_))`
    pub async fn approve_device(
        &self,
        user_code: &str,
        principal: &Principal,
    ) -> ForgeResult<Result<(), OAuthError>> {
        let Some(subject) = principal.subject() else {
            return Err(ForgeError::InvalidState(
                "a device authorization cannot be approved without a subject".to_owned(),
            ));
        };
        let mut device_entry = match self.redeem_user_code(user_code).await? {
            Ok(entry) => entry,
            Err(error) => return Ok(Err(error)),
        };
        device_entry.subject = Some(subject.to_owned());
        device_entry.status = TokenStatus::Valid;
        let device_entry = self.resolver.get::<Token>()?.update(device_entry).await?;
        info!(
            token_id = device_entry.id.as_deref().unwrap_or_default(),
            subject,
            "device authorization approved"
        );
        Ok(Ok(()))
    }

    /// Deny the device authorization identified by a user code
    ///
    /// # Errors
    ///
    /// Same as [`ServerProvider::approve_device`]
    pub async fn deny_device(&self, user_code: &str) -> ForgeResult<Result<(), OAuthError>> {
        let mut device_entry = match self.redeem_user_code(user_code).await? {
            Ok(entry) => entry,
            Err(error) => return Ok(Err(error)),
        };
        device_entry.status = TokenStatus::Revoked;
        let device_entry = self.resolver.get::<Token>()?.update(device_entry).await?;
        info!(
            token_id = device_entry.id.as_deref().unwrap_or_default(),
            "device authorization denied"
        );
        Ok(Ok(()))
    }

    // Authenticates the user code through the authentication stage, marks it
    // redeemed and returns the pending device code entry.
    async fn redeem_user_code(&self, user_code: &str) -> ForgeResult<Result<Token, OAuthError>> {
        if self.options.disable_token_storage {
            return Err(ForgeError::configuration(
                "the device flow requires token storage",
            ));
        }

        let mut transaction = self.create_transaction(EndpointKind::Device);
        let demand = TokenDemand {
            parameter: parameters::USER_CODE,
            token: Some(normalize_user_code(user_code)),
            candidates: vec![TokenType::UserCode],
            required: true,
            error: ProtocolErrorCode::InvalidRequest,
        };
        transaction.request.set(parameters::USER_CODE, user_code);

        let mut context = ProcessAuthenticationContext::new(transaction, demand);
        self.dispatcher.dispatch(&mut context).await?;
        let mut transaction = context.into_transaction();
        if let Outcome::Error(error) = transaction.outcome() {
            debug!(error = %error.error, "user code rejected");
            return Ok(Err(error.clone()));
        }

        let device_code_id = transaction
            .principal
            .as_ref()
            .and_then(|principal| principal.claim_str(claims::private::DEVICE_CODE_ID))
            .map(str::to_owned);
        let (Some(device_code_id), Some(mut user_entry)) = (
            device_code_id,
            transaction.take_property::<Token>(properties::TOKEN_ENTRY),
        ) else {
            return Ok(Err(OAuthError::invalid_request(
                "The specified 'user_code' is invalid.",
            )));
        };

        let store = self.resolver.get::<Token>()?;
        let Some(device_entry) = store
            .find_by_id(&device_code_id)
            .await?
            .filter(|entry| entry.status == TokenStatus::Inactive)
        else {
            return Ok(Err(OAuthError::invalid_request(
                "The device authorization is no longer pending.",
            )));
        };

        user_entry.status = TokenStatus::Redeemed;
        user_entry.redemption_date = Some(chrono::Utc::now());
        store.update(user_entry).await?;
        Ok(Ok(device_entry))
    }

    async fn run<E: Endpoint>(&self, transaction: ServerTransaction) -> ForgeResult<FlowResult<E>> {
        let mut context = ExtractRequestContext::<E>::new(transaction);
        self.dispatcher.dispatch(&mut context).await?;
        let transaction = context.into_transaction();
        if transaction.outcome().is_terminal() {
            return self.interrupt::<E>(transaction).await;
        }

        let mut context = ValidateRequestContext::<E>::new(transaction);
        self.dispatcher.dispatch(&mut context).await?;
        let mut transaction = context.into_transaction();
        if transaction.outcome().is_terminal() {
            return self.interrupt::<E>(transaction).await;
        }

        if let Some(demand) = E::token_demand(&transaction.request) {
            let mut context = ProcessAuthenticationContext::new(transaction, demand);
            self.dispatcher.dispatch(&mut context).await?;
            transaction = context.into_transaction();
            if transaction.outcome().is_terminal() {
                return self.interrupt::<E>(transaction).await;
            }
        }

        let mut context = HandleRequestContext::<E>::new(transaction);
        self.dispatcher.dispatch(&mut context).await?;
        let sign_in = context.sign_in.take();
        let sign_out = context.sign_out;
        let mut transaction = context.into_transaction();
        if transaction.outcome().is_terminal() {
            return self.interrupt::<E>(transaction).await;
        }

        if let Some(principal) = sign_in {
            transaction = self.sign_in_transaction(transaction, principal).await?;
        } else if sign_out {
            transaction = self.sign_out_transaction(transaction).await?;
        }
        Ok(FlowResult::Response(self.finish::<E>(transaction).await?))
    }

    async fn interrupt<E: Endpoint>(
        &self,
        transaction: ServerTransaction,
    ) -> ForgeResult<FlowResult<E>> {
        if *transaction.outcome() == Outcome::Skipped {
            debug!(
                transaction = %transaction.id(),
                endpoint = %E::KIND,
                "request handed over to the host"
            );
            return Ok(FlowResult::Passthrough(PendingRequest::new(transaction)));
        }
        Ok(FlowResult::Response(self.finish::<E>(transaction).await?))
    }

    async fn sign_in_transaction(
        &self,
        transaction: ServerTransaction,
        principal: Principal,
    ) -> ForgeResult<ServerTransaction> {
        let mut context = ProcessSigninContext::new(transaction, principal);
        self.dispatcher.dispatch(&mut context).await?;
        Ok(context.into_transaction())
    }

    async fn sign_out_transaction(
        &self,
        transaction: ServerTransaction,
    ) -> ForgeResult<ServerTransaction> {
        let mut context = ProcessSignoutContext::new(transaction);
        self.dispatcher.dispatch(&mut context).await?;
        Ok(context.into_transaction())
    }

    // Error stage when rejected, then the apply stage.
    async fn finish<E: Endpoint>(&self, mut transaction: ServerTransaction) -> ForgeResult<HostResponse> {
        let error = transaction.error().cloned();
        if let Some(error) = error.clone() {
            transaction.resume();
            let mut context = ProcessErrorContext::new(transaction, error);
            self.dispatcher.dispatch(&mut context).await?;
            transaction = context.into_transaction();
        }

        transaction.resume();
        let mut context = ApplyResponseContext::<E>::new(transaction, error);
        self.dispatcher.dispatch(&mut context).await?;
        let response = context.response.take().unwrap_or_else(|| {
            HostResponse::json(
                status_for(context.error.as_ref()),
                context.transaction().response.to_json(),
            )
        });

        let transaction = context.transaction();
        match context.error.as_ref() {
            Some(error) => warn!(
                transaction = %transaction.id(),
                endpoint = %E::KIND,
                error = %error.error,
                status = response.status.as_u16(),
                "request rejected"
            ),
            None => info!(
                transaction = %transaction.id(),
                endpoint = %E::KIND,
                status = response.status.as_u16(),
                "request completed"
            ),
        }
        Ok(response)
    }
}

/// Builder for [`ServerProvider`]
pub struct ServerProviderBuilder {
    options: ServerOptions,
    registrations: HandlerRegistrations,
    resolver: Option<Arc<StoreResolver>>,
    keys: Option<Arc<dyn KeyProvider>>,
    services: ServiceProvider,
}

impl ServerProviderBuilder {
    fn new(options: ServerOptions) -> Self {
        Self {
            options,
            registrations: HandlerRegistrations::new(),
            resolver: None,
            keys: None,
            services: ServiceProvider::new(),
        }
    }

    /// Add, remove or replace handlers
    #[must_use]
    pub fn with_registrations(mut self, registrations: HandlerRegistrations) -> Self {
        self.registrations = registrations;
        self
    }

    /// Use a custom store resolver instead of the in-memory default
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<StoreResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use custom key material for the token formats
    #[must_use]
    pub fn with_key_provider(mut self, keys: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Expose an additional service to custom handlers
    #[must_use]
    pub fn with_service<T: Send + Sync + 'static>(self, service: T) -> Self {
        self.services.insert(Arc::new(service));
        self
    }

    /// Build the provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the signing key is invalid or a
    /// default handler descriptor cannot be built
    pub fn build(self) -> ForgeResult<ServerProvider> {
        let options = Arc::new(self.options);

        let keys: Arc<dyn KeyProvider> = match (self.keys, options.signing_key.as_deref()) {
            (Some(keys), _) => keys,
            (None, Some(encoded)) => Arc::new(StaticKeyProvider::from_base64(encoded)?),
            (None, None) => {
                warn!("no signing key configured, tokens will not survive a restart");
                Arc::new(StaticKeyProvider::generate()?)
            }
        };
        let formats = Arc::new(TokenFormats::new(keys, options.issuer.clone()));

        let resolver = self.resolver.unwrap_or_else(|| {
            let adapter = MemoryStoreAdapter::new()
                .with_database(Arc::new(MemoryDatabase::new(DEFAULT_DATABASE_NAME)))
                .register_default_entities();
            Arc::new(StoreResolver::with_adapter(adapter))
        });

        let services = self.services;
        services.insert(Arc::clone(&options));
        services.insert(Arc::clone(&formats));
        services.insert(Arc::clone(&resolver));

        let registry = HandlerRegistry::build(handlers::default_handlers()?, self.registrations);
        info!(
            handlers = registry.len(),
            format = %options.preferred_format,
            token_storage = !options.disable_token_storage,
            "server provider built"
        );

        Ok(ServerProvider {
            dispatcher: Dispatcher::new(Arc::new(registry), Arc::new(services)),
            options,
            resolver,
            formats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::endpoints::Token as TokenEndpoint;

    #[tokio::test]
    async fn test_unsupported_grant_is_rendered_as_error() {
        let provider = ServerProvider::builder(ServerOptions::default().with_degraded_mode())
            .build()
            .unwrap();
        let request = HostRequest::post_pairs([("grant_type", "password"), ("client_id", "app")]);

        let response = provider
            .process::<TokenEndpoint>(request)
            .await
            .unwrap()
            .into_response()
            .unwrap();

        assert_eq!(response.status.as_u16(), 400);
        let body = response.body.unwrap();
        assert_eq!(body["error"], "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_unknown_user_code_is_rejected() {
        let provider = ServerProvider::builder(ServerOptions::default()).build().unwrap();
        let outcome = provider
            .approve_device("BCDF-GHJK", &Principal::for_subject("alice"))
            .await
            .unwrap();
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_device_approval_requires_subject() {
        let provider = ServerProvider::builder(ServerOptions::default()).build().unwrap();
        let result = provider.approve_device("BCDFGHJK", &Principal::new()).await;
        assert!(matches!(result, Err(ForgeError::InvalidState(_))));
    }
}
