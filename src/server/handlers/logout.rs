// ABOUTME: Logout endpoint handlers: post-logout redirect validation and sign-out
// ABOUTME: Redirects only to URIs some registered application declared

use std::sync::Arc;

use async_trait::async_trait;
use oidc_forge_core::constants::properties;
use oidc_forge_core::errors::{ForgeResult, ProtocolErrorCode};
use oidc_forge_core::models::Application;
use oidc_forge_core::pagination::Page;
use tracing::{debug, warn};
use url::Url;

use super::authorization::parse_redirect_target;
use super::common::{
    status_for, EnablePassthroughMode, ExtractGetOrPostRequest, RejectDisabledEndpoint,
};
use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, FromServices, Handler, ServiceProvider};
use crate::protocol::HostResponse;
use crate::server::endpoints::Logout;
use crate::server::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext, ValidateRequestContext,
};
use crate::server::filters::{RequireDegradedModeDisabled, RequireEndpointPassthroughEnabled};
use crate::stateless_handlers;
use crate::stores::StoreResolver;

type Validate = ValidateRequestContext<Logout>;

/// Requires `post_logout_redirect_uri`, when present, to be an absolute URL
#[derive(Debug, Default)]
pub struct ValidatePostLogoutRedirectUriParameter;

impl ValidatePostLogoutRedirectUriParameter {
    /// Sort key
    pub const ORDER: i32 = 10_000;
}

#[async_trait]
impl Handler<Validate> for ValidatePostLogoutRedirectUriParameter {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let Some(value) = context.request().post_logout_redirect_uri() else {
            return Ok(());
        };

        match parse_redirect_target(value, "post_logout_redirect_uri") {
            Ok(url) if context.options().degraded_mode => context
                .transaction_mut()
                .set_property(properties::POST_LOGOUT_REDIRECT_URI, url),
            Ok(_) => {}
            Err(error) => context.transaction_mut().reject(error),
        }
        Ok(())
    }
}

/// Requires the post-logout redirect URI to be registered by some application
pub struct ValidatePostLogoutRedirectUriRegistration {
    resolver: Arc<StoreResolver>,
}

impl ValidatePostLogoutRedirectUriRegistration {
    /// Sort key
    pub const ORDER: i32 = 30_000;
}

impl FromServices for ValidatePostLogoutRedirectUriRegistration {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Validate> for ValidatePostLogoutRedirectUriRegistration {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let Some(value) = context.request().post_logout_redirect_uri().map(str::to_owned) else {
            return Ok(());
        };
        let client_id = context.request().client_id().map(str::to_owned);

        let registered = self
            .resolver
            .get::<Application>()?
            .list_where(
                &|application: &Application| {
                    client_id
                        .as_deref()
                        .is_none_or(|client_id| application.client_id == client_id)
                        && application.post_logout_redirect_uris.contains(&value)
                },
                Page::first(1),
            )
            .await?;
        if registered.is_empty() {
            warn!(post_logout_redirect_uri = %value, "unregistered post_logout_redirect_uri");
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The specified 'post_logout_redirect_uri' is not valid.",
            );
            return Ok(());
        }

        match parse_redirect_target(&value, "post_logout_redirect_uri") {
            Ok(url) => context
                .transaction_mut()
                .set_property(properties::POST_LOGOUT_REDIRECT_URI, url),
            Err(error) => context.transaction_mut().reject(error),
        }
        Ok(())
    }
}

/// Asks for a sign-out
#[derive(Debug, Default)]
pub struct HandleLogoutRequest;

impl HandleLogoutRequest {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<HandleRequestContext<Logout>> for HandleLogoutRequest {
    async fn handle(&self, context: &mut HandleRequestContext<Logout>) -> ForgeResult<()> {
        context.sign_out = true;
        Ok(())
    }
}

/// Redirects to the post-logout target, JSON otherwise
#[derive(Debug, Default)]
pub struct ApplyLogoutResponse;

impl ApplyLogoutResponse {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<ApplyResponseContext<Logout>> for ApplyLogoutResponse {
    async fn handle(&self, context: &mut ApplyResponseContext<Logout>) -> ForgeResult<()> {
        let transaction = context.transaction();
        let response = match transaction.property::<Url>(properties::REDIRECT_URI) {
            Some(target) if context.error.is_none() => {
                debug!(transaction = %transaction.id(), "redirecting after logout");
                HostResponse::redirect(target, &transaction.response.to_query_pairs())
            }
            _ => HostResponse::json(status_for(context.error.as_ref()), transaction.response.to_json()),
        };
        context.response = Some(response);
        Ok(())
    }
}

stateless_handlers!(
    ValidatePostLogoutRedirectUriParameter,
    HandleLogoutRequest,
    ApplyLogoutResponse,
);

/// Default logout endpoint handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Extract = ExtractRequestContext<Logout>;
    type Handle = HandleRequestContext<Logout>;

    Ok(vec![
        singleton::<Extract, RejectDisabledEndpoint>(RejectDisabledEndpoint::ORDER).build()?.into(),
        singleton::<Extract, ExtractGetOrPostRequest>(ExtractGetOrPostRequest::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidatePostLogoutRedirectUriParameter>(
            ValidatePostLogoutRedirectUriParameter::ORDER,
        )
        .build()?
        .into(),
        singleton::<Validate, ValidatePostLogoutRedirectUriRegistration>(
            ValidatePostLogoutRedirectUriRegistration::ORDER,
        )
        .add_filter(RequireDegradedModeDisabled)
        .build()?
        .into(),
        singleton::<Handle, EnablePassthroughMode>(EnablePassthroughMode::ORDER)
            .add_filter(RequireEndpointPassthroughEnabled::<Logout>::default())
            .build()?
            .into(),
        singleton::<Handle, HandleLogoutRequest>(HandleLogoutRequest::ORDER).build()?.into(),
        singleton::<ApplyResponseContext<Logout>, ApplyLogoutResponse>(ApplyLogoutResponse::ORDER)
            .build()?
            .into(),
    ])
}
