// ABOUTME: Authorization endpoint handlers: request validation, redirect URI checks and PKCE
// ABOUTME: Responses are redirected to the validated redirect URI, errors included
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use async_trait::async_trait;
use oidc_forge_core::constants::{code_challenge_methods, properties, response_types};
use oidc_forge_core::errors::{ForgeResult, OAuthError, ProtocolErrorCode};
use oidc_forge_core::models::application::REQUIREMENT_PKCE;
use tracing::{debug, warn};
use url::Url;

use super::client::{
    self, ValidateClient, ValidateClientIdParameter, ValidateEndpointPermissions,
    ValidateGrantTypePermissions, ValidateScopePermissions, ValidateScopes,
};
use super::common::{
    is_valid_pkce_value, status_for, EnablePassthroughMode, ExtractGetOrPostRequest,
    RejectDisabledEndpoint,
};
use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, Handler};
use crate::protocol::HostResponse;
use crate::server::endpoints::Authorization;
use crate::server::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext, ValidateRequestContext,
};
use crate::server::filters::{
    RequireDegradedModeDisabled, RequireEndpointPassthroughEnabled, RequirePermissionsEnabled,
};
use crate::stateless_handlers;

type Validate = ValidateRequestContext<Authorization>;

/// Parse a redirect target: absolute and without fragment
///
/// # Errors
///
/// Returns an `invalid_request` error naming the parameter
pub fn parse_redirect_target(value: &str, parameter: &str) -> Result<Url, OAuthError> {
    let url = Url::parse(value).map_err(|_| {
        OAuthError::invalid_request(&format!("The '{parameter}' parameter must be an absolute URL."))
    })?;
    if url.fragment().is_some() {
        return Err(OAuthError::invalid_request(&format!(
            "The '{parameter}' parameter must not include a fragment."
        )));
    }
    Ok(url)
}

/// Only the code flow is supported
#[derive(Debug, Default)]
pub struct ValidateResponseTypeParameter;

impl ValidateResponseTypeParameter {
    /// Sort key
    pub const ORDER: i32 = ValidateClientIdParameter::ORDER + 1_000;
}

#[async_trait]
impl Handler<Validate> for ValidateResponseTypeParameter {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        match context.request().response_type() {
            None => context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The mandatory 'response_type' parameter is missing.",
            ),
            Some(response_types::CODE) => {}
            Some(_) => context
                .transaction_mut()
                .reject(OAuthError::unsupported_response_type()),
        }
        Ok(())
    }
}

/// Requires a well-formed `redirect_uri`
///
/// Registration is checked later; in degraded mode the URI is trusted as is.
#[derive(Debug, Default)]
pub struct ValidateRedirectUriParameter;

impl ValidateRedirectUriParameter {
    /// Sort key
    pub const ORDER: i32 = ValidateResponseTypeParameter::ORDER + 1_000;
}

#[async_trait]
impl Handler<Validate> for ValidateRedirectUriParameter {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let Some(value) = context.request().redirect_uri() else {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The mandatory 'redirect_uri' parameter is missing.",
            );
            return Ok(());
        };

        match parse_redirect_target(value, "redirect_uri") {
            Ok(url) if context.options().degraded_mode => {
                context
                    .transaction_mut()
                    .set_property(properties::REDIRECT_URI, url);
            }
            Ok(_) => {}
            Err(error) => context.transaction_mut().reject(error),
        }
        Ok(())
    }
}

/// Checks the shape of the PKCE parameters
#[derive(Debug, Default)]
pub struct ValidateCodeChallengeParameters;

impl ValidateCodeChallengeParameters {
    /// Sort key
    pub const ORDER: i32 = ValidateRedirectUriParameter::ORDER + 1_000;
}

#[async_trait]
impl Handler<Validate> for ValidateCodeChallengeParameters {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let request = context.request();
        let failure = match (request.code_challenge(), request.code_challenge_method()) {
            (None, Some(_)) => Some(
                "The 'code_challenge_method' parameter cannot be used without 'code_challenge'.",
            ),
            (None, None) if context.options().require_pkce => {
                Some("The mandatory 'code_challenge' parameter is missing.")
            }
            (None, None) => None,
            (Some(challenge), _) if !is_valid_pkce_value(challenge) => {
                Some("The specified 'code_challenge' is malformed.")
            }
            (Some(_), Some(method)) if method != code_challenge_methods::S256 => {
                Some("The specified 'code_challenge_method' is not supported.")
            }
            (Some(_), _) => None,
        };

        if let Some(description) = failure {
            context.reject(ProtocolErrorCode::InvalidRequest, description);
        }
        Ok(())
    }
}

/// Requires the redirect URI to be registered for the client
#[derive(Debug, Default)]
pub struct ValidateRedirectUriRegistration;

impl ValidateRedirectUriRegistration {
    /// Sort key
    pub const ORDER: i32 = ValidateClient::ORDER + 500;
}

#[async_trait]
impl Handler<Validate> for ValidateRedirectUriRegistration {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let Some(application) = client::application(context.transaction()) else {
            return Ok(());
        };
        let Some(value) = context.request().redirect_uri() else {
            return Ok(());
        };

        if !application.redirect_uris.iter().any(|uri| uri == value) {
            warn!(
                client_id = %application.client_id,
                redirect_uri = %value,
                "unregistered redirect_uri"
            );
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The specified 'redirect_uri' is not valid for this client application.",
            );
            return Ok(());
        }

        let url = parse_redirect_target(value, "redirect_uri");
        match url {
            Ok(url) => context
                .transaction_mut()
                .set_property(properties::REDIRECT_URI, url),
            Err(error) => context.transaction_mut().reject(error),
        }
        Ok(())
    }
}

/// Requires PKCE for public clients and clients registered with the PKCE requirement
#[derive(Debug, Default)]
pub struct ValidatePkceRequirement;

impl ValidatePkceRequirement {
    /// Sort key
    pub const ORDER: i32 = 35_000;
}

#[async_trait]
impl Handler<Validate> for ValidatePkceRequirement {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let required = client::application(context.transaction())
            .is_some_and(|app| app.is_public() || app.has_requirement(REQUIREMENT_PKCE));
        if required && context.request().code_challenge().is_none() {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The mandatory 'code_challenge' parameter is missing.",
            );
        }
        Ok(())
    }
}

/// Rejects authorization requests nobody handled
///
/// Without passthrough there is no host to authenticate the user, so the
/// request cannot complete.
#[derive(Debug, Default)]
pub struct RejectUnhandledRequest;

impl RejectUnhandledRequest {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<HandleRequestContext<Authorization>> for RejectUnhandledRequest {
    async fn handle(&self, context: &mut HandleRequestContext<Authorization>) -> ForgeResult<()> {
        if context.sign_in.is_none() {
            context.reject(
                ProtocolErrorCode::AccessDenied,
                "The authorization request was not handled by the host application.",
            );
        }
        Ok(())
    }
}

/// Redirects the response to the validated redirect URI, JSON otherwise
#[derive(Debug, Default)]
pub struct ApplyAuthorizationResponse;

impl ApplyAuthorizationResponse {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<ApplyResponseContext<Authorization>> for ApplyAuthorizationResponse {
    async fn handle(&self, context: &mut ApplyResponseContext<Authorization>) -> ForgeResult<()> {
        let transaction = context.transaction();
        let response = match transaction.property::<Url>(properties::REDIRECT_URI) {
            Some(target) => {
                debug!(transaction = %transaction.id(), "redirecting authorization response");
                HostResponse::redirect(target, &transaction.response.to_query_pairs())
            }
            None => HostResponse::json(status_for(context.error.as_ref()), transaction.response.to_json()),
        };
        context.response = Some(response);
        Ok(())
    }
}

stateless_handlers!(
    ValidateResponseTypeParameter,
    ValidateRedirectUriParameter,
    ValidateCodeChallengeParameters,
    ValidateRedirectUriRegistration,
    ValidatePkceRequirement,
    RejectUnhandledRequest,
    ApplyAuthorizationResponse,
);

/// Default authorization endpoint handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Extract = ExtractRequestContext<Authorization>;
    type Handle = HandleRequestContext<Authorization>;

    Ok(vec![
        singleton::<Extract, RejectDisabledEndpoint>(RejectDisabledEndpoint::ORDER).build()?.into(),
        singleton::<Extract, ExtractGetOrPostRequest>(ExtractGetOrPostRequest::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateClientIdParameter>(ValidateClientIdParameter::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateResponseTypeParameter>(ValidateResponseTypeParameter::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateRedirectUriParameter>(ValidateRedirectUriParameter::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateCodeChallengeParameters>(
            ValidateCodeChallengeParameters::ORDER,
        )
        .build()?
        .into(),
        singleton::<Validate, ValidateClient>(ValidateClient::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .build()?
            .into(),
        singleton::<Validate, ValidateRedirectUriRegistration>(
            ValidateRedirectUriRegistration::ORDER,
        )
        .add_filter(RequireDegradedModeDisabled)
        .build()?
        .into(),
        singleton::<Validate, ValidateEndpointPermissions>(ValidateEndpointPermissions::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .add_filter(RequirePermissionsEnabled)
            .build()?
            .into(),
        singleton::<Validate, ValidateGrantTypePermissions>(ValidateGrantTypePermissions::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .add_filter(RequirePermissionsEnabled)
            .build()?
            .into(),
        singleton::<Validate, ValidateScopePermissions>(ValidateScopePermissions::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .add_filter(RequirePermissionsEnabled)
            .build()?
            .into(),
        singleton::<Validate, ValidatePkceRequirement>(ValidatePkceRequirement::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .build()?
            .into(),
        singleton::<Validate, ValidateScopes>(ValidateScopes::ORDER).build()?.into(),
        singleton::<Handle, EnablePassthroughMode>(EnablePassthroughMode::ORDER)
            .add_filter(RequireEndpointPassthroughEnabled::<Authorization>::default())
            .build()?
            .into(),
        singleton::<Handle, RejectUnhandledRequest>(RejectUnhandledRequest::ORDER)
            .build()?
            .into(),
        singleton::<ApplyResponseContext<Authorization>, ApplyAuthorizationResponse>(
            ApplyAuthorizationResponse::ORDER,
        )
        .build()?
        .into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_targets_must_be_absolute_without_fragment() {
        assert!(parse_redirect_target("https://app.example/cb", "redirect_uri").is_ok());

        let relative = parse_redirect_target("/cb", "redirect_uri").unwrap_err();
        assert_eq!(relative.error, ProtocolErrorCode::InvalidRequest);

        let fragment = parse_redirect_target("https://app.example/cb#x", "redirect_uri").unwrap_err();
        assert!(fragment
            .error_description
            .unwrap_or_default()
            .contains("fragment"));
    }
}
