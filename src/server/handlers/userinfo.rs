// ABOUTME: Userinfo endpoint handlers: bearer token extraction and scope-driven claims
// ABOUTME: Rejections carry a WWW-Authenticate challenge as RFC 6750 requires
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use async_trait::async_trait;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};
use oidc_forge_core::constants::{claims, parameters, scopes};
use oidc_forge_core::errors::{ForgeResult, OAuthError, ProtocolErrorCode};
use serde_json::Value;

use super::common::{
    status_for, EnablePassthroughMode, ExtractGetOrPostRequest, RejectDisabledEndpoint,
};
use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, Handler};
use crate::protocol::HostResponse;
use crate::server::endpoints::Userinfo;
use crate::server::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext, ValidateRequestContext,
};
use crate::server::filters::RequireEndpointPassthroughEnabled;
use crate::stateless_handlers;

/// Render the `WWW-Authenticate` challenge for a rejection
#[must_use]
pub fn bearer_challenge(error: &OAuthError) -> String {
    let mut challenge = format!("Bearer error=\"{}\"", error.error);
    if let Some(description) = error.error_description.as_deref() {
        challenge.push_str(&format!(
            ", error_description=\"{}\"",
            description.replace('"', "'")
        ));
    }
    challenge
}

/// Moves a bearer token from the `Authorization` header into `access_token`
#[derive(Debug, Default)]
pub struct ExtractBearerAccessToken;

impl ExtractBearerAccessToken {
    /// Sort key
    pub const ORDER: i32 = ExtractGetOrPostRequest::ORDER + 1_000;
}

#[async_trait]
impl Handler<ExtractRequestContext<Userinfo>> for ExtractBearerAccessToken {
    async fn handle(&self, context: &mut ExtractRequestContext<Userinfo>) -> ForgeResult<()> {
        let Some(token) = context
            .transaction()
            .host_request
            .as_ref()
            .and_then(|host| host.bearer_token())
            .map(str::to_owned)
        else {
            return Ok(());
        };

        if context.request().access_token().is_some() {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The access token cannot be sent both as a header and as a parameter.",
            );
            return Ok(());
        }
        context
            .transaction_mut()
            .request
            .set(parameters::ACCESS_TOKEN, token);
        Ok(())
    }
}

/// Requires an access token
#[derive(Debug, Default)]
pub struct ValidateAccessTokenParameter;

impl ValidateAccessTokenParameter {
    /// Sort key
    pub const ORDER: i32 = 10_000;
}

#[async_trait]
impl Handler<ValidateRequestContext<Userinfo>> for ValidateAccessTokenParameter {
    async fn handle(&self, context: &mut ValidateRequestContext<Userinfo>) -> ForgeResult<()> {
        if context.request().access_token().is_none() {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The mandatory 'access_token' parameter is missing.",
            );
        }
        Ok(())
    }
}

/// Returns the claims the granted scopes allow
#[derive(Debug, Default)]
pub struct HandleUserinfoRequest;

impl HandleUserinfoRequest {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<HandleRequestContext<Userinfo>> for HandleUserinfoRequest {
    async fn handle(&self, context: &mut HandleRequestContext<Userinfo>) -> ForgeResult<()> {
        let Some(principal) = context.transaction().principal.as_ref() else {
            context.reject(
                ProtocolErrorCode::InvalidToken,
                "The specified access token is invalid.",
            );
            return Ok(());
        };

        let mut released: Vec<(&str, Value)> = Vec::new();
        if let Some(subject) = principal.subject() {
            released.push((claims::SUBJECT, subject.into()));
        }
        let mut allowed: Vec<&str> = Vec::new();
        if principal.has_scope(scopes::PROFILE) {
            allowed.extend([claims::NAME, claims::PREFERRED_USERNAME]);
        }
        if principal.has_scope(scopes::EMAIL) {
            allowed.extend([claims::EMAIL, claims::EMAIL_VERIFIED]);
        }
        for name in allowed {
            if let Some(value) = principal.claim(name) {
                released.push((name, value.clone()));
            }
        }

        let response = context.response_mut();
        for (name, value) in released {
            response.set(name, value);
        }
        Ok(())
    }
}

/// JSON response, with a bearer challenge on authentication failures
#[derive(Debug, Default)]
pub struct ApplyUserinfoResponse;

impl ApplyUserinfoResponse {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<ApplyResponseContext<Userinfo>> for ApplyUserinfoResponse {
    async fn handle(&self, context: &mut ApplyResponseContext<Userinfo>) -> ForgeResult<()> {
        let status = status_for(context.error.as_ref());
        let mut response = HostResponse::json(status, context.transaction().response.to_json());
        if status == StatusCode::UNAUTHORIZED {
            if let Some(value) = context
                .error
                .as_ref()
                .and_then(|error| HeaderValue::from_str(&bearer_challenge(error)).ok())
            {
                response.headers.insert(WWW_AUTHENTICATE, value);
            }
        }
        context.response = Some(response);
        Ok(())
    }
}

stateless_handlers!(
    ExtractBearerAccessToken,
    ValidateAccessTokenParameter,
    HandleUserinfoRequest,
    ApplyUserinfoResponse,
);

/// Default userinfo endpoint handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Extract = ExtractRequestContext<Userinfo>;
    type Handle = HandleRequestContext<Userinfo>;

    Ok(vec![
        singleton::<Extract, RejectDisabledEndpoint>(RejectDisabledEndpoint::ORDER).build()?.into(),
        singleton::<Extract, ExtractGetOrPostRequest>(ExtractGetOrPostRequest::ORDER)
            .build()?
            .into(),
        singleton::<Extract, ExtractBearerAccessToken>(ExtractBearerAccessToken::ORDER)
            .build()?
            .into(),
        singleton::<ValidateRequestContext<Userinfo>, ValidateAccessTokenParameter>(
            ValidateAccessTokenParameter::ORDER,
        )
        .build()?
        .into(),
        singleton::<Handle, EnablePassthroughMode>(EnablePassthroughMode::ORDER)
            .add_filter(RequireEndpointPassthroughEnabled::<Userinfo>::default())
            .build()?
            .into(),
        singleton::<Handle, HandleUserinfoRequest>(HandleUserinfoRequest::ORDER)
            .build()?
            .into(),
        singleton::<ApplyResponseContext<Userinfo>, ApplyUserinfoResponse>(
            ApplyUserinfoResponse::ORDER,
        )
        .build()?
        .into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_challenge_quotes_description() {
        let error = OAuthError::invalid_token("The \"token\" expired.");
        assert_eq!(
            bearer_challenge(&error),
            "Bearer error=\"invalid_token\", error_description=\"The 'token' expired.\""
        );
    }
}
