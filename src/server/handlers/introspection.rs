// ABOUTME: Introspection endpoint handlers (RFC 7662)
// ABOUTME: Unknown, expired or foreign tokens all answer active=false

use async_trait::async_trait;
use oidc_forge_core::constants::claims;
use oidc_forge_core::errors::{ForgeResult, ProtocolErrorCode};
use oidc_forge_core::models::TokenType;
use serde_json::Value;
use tracing::debug;

use super::client::{
    ValidateClient, ValidateClientIdParameter, ValidateClientSecret, ValidateEndpointPermissions,
};
use super::common::{
    ApplyJsonResponse, ExtractBasicCredentials, ExtractGetOrPostRequest, RejectDisabledEndpoint,
};
use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, Handler};
use crate::principal::Principal;
use crate::server::endpoints::{Endpoint, Introspection};
use crate::server::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext, ValidateRequestContext,
};
use crate::server::filters::{RequireDegradedModeDisabled, RequirePermissionsEnabled};
use crate::stateless_handlers;

/// Requires the `token` parameter
#[derive(Debug, Default)]
pub struct ValidateTokenParameter;

impl ValidateTokenParameter {
    /// Sort key
    pub const ORDER: i32 = ValidateClientIdParameter::ORDER + 500;
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateTokenParameter {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        if context.request().token().is_none() {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The mandatory 'token' parameter is missing.",
            );
        }
        Ok(())
    }
}

/// Whether the caller may learn about the token
fn is_visible_to(principal: &Principal, client_id: Option<&str>) -> bool {
    let presenters = principal.presenters();
    if presenters.is_empty() {
        return true;
    }
    client_id.is_some_and(|client_id| {
        presenters.iter().any(|presenter| presenter == client_id)
            || principal.audiences().iter().any(|audience| audience == client_id)
    })
}

/// Describes the authenticated token
#[derive(Debug, Default)]
pub struct HandleIntrospectionRequest;

impl HandleIntrospectionRequest {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<HandleRequestContext<Introspection>> for HandleIntrospectionRequest {
    async fn handle(&self, context: &mut HandleRequestContext<Introspection>) -> ForgeResult<()> {
        let transaction = context.transaction();
        let client_id = transaction.request.client_id();
        let principal = transaction
            .principal
            .as_ref()
            .filter(|principal| is_visible_to(principal, client_id));

        let Some(principal) = principal else {
            debug!(transaction = %transaction.id(), "token reported inactive");
            context.response_mut().set(claims::ACTIVE, false);
            return Ok(());
        };

        let mut fields: Vec<(&str, Value)> = vec![(claims::ACTIVE, Value::Bool(true))];
        if let Some(subject) = principal.subject() {
            fields.push((claims::SUBJECT, subject.into()));
        }
        let scopes = principal.scopes();
        if !scopes.is_empty() {
            fields.push((claims::SCOPE, scopes.join(" ").into()));
        }
        if let Some(presenter) = principal.presenters().into_iter().next() {
            fields.push((claims::CLIENT_ID, presenter.into()));
        }
        if let Some(expiration) = principal.expiration_date() {
            fields.push((claims::EXPIRES_AT, expiration.timestamp().into()));
        }
        if let Some(creation) = principal.creation_date() {
            fields.push((claims::ISSUED_AT, creation.timestamp().into()));
        }
        if let Some(issuer) = transaction.options().issuer.as_deref() {
            fields.push((claims::ISSUER, issuer.into()));
        }
        let audiences = principal.audiences();
        match audiences.len() {
            0 => {}
            1 => fields.push((claims::AUDIENCE, audiences[0].clone().into())),
            _ => fields.push((claims::AUDIENCE, audiences.into())),
        }
        if let Some(jti) = principal.claim_str(claims::JWT_ID) {
            fields.push((claims::JWT_ID, jti.into()));
        }
        let token_type = principal.token_type();
        if token_type == Some(TokenType::AccessToken) {
            fields.push((claims::TOKEN_TYPE, "Bearer".into()));
        }
        if let Some(token_type) = token_type {
            fields.push(("token_usage", token_type.as_str().into()));
        }

        let response = context.response_mut();
        for (name, value) in fields {
            response.set(name, value);
        }
        Ok(())
    }
}

stateless_handlers!(ValidateTokenParameter, HandleIntrospectionRequest);

/// Default introspection endpoint handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Extract = ExtractRequestContext<Introspection>;
    type Validate = ValidateRequestContext<Introspection>;

    Ok(vec![
        singleton::<Extract, RejectDisabledEndpoint>(RejectDisabledEndpoint::ORDER).build()?.into(),
        singleton::<Extract, ExtractGetOrPostRequest>(ExtractGetOrPostRequest::ORDER)
            .build()?
            .into(),
        singleton::<Extract, ExtractBasicCredentials>(ExtractBasicCredentials::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateClientIdParameter>(ValidateClientIdParameter::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateTokenParameter>(ValidateTokenParameter::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateClient>(ValidateClient::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .build()?
            .into(),
        singleton::<Validate, ValidateClientSecret>(ValidateClientSecret::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .build()?
            .into(),
        singleton::<Validate, ValidateEndpointPermissions>(ValidateEndpointPermissions::ORDER)
            .add_filter(RequireDegradedModeDisabled)
            .add_filter(RequirePermissionsEnabled)
            .build()?
            .into(),
        singleton::<HandleRequestContext<Introspection>, HandleIntrospectionRequest>(
            HandleIntrospectionRequest::ORDER,
        )
        .build()?
        .into(),
        singleton::<ApplyResponseContext<Introspection>, ApplyJsonResponse>(ApplyJsonResponse::ORDER)
            .build()?
            .into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_follows_presenters_and_audiences() {
        let open = Principal::for_subject("alice");
        assert!(is_visible_to(&open, None));

        let mut bound = Principal::for_subject("alice");
        bound.set_presenters(["console"]).set_audiences(["api"]);
        assert!(is_visible_to(&bound, Some("console")));
        assert!(is_visible_to(&bound, Some("api")));
        assert!(!is_visible_to(&bound, Some("other")));
        assert!(!is_visible_to(&bound, None));
    }
}
