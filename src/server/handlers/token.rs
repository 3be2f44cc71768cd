// ABOUTME: Token endpoint handlers: grant validation, code and refresh token checks, issuance
// ABOUTME: Principal-bound checks run in the authentication stage once the grant is decoded
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use oidc_forge_core::constants::{claims, grant_types};
use oidc_forge_core::errors::{ForgeResult, OAuthError, ProtocolErrorCode};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::authentication::ValidateAuthorizationEntry;
use super::client::{
    self, ValidateClient, ValidateClientIdParameter, ValidateClientSecret,
    ValidateEndpointPermissions, ValidateGrantTypePermissions, ValidateScopePermissions,
    ValidateScopes,
};
use super::common::{
    is_valid_pkce_value, ApplyJsonResponse, EnablePassthroughMode, ExtractBasicCredentials,
    ExtractPostRequest, RejectDisabledEndpoint,
};
use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, Handler};
use crate::principal::Principal;
use crate::server::endpoints::Token;
use crate::server::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext,
    ProcessAuthenticationContext, ValidateRequestContext,
};
use crate::server::filters::{
    RequireAuthorizationCodeGrant, RequireDegradedModeDisabled, RequireEndpoint,
    RequireEndpointPassthroughEnabled, RequirePermissionsEnabled, RequirePrincipal,
};
use crate::stateless_handlers;

type Validate = ValidateRequestContext<Token>;

const SUPPORTED_GRANTS: [&str; 4] = [
    grant_types::AUTHORIZATION_CODE,
    grant_types::CLIENT_CREDENTIALS,
    grant_types::REFRESH_TOKEN,
    grant_types::DEVICE_CODE,
];

/// Claims describing the token a principal was read from
///
/// They are removed before the principal is signed in again so the new
/// tokens get fresh metadata.
pub const TOKEN_CLAIMS: [&str; 9] = [
    claims::private::TOKEN_USAGE,
    claims::private::TOKEN_ID,
    claims::private::CODE_CHALLENGE,
    claims::private::CODE_CHALLENGE_METHOD,
    claims::private::REDIRECT_URI,
    claims::private::DEVICE_CODE_ID,
    claims::EXPIRES_AT,
    claims::ISSUED_AT,
    claims::JWT_ID,
];

/// Remove token metadata from a principal
pub fn strip_token_claims(principal: &mut Principal) {
    for claim in TOKEN_CLAIMS {
        principal.remove_claim(claim);
    }
}

/// Rejects missing or unsupported grant types
#[derive(Debug, Default)]
pub struct ValidateGrantTypeParameter;

impl ValidateGrantTypeParameter {
    /// Sort key
    pub const ORDER: i32 = ValidateClientIdParameter::ORDER + 1_000;
}

#[async_trait]
impl Handler<Validate> for ValidateGrantTypeParameter {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        match context.request().grant_type() {
            None => context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The mandatory 'grant_type' parameter is missing.",
            ),
            Some(grant) if !SUPPORTED_GRANTS.contains(&grant) => {
                debug!(grant_type = %grant, "unsupported grant type");
                context.transaction_mut().reject(OAuthError::unsupported_grant_type());
            }
            Some(_) => {}
        }
        Ok(())
    }
}

/// Requires the parameters each grant depends on
#[derive(Debug, Default)]
pub struct ValidateGrantParameters;

impl ValidateGrantParameters {
    /// Sort key
    pub const ORDER: i32 = ValidateGrantTypeParameter::ORDER + 1_000;
}

#[async_trait]
impl Handler<Validate> for ValidateGrantParameters {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let request = context.request();
        let missing = match request.grant_type() {
            Some(grant_types::AUTHORIZATION_CODE) if request.code().is_none() => Some("code"),
            Some(grant_types::REFRESH_TOKEN) if request.refresh_token().is_none() => {
                Some("refresh_token")
            }
            Some(grant_types::DEVICE_CODE) if request.device_code().is_none() => Some("device_code"),
            _ => None,
        };
        if let Some(parameter) = missing {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                format!("The mandatory '{parameter}' parameter is missing."),
            );
            return Ok(());
        }

        if request
            .code_verifier()
            .is_some_and(|verifier| !is_valid_pkce_value(verifier))
        {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The specified 'code_verifier' is malformed.",
            );
        }
        Ok(())
    }
}

/// Rejects the client credentials grant for public clients
#[derive(Debug, Default)]
pub struct ValidateClientType;

impl ValidateClientType {
    /// Sort key
    pub const ORDER: i32 = ValidateClientSecret::ORDER + 500;
}

#[async_trait]
impl Handler<Validate> for ValidateClientType {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        let public = client::application(context.transaction()).is_some_and(|app| app.is_public());
        if public && context.request().grant_type() == Some(grant_types::CLIENT_CREDENTIALS) {
            context.reject(
                ProtocolErrorCode::UnauthorizedClient,
                "Public clients are not allowed to use the client credentials grant.",
            );
        }
        Ok(())
    }
}

/// Ensures the grant was issued to the client redeeming it
#[derive(Debug, Default)]
pub struct ValidatePresenters;

impl ValidatePresenters {
    /// Sort key
    pub const ORDER: i32 = ValidateAuthorizationEntry::ORDER + 1_000;
}

#[async_trait]
impl Handler<ProcessAuthenticationContext> for ValidatePresenters {
    async fn handle(&self, context: &mut ProcessAuthenticationContext) -> ForgeResult<()> {
        let Some(principal) = context.transaction().principal.as_ref() else {
            return Ok(());
        };

        let presenters = principal.presenters();
        let client_id = context.request().client_id();
        let allowed = presenters.is_empty()
            || client_id.is_some_and(|client_id| presenters.iter().any(|p| p == client_id));
        if !allowed {
            context.transaction_mut().reject(OAuthError::invalid_grant(
                "The specified token cannot be used by this client application.",
            ));
        }
        Ok(())
    }
}

/// Requires the `redirect_uri` an authorization code was issued for
#[derive(Debug, Default)]
pub struct ValidateRedirectUri;

impl ValidateRedirectUri {
    /// Sort key
    pub const ORDER: i32 = ValidatePresenters::ORDER + 1_000;
}

#[async_trait]
impl Handler<ProcessAuthenticationContext> for ValidateRedirectUri {
    async fn handle(&self, context: &mut ProcessAuthenticationContext) -> ForgeResult<()> {
        let Some(expected) = context
            .transaction()
            .principal
            .as_ref()
            .and_then(|principal| principal.claim_str(claims::private::REDIRECT_URI))
        else {
            return Ok(());
        };

        let error = match context.request().redirect_uri() {
            None => Some(OAuthError::invalid_request(
                "The mandatory 'redirect_uri' parameter is missing.",
            )),
            Some(actual) if actual != expected => Some(OAuthError::invalid_grant(
                "The specified 'redirect_uri' does not match the one used to get the code.",
            )),
            Some(_) => None,
        };
        if let Some(error) = error {
            context.transaction_mut().reject(error);
        }
        Ok(())
    }
}

/// Checks the PKCE verifier against the challenge bound to the code
#[derive(Debug, Default)]
pub struct ValidateCodeVerifier;

impl ValidateCodeVerifier {
    /// Sort key
    pub const ORDER: i32 = ValidateRedirectUri::ORDER + 1_000;
}

#[async_trait]
impl Handler<ProcessAuthenticationContext> for ValidateCodeVerifier {
    async fn handle(&self, context: &mut ProcessAuthenticationContext) -> ForgeResult<()> {
        let challenge = context
            .transaction()
            .principal
            .as_ref()
            .and_then(|principal| principal.claim_str(claims::private::CODE_CHALLENGE))
            .map(str::to_owned);
        let verifier = context.request().code_verifier();

        let error = match (challenge, verifier) {
            (None, None) => None,
            (None, Some(_)) => Some(OAuthError::invalid_request(
                "The 'code_verifier' parameter is not valid for this authorization code.",
            )),
            (Some(_), None) => Some(OAuthError::invalid_request(
                "The mandatory 'code_verifier' parameter is missing.",
            )),
            (Some(challenge), Some(verifier)) => {
                let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
                let matches: bool = computed.as_bytes().ct_eq(challenge.as_bytes()).into();
                (!matches).then(|| {
                    OAuthError::invalid_grant("The specified 'code_verifier' is invalid.")
                })
            }
        };
        if let Some(error) = error {
            context.transaction_mut().reject(error);
        }
        Ok(())
    }
}

/// Restricts a redeemed grant to the scopes it was issued with
#[derive(Debug, Default)]
pub struct ValidateRequestedScopes;

impl ValidateRequestedScopes {
    /// Sort key
    pub const ORDER: i32 = ValidateCodeVerifier::ORDER + 1_000;
}

#[async_trait]
impl Handler<ProcessAuthenticationContext> for ValidateRequestedScopes {
    async fn handle(&self, context: &mut ProcessAuthenticationContext) -> ForgeResult<()> {
        let Some(principal) = context.transaction().principal.as_ref() else {
            return Ok(());
        };

        let granted = principal.scopes();
        let extra = context
            .request()
            .scopes()
            .into_iter()
            .find(|scope| !granted.contains(scope));
        if let Some(scope) = extra {
            context.transaction_mut().reject(OAuthError::invalid_scope(&format!(
                "The scope '{scope}' was not granted to the specified token."
            )));
        }
        Ok(())
    }
}

/// Signs in the principal the grant resolves to
#[derive(Debug, Default)]
pub struct HandleTokenRequest;

impl HandleTokenRequest {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<HandleRequestContext<Token>> for HandleTokenRequest {
    async fn handle(&self, context: &mut HandleRequestContext<Token>) -> ForgeResult<()> {
        let request = context.request();
        let requested = request.scopes();
        let client_id = request.client_id().map(str::to_owned);

        let principal = if request.grant_type() == Some(grant_types::CLIENT_CREDENTIALS) {
            let Some(client_id) = client_id else {
                context.reject(
                    ProtocolErrorCode::InvalidRequest,
                    "The mandatory 'client_id' parameter is missing.",
                );
                return Ok(());
            };
            let mut principal = Principal::for_subject(client_id.clone());
            principal.set_scopes(requested).set_presenters([client_id]);
            principal
        } else {
            let refresh = request.grant_type() == Some(grant_types::REFRESH_TOKEN);
            let Some(mut principal) = context.transaction().principal.clone() else {
                context.reject(
                    ProtocolErrorCode::InvalidGrant,
                    "The specified grant could not be resolved.",
                );
                return Ok(());
            };
            strip_token_claims(&mut principal);
            if refresh && !requested.is_empty() {
                principal.set_scopes(requested);
            }
            principal
        };

        context.sign_in = Some(principal);
        Ok(())
    }
}

stateless_handlers!(
    ValidateGrantTypeParameter,
    ValidateGrantParameters,
    ValidateClientType,
    ValidatePresenters,
    ValidateRedirectUri,
    ValidateCodeVerifier,
    ValidateRequestedScopes,
    HandleTokenRequest,
);

/// Default token endpoint handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Extract = ExtractRequestContext<Token>;
    type Authenticate = ProcessAuthenticationContext;

    Ok(vec![
        singleton::<Extract, RejectDisabledEndpoint>(RejectDisabledEndpoint::ORDER).build()?.into(),
        singleton::<Extract, ExtractPostRequest>(ExtractPostRequest::ORDER).build()?.into(),
        singleton::<Extract, ExtractBasicCredentials>(ExtractBasicCredentials::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateClientIdParameter>(ValidateClientIdParameter::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateGrantTypeParameter>(ValidateGrantTypeParameter::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateGrantParameters>(ValidateGrantParameters::ORDER)
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
        singleton::<Validate, ValidateClientType>(ValidateClientType::ORDER)
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
        singleton::<Validate, ValidateScopes>(ValidateScopes::ORDER).build()?.into(),
        singleton::<Authenticate, ValidatePresenters>(ValidatePresenters::ORDER)
            .add_filter(RequireEndpoint::<Token>::default())
            .add_filter(RequirePrincipal)
            .build()?
            .into(),
        singleton::<Authenticate, ValidateRedirectUri>(ValidateRedirectUri::ORDER)
            .add_filter(RequireEndpoint::<Token>::default())
            .add_filter(RequireAuthorizationCodeGrant)
            .build()?
            .into(),
        singleton::<Authenticate, ValidateCodeVerifier>(ValidateCodeVerifier::ORDER)
            .add_filter(RequireEndpoint::<Token>::default())
            .add_filter(RequireAuthorizationCodeGrant)
            .build()?
            .into(),
        singleton::<Authenticate, ValidateRequestedScopes>(ValidateRequestedScopes::ORDER)
            .add_filter(RequireEndpoint::<Token>::default())
            .add_filter(RequirePrincipal)
            .build()?
            .into(),
        singleton::<HandleRequestContext<Token>, EnablePassthroughMode>(EnablePassthroughMode::ORDER)
            .add_filter(RequireEndpointPassthroughEnabled::<Token>::default())
            .build()?
            .into(),
        singleton::<HandleRequestContext<Token>, HandleTokenRequest>(HandleTokenRequest::ORDER)
            .build()?
            .into(),
        singleton::<ApplyResponseContext<Token>, ApplyJsonResponse>(ApplyJsonResponse::ORDER)
            .build()?
            .into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{HandlerRegistrations, HandlerRegistry, HandlerType};
    use oidc_forge_core::constants::{code_challenge_methods, scopes};
    use oidc_forge_core::models::TokenType;

    #[test]
    fn test_strip_token_claims_keeps_identity() {
        let mut principal = Principal::for_subject("alice");
        principal
            .set_token_type(TokenType::AuthorizationCode)
            .set_token_id("tkn-1")
            .set_scopes([scopes::OPENID])
            .set_claim(claims::private::CODE_CHALLENGE, "challenge")
            .set_claim(claims::private::CODE_CHALLENGE_METHOD, code_challenge_methods::S256);

        strip_token_claims(&mut principal);

        assert_eq!(principal.subject(), Some("alice"));
        assert!(principal.has_scope(scopes::OPENID));
        assert_eq!(principal.token_type(), None);
        assert_eq!(principal.token_id(), None);
        assert!(!principal.has_claim(claims::private::CODE_CHALLENGE));
    }

    #[test]
    fn test_supported_grants() {
        assert!(SUPPORTED_GRANTS.contains(&grant_types::DEVICE_CODE));
        assert!(!SUPPORTED_GRANTS.contains(&"password"));
    }

    #[test]
    fn test_grant_checks_are_gated_on_the_token_endpoint() {
        let registry =
            HandlerRegistry::build(default_handlers().unwrap(), HandlerRegistrations::new());
        let filters = |handler: HandlerType| {
            registry
                .descriptors::<ProcessAuthenticationContext>()
                .into_iter()
                .find(|descriptor| descriptor.handler_type() == handler)
                .map(|descriptor| descriptor.filter_names())
                .unwrap()
        };

        for handler in [
            HandlerType::of::<ValidatePresenters>(),
            HandlerType::of::<ValidateRedirectUri>(),
            HandlerType::of::<ValidateCodeVerifier>(),
            HandlerType::of::<ValidateRequestedScopes>(),
        ] {
            assert!(
                filters(handler).iter().any(|name| name.starts_with("RequireEndpoint<")),
                "{} runs outside the token endpoint",
                handler.short_name()
            );
        }
        assert!(filters(HandlerType::of::<ValidateCodeVerifier>())
            .contains(&"RequireAuthorizationCodeGrant"));
    }
}
