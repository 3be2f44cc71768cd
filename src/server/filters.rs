// ABOUTME: Built-in filters gating the default server handlers
// ABOUTME: Option-driven filters work on any server context; sign-in filters on ProcessSigninContext
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::marker::PhantomData;

use async_trait::async_trait;
use oidc_forge_core::errors::ForgeResult;
use oidc_forge_core::models::TokenType;

use super::endpoints::Endpoint;
use super::events::{ProcessAuthenticationContext, ProcessSigninContext};
use crate::config::ServerOptions;
use crate::formats::TokenFormatKind;
use crate::pipeline::{EventContext, Filter};

/// Active when the endpoint `E` is enabled
pub struct RequireEndpointEnabled<E>(PhantomData<fn() -> E>);

impl<E> Default for RequireEndpointEnabled<E> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<E, C> Filter<C> for RequireEndpointEnabled<E>
where
    E: Endpoint,
    C: EventContext<Options = ServerOptions>,
{
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok(context.options().is_endpoint_enabled(E::KIND))
    }
}

/// Active when the transaction belongs to the endpoint `E`
///
/// Lets handlers of shared stages, such as authentication, opt into one endpoint.
pub struct RequireEndpoint<E>(PhantomData<fn() -> E>);

impl<E> Default for RequireEndpoint<E> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<E, C> Filter<C> for RequireEndpoint<E>
where
    E: Endpoint,
    C: EventContext<Options = ServerOptions>,
{
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok(context.transaction().endpoint == E::KIND)
    }
}

/// Active when the handle stage of `E` is delegated to the host
pub struct RequireEndpointPassthroughEnabled<E>(PhantomData<fn() -> E>);

impl<E> Default for RequireEndpointPassthroughEnabled<E> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<E, C> Filter<C> for RequireEndpointPassthroughEnabled<E>
where
    E: Endpoint,
    C: EventContext<Options = ServerOptions>,
{
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok(context.options().is_passthrough_enabled(E::KIND))
    }
}

/// Define a filter reading a flag of the server options
macro_rules! option_filter {
    ($(#[$doc:meta])* $name:ident, |$options:ident| $predicate:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        #[async_trait]
        impl<C: EventContext<Options = ServerOptions>> Filter<C> for $name {
            async fn is_active(&self, context: &C) -> ForgeResult<bool> {
                let $options = context.options();
                Ok($predicate)
            }
        }
    };
}

option_filter!(
    /// Active unless token storage is disabled
    RequireTokenStorageEnabled,
    |options| !options.disable_token_storage
);

option_filter!(
    /// Active unless degraded mode is enabled
    RequireDegradedModeDisabled,
    |options| !options.degraded_mode
);

option_filter!(
    /// Active when permission checks are enforced
    RequirePermissionsEnabled,
    |options| !options.ignore_permissions
);

option_filter!(
    /// Active when new tokens are sealed
    RequireSealedFormatPreferred,
    |options| options.preferred_format == TokenFormatKind::Sealed
);

option_filter!(
    /// Active when new tokens are JWTs
    RequireJwtFormatPreferred,
    |options| options.preferred_format == TokenFormatKind::Jwt
);

/// Active when the request carries a `client_id`
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireClientIdParameter;

#[async_trait]
impl<C: EventContext<Options = ServerOptions>> Filter<C> for RequireClientIdParameter {
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok(context.request().client_id().is_some())
    }
}

/// Active when the transaction carries a principal
#[derive(Debug, Clone, Copy, Default)]
pub struct RequirePrincipal;

#[async_trait]
impl<C: EventContext<Options = ServerOptions>> Filter<C> for RequirePrincipal {
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok(context.transaction().principal.is_some())
    }
}

/// Active when the decoded grant is an authorization code
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAuthorizationCodeGrant;

#[async_trait]
impl Filter<ProcessAuthenticationContext> for RequireAuthorizationCodeGrant {
    async fn is_active(&self, context: &ProcessAuthenticationContext) -> ForgeResult<bool> {
        Ok(context.token_type == Some(TokenType::AuthorizationCode))
    }
}

/// Active while a token is present but no principal was decoded from it
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireUndecodedToken;

#[async_trait]
impl Filter<ProcessAuthenticationContext> for RequireUndecodedToken {
    async fn is_active(&self, context: &ProcessAuthenticationContext) -> ForgeResult<bool> {
        Ok(context.token.is_some() && context.transaction().principal.is_none())
    }
}

/// Define a sign-in filter testing whether a token type is issued
macro_rules! inclusion_filter {
    ($(#[$doc:meta])* $name:ident, $token_type:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        #[async_trait]
        impl Filter<ProcessSigninContext> for $name {
            async fn is_active(&self, context: &ProcessSigninContext) -> ForgeResult<bool> {
                Ok(context.includes($token_type))
            }
        }
    };
}

inclusion_filter!(
    /// Active when an access token is issued
    RequireAccessTokenIncluded,
    TokenType::AccessToken
);

inclusion_filter!(
    /// Active when a refresh token is issued
    RequireRefreshTokenIncluded,
    TokenType::RefreshToken
);

inclusion_filter!(
    /// Active when an authorization code is issued
    RequireAuthorizationCodeIncluded,
    TokenType::AuthorizationCode
);

inclusion_filter!(
    /// Active when a device code is issued
    RequireDeviceCodeIncluded,
    TokenType::DeviceCode
);

inclusion_filter!(
    /// Active when a user code is issued
    RequireUserCodeIncluded,
    TokenType::UserCode
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Principal;
    use crate::protocol::EndpointKind;
    use crate::server::endpoints::{Token, TokenDemand, Userinfo};
    use oidc_forge_core::errors::ProtocolErrorCode;
    use crate::server::events::ServerTransaction;
    use std::sync::Arc;

    fn signin(options: ServerOptions) -> ProcessSigninContext {
        let transaction = ServerTransaction::new(Arc::new(options), EndpointKind::Token);
        ProcessSigninContext::new(transaction, Principal::for_subject("alice"))
    }

    #[tokio::test]
    async fn test_option_filters() {
        let context = signin(ServerOptions::default().with_token_storage_disabled());
        assert!(!RequireTokenStorageEnabled.is_active(&context).await.unwrap());
        assert!(RequireDegradedModeDisabled.is_active(&context).await.unwrap());
        assert!(RequireSealedFormatPreferred.is_active(&context).await.unwrap());
        assert!(!RequireJwtFormatPreferred.is_active(&context).await.unwrap());
    }

    #[tokio::test]
    async fn test_endpoint_filters() {
        let options = ServerOptions::default()
            .without_endpoint(EndpointKind::Userinfo)
            .with_passthrough(EndpointKind::Token);
        let context = signin(options);

        assert!(RequireEndpointEnabled::<Token>::default().is_active(&context).await.unwrap());
        assert!(!RequireEndpointEnabled::<Userinfo>::default().is_active(&context).await.unwrap());
        assert!(RequireEndpointPassthroughEnabled::<Token>::default()
            .is_active(&context)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_endpoint_membership_filter() {
        let token = signin(ServerOptions::default());
        assert!(RequireEndpoint::<Token>::default().is_active(&token).await.unwrap());
        assert!(!RequireEndpoint::<Userinfo>::default().is_active(&token).await.unwrap());
        assert!(Filter::<ProcessSigninContext>::name(&RequireEndpoint::<Token>::default())
            .starts_with("RequireEndpoint<"));
    }

    #[tokio::test]
    async fn test_undecoded_token_filter() {
        let transaction =
            ServerTransaction::new(Arc::new(ServerOptions::default()), EndpointKind::Userinfo);
        let demand = TokenDemand {
            parameter: "access_token",
            token: Some("opaque".to_owned()),
            candidates: vec![TokenType::AccessToken],
            required: true,
            error: ProtocolErrorCode::InvalidToken,
        };
        let mut context = ProcessAuthenticationContext::new(transaction, demand);
        assert!(RequireUndecodedToken.is_active(&context).await.unwrap());

        context.transaction_mut().principal = Some(Principal::for_subject("alice"));
        assert!(!RequireUndecodedToken.is_active(&context).await.unwrap());

        context.transaction_mut().principal = None;
        context.token = None;
        assert!(!RequireUndecodedToken.is_active(&context).await.unwrap());
    }

    #[tokio::test]
    async fn test_inclusion_filters() {
        let mut context = signin(ServerOptions::default());
        assert!(!RequireAccessTokenIncluded.is_active(&context).await.unwrap());
        context.include(TokenType::AccessToken);
        assert!(RequireAccessTokenIncluded.is_active(&context).await.unwrap());
        assert!(!RequireRefreshTokenIncluded.is_active(&context).await.unwrap());
    }
}
