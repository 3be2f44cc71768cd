// ABOUTME: Revocation endpoint handlers (RFC 7009)
// ABOUTME: Marks the stored entry of the presented token as revoked
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::sync::Arc;

use async_trait::async_trait;
use oidc_forge_core::constants::properties;
use oidc_forge_core::errors::{ForgeResult, ProtocolErrorCode};
use oidc_forge_core::models::{Token, TokenStatus};
use tracing::info;

use super::client::{
    ValidateClient, ValidateClientIdParameter, ValidateClientSecret, ValidateEndpointPermissions,
};
use super::common::{
    ApplyJsonResponse, ExtractBasicCredentials, ExtractPostRequest, RejectDisabledEndpoint,
};
use super::introspection::ValidateTokenParameter;
use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, FromServices, Handler, ServiceProvider};
use crate::server::endpoints::Revocation;
use crate::server::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext, ValidateRequestContext,
};
use crate::server::filters::{
    RequireDegradedModeDisabled, RequirePermissionsEnabled, RequirePrincipal,
    RequireTokenStorageEnabled,
};
use crate::stores::StoreResolver;

type Handle = HandleRequestContext<Revocation>;

/// Revokes the authenticated token
///
/// Unknown tokens are accepted silently, as RFC 7009 requires.
pub struct RevokeToken {
    resolver: Arc<StoreResolver>,
}

impl RevokeToken {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

impl FromServices for RevokeToken {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Handle> for RevokeToken {
    async fn handle(&self, context: &mut Handle) -> ForgeResult<()> {
        let transaction = context.transaction();
        let Some(principal) = transaction.principal.as_ref() else {
            return Ok(());
        };

        let presenters = principal.presenters();
        let authorized = presenters.is_empty()
            || transaction
                .request
                .client_id()
                .is_some_and(|client_id| presenters.iter().any(|p| p == client_id));
        if !authorized {
            context.reject(
                ProtocolErrorCode::UnauthorizedClient,
                "The client application is not allowed to revoke the specified token.",
            );
            return Ok(());
        }

        let token_id = principal.token_id().map(str::to_owned);
        let store = self.resolver.get::<Token>()?;
        let entry = match transaction.property::<Token>(properties::TOKEN_ENTRY) {
            Some(entry) => Some(entry.clone()),
            None => match token_id {
                Some(id) => store.find_by_id(&id).await?,
                None => None,
            },
        };

        if let Some(mut entry) = entry.filter(|entry| entry.status != TokenStatus::Revoked) {
            entry.status = TokenStatus::Revoked;
            let entry = store.update(entry).await?;
            info!(
                token_id = entry.id.as_deref().unwrap_or_default(),
                token_type = %entry.token_type,
                "token revoked"
            );
        }
        Ok(())
    }
}

/// Default revocation endpoint handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Extract = ExtractRequestContext<Revocation>;
    type Validate = ValidateRequestContext<Revocation>;

    Ok(vec![
        singleton::<Extract, RejectDisabledEndpoint>(RejectDisabledEndpoint::ORDER).build()?.into(),
        singleton::<Extract, ExtractPostRequest>(ExtractPostRequest::ORDER).build()?.into(),
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
        singleton::<Handle, RevokeToken>(RevokeToken::ORDER)
            .add_filter(RequireTokenStorageEnabled)
            .add_filter(RequirePrincipal)
            .build()?
            .into(),
        singleton::<ApplyResponseContext<Revocation>, ApplyJsonResponse>(ApplyJsonResponse::ORDER)
            .build()?
            .into(),
    ])
}
