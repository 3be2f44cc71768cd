// ABOUTME: Device authorization endpoint handlers (RFC 8628)
// ABOUTME: Issues a device code and a user code for an anonymous principal awaiting approval
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use async_trait::async_trait;
use oidc_forge_core::errors::{ForgeResult, ProtocolErrorCode};
use tracing::debug;

use super::client::{
    ValidateClient, ValidateClientIdParameter, ValidateClientSecret, ValidateEndpointPermissions,
    ValidateGrantTypePermissions, ValidateScopePermissions, ValidateScopes,
};
use super::common::{
    ApplyJsonResponse, ExtractBasicCredentials, ExtractPostRequest, RejectDisabledEndpoint,
};
use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, Handler};
use crate::principal::Principal;
use crate::server::endpoints::Device;
use crate::server::events::{
    ApplyResponseContext, ExtractRequestContext, HandleRequestContext, ValidateRequestContext,
};
use crate::server::filters::{RequireDegradedModeDisabled, RequirePermissionsEnabled};
use crate::stateless_handlers;

type Validate = ValidateRequestContext<Device>;

/// The device flow tracks approval in the token store
#[derive(Debug, Default)]
pub struct ValidateDeviceFlowSupport;

impl ValidateDeviceFlowSupport {
    /// Sort key
    pub const ORDER: i32 = ValidateClientIdParameter::ORDER - 1_000;
}

#[async_trait]
impl Handler<Validate> for ValidateDeviceFlowSupport {
    async fn handle(&self, context: &mut Validate) -> ForgeResult<()> {
        if context.options().disable_token_storage {
            context.reject(
                ProtocolErrorCode::ServerError,
                "The device flow cannot be used when token storage is disabled.",
            );
        }
        Ok(())
    }
}

/// Signs in an anonymous principal carrying the requested scopes
#[derive(Debug, Default)]
pub struct HandleDeviceRequest;

impl HandleDeviceRequest {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<HandleRequestContext<Device>> for HandleDeviceRequest {
    async fn handle(&self, context: &mut HandleRequestContext<Device>) -> ForgeResult<()> {
        let request = context.request();
        let mut principal = Principal::new();
        principal.set_scopes(request.scopes());
        if let Some(client_id) = request.client_id() {
            principal.set_presenters([client_id]);
        }
        debug!(transaction = %context.transaction().id(), "device authorization requested");
        context.sign_in = Some(principal);
        Ok(())
    }
}

stateless_handlers!(ValidateDeviceFlowSupport, HandleDeviceRequest);

/// Default device endpoint handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Extract = ExtractRequestContext<Device>;

    Ok(vec![
        singleton::<Extract, RejectDisabledEndpoint>(RejectDisabledEndpoint::ORDER).build()?.into(),
        singleton::<Extract, ExtractPostRequest>(ExtractPostRequest::ORDER).build()?.into(),
        singleton::<Extract, ExtractBasicCredentials>(ExtractBasicCredentials::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateDeviceFlowSupport>(ValidateDeviceFlowSupport::ORDER)
            .build()?
            .into(),
        singleton::<Validate, ValidateClientIdParameter>(ValidateClientIdParameter::ORDER)
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
        singleton::<HandleRequestContext<Device>, HandleDeviceRequest>(HandleDeviceRequest::ORDER)
            .build()?
            .into(),
        singleton::<ApplyResponseContext<Device>, ApplyJsonResponse>(ApplyJsonResponse::ORDER)
            .build()?
            .into(),
    ])
}
