// ABOUTME: Sign-out stage: selects the post-logout redirect target and echoes state
// ABOUTME: Runs after the logout handle stage asks for a sign-out
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use async_trait::async_trait;
use oidc_forge_core::constants::{parameters, properties};
use oidc_forge_core::errors::ForgeResult;
use tracing::info;
use url::Url;

use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, Handler};
use crate::server::events::ProcessSignoutContext;
use crate::stateless_handlers;

type Context = ProcessSignoutContext;

/// Promotes the validated post-logout redirect URI to the redirect target
#[derive(Debug, Default)]
pub struct AttachPostLogoutRedirectUri;

impl AttachPostLogoutRedirectUri {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<Context> for AttachPostLogoutRedirectUri {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let target = context
            .transaction()
            .property::<Url>(properties::POST_LOGOUT_REDIRECT_URI)
            .cloned();
        if let Some(target) = target {
            context
                .transaction_mut()
                .set_property(properties::REDIRECT_URI, target);
        }
        info!(transaction = %context.transaction().id(), "user signed out");
        Ok(())
    }
}

/// Copies `state` into the response
#[derive(Debug, Default)]
pub struct AttachSignoutState;

impl AttachSignoutState {
    /// Sort key
    pub const ORDER: i32 = AttachPostLogoutRedirectUri::ORDER + 1_000;
}

#[async_trait]
impl Handler<Context> for AttachSignoutState {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        if let Some(state) = context.request().state().map(str::to_owned) {
            context.response_mut().set(parameters::STATE, state);
        }
        Ok(())
    }
}

stateless_handlers!(AttachPostLogoutRedirectUri, AttachSignoutState);

/// Default sign-out handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    Ok(vec![
        singleton::<Context, AttachPostLogoutRedirectUri>(AttachPostLogoutRedirectUri::ORDER)
            .build()?
            .into(),
        singleton::<Context, AttachSignoutState>(AttachSignoutState::ORDER)
            .build()?
            .into(),
    ])
}
