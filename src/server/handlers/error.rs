// ABOUTME: Error stage: copies a rejection into the response parameters
// ABOUTME: Authorization errors echo `state` so the client can correlate the redirect

use async_trait::async_trait;
use oidc_forge_core::constants::parameters;
use oidc_forge_core::errors::ForgeResult;
use tracing::debug;

use super::singleton;
use crate::pipeline::{ErasedDescriptor, EventContext, Handler};
use crate::protocol::EndpointKind;
use crate::server::events::ProcessErrorContext;
use crate::stateless_handlers;

type Context = ProcessErrorContext;

/// Writes `error`, `error_description` and `error_uri`
#[derive(Debug, Default)]
pub struct AttachErrorParameters;

impl AttachErrorParameters {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<Context> for AttachErrorParameters {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let error = context.error.clone();
        debug!(
            transaction = %context.transaction().id(),
            error = %error.error,
            "rendering error response"
        );
        context.response_mut().set_error(&error);
        Ok(())
    }
}

/// Echoes `state` on authorization errors
#[derive(Debug, Default)]
pub struct AttachErrorState;

impl AttachErrorState {
    /// Sort key
    pub const ORDER: i32 = AttachErrorParameters::ORDER + 1_000;
}

#[async_trait]
impl Handler<Context> for AttachErrorState {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        if context.transaction().endpoint != EndpointKind::Authorization {
            return Ok(());
        }
        if let Some(state) = context.request().state().map(str::to_owned) {
            context.response_mut().set(parameters::STATE, state);
        }
        Ok(())
    }
}

stateless_handlers!(AttachErrorParameters, AttachErrorState);

/// Default error handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    Ok(vec![
        singleton::<Context, AttachErrorParameters>(AttachErrorParameters::ORDER)
            .build()?
            .into(),
        singleton::<Context, AttachErrorState>(AttachErrorState::ORDER)
            .build()?
            .into(),
    ])
}
