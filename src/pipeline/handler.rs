// ABOUTME: Handler contract for one stage context and construction from the service container
// ABOUTME: Handlers mutate the context and signal terminal outcomes through the transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use async_trait::async_trait;
use oidc_forge_core::errors::ForgeResult;

use super::context::EventContext;
use super::services::ServiceProvider;

/// Unit of pipeline logic bound to one context type
///
/// Returning `Err` is a fault that aborts the transaction. Protocol failures
/// are reported by rejecting the transaction and returning `Ok(())`.
#[async_trait]
pub trait Handler<C: EventContext>: Send + Sync + 'static {
    /// Process the context
    ///
    /// # Errors
    ///
    /// Returns an error when processing cannot continue (store outage,
    /// unavailable key material, broken configuration)
    async fn handle(&self, context: &mut C) -> ForgeResult<()>;
}

/// Construction of a handler from the service container
pub trait FromServices: Sized {
    /// Build the handler, resolving its collaborators
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a required service is missing
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self>;
}

/// Implement [`FromServices`] for handlers that have no collaborators
#[macro_export]
macro_rules! stateless_handlers {
    ($($handler:ty),+ $(,)?) => {
        $(
            impl $crate::pipeline::FromServices for $handler {
                fn from_services(
                    _services: &$crate::pipeline::ServiceProvider,
                ) -> $crate::ForgeResult<Self> {
                    Ok(<$handler as ::std::default::Default>::default())
                }
            }
        )+
    };
}
