// ABOUTME: Dispatcher resolving, filtering and invoking the handlers registered for a context
// ABOUTME: Runs handlers sequentially and stops as soon as a terminal outcome is set
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use oidc_forge_core::errors::ForgeResult;
use tracing::{debug, trace, warn};

use super::context::{EventContext, Outcome};
use super::descriptor::{Activation, HandlerDescriptor};
use super::filter::short_type_name;
use super::handler::Handler;
use super::registry::HandlerRegistry;
use super::services::ServiceProvider;

/// Invokes the handler pipeline of a context
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    services: Arc<ServiceProvider>,
    singletons: DashMap<(TypeId, TypeId), Arc<dyn Any + Send + Sync>>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and a service container
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>, services: Arc<ServiceProvider>) -> Self {
        Self {
            registry,
            services,
            singletons: DashMap::new(),
        }
    }

    /// Registry used to resolve handlers
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Service container used to build handlers
    #[must_use]
    pub fn services(&self) -> &Arc<ServiceProvider> {
        &self.services
    }

    /// Run every active handler registered for `C`, in order
    ///
    /// Dispatch stops after the first handler that leaves the transaction in
    /// a terminal state (`Error`, `Handled` or `Skipped`).
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a filter, a handler factory or a
    /// handler; the remaining handlers are not invoked
    pub async fn dispatch<C: EventContext>(&self, context: &mut C) -> ForgeResult<Outcome> {
        let context_name = short_type_name(type_name::<C>());
        let transaction_id = context.transaction().id();

        for descriptor in self.registry.descriptors::<C>() {
            let handler_name = descriptor.handler_type().short_name();

            if !filters_pass(descriptor, context).await? {
                trace!(
                    transaction = %transaction_id,
                    context = context_name,
                    handler = handler_name,
                    "handler skipped by filter"
                );
                continue;
            }

            let handler = self.resolve(descriptor)?;
            debug!(
                transaction = %transaction_id,
                context = context_name,
                handler = handler_name,
                order = descriptor.order(),
                "invoking handler"
            );

            if let Err(error) = handler.handle(context).await {
                warn!(
                    transaction = %transaction_id,
                    context = context_name,
                    handler = handler_name,
                    error = %error,
                    "handler failed"
                );
                return Err(error);
            }

            let outcome = context.transaction().outcome();
            if outcome.is_terminal() {
                debug!(
                    transaction = %transaction_id,
                    context = context_name,
                    handler = handler_name,
                    outcome = outcome.as_str(),
                    "dispatch stopped"
                );
                break;
            }
        }

        Ok(context.transaction().outcome().clone())
    }

    fn resolve<C: EventContext>(
        &self,
        descriptor: &HandlerDescriptor<C>,
    ) -> ForgeResult<Arc<dyn Handler<C>>> {
        if descriptor.activation() == Activation::Scoped {
            return descriptor.create_handler(&self.services);
        }

        let key = (TypeId::of::<C>(), descriptor.handler_type().id());
        if let Some(cached) = self.cached::<C>(&key) {
            return Ok(cached);
        }

        let created = descriptor.create_handler(&self.services)?;
        let stored: Arc<dyn Any + Send + Sync> = Arc::new(Arc::clone(&created));
        // A concurrent first use may have won the race; keep the first instance.
        let winner = Arc::clone(self.singletons.entry(key).or_insert(stored).value());
        Ok(winner
            .downcast_ref::<Arc<dyn Handler<C>>>()
            .map_or(created, Arc::clone))
    }

    fn cached<C: EventContext>(&self, key: &(TypeId, TypeId)) -> Option<Arc<dyn Handler<C>>> {
        let entry = self.singletons.get(key)?;
        entry
            .value()
            .downcast_ref::<Arc<dyn Handler<C>>>()
            .map(Arc::clone)
    }
}

async fn filters_pass<C: EventContext>(
    descriptor: &HandlerDescriptor<C>,
    context: &C,
) -> ForgeResult<bool> {
    for filter in descriptor.filters() {
        if !filter.is_active(context).await? {
            return Ok(false);
        }
    }
    Ok(true)
}
