// ABOUTME: Immutable handler descriptors and their builder
// ABOUTME: A descriptor binds a handler to a context type with an order, filters and an activation mode
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use oidc_forge_core::errors::{ForgeError, ForgeResult};
use serde::Serialize;

use super::context::EventContext;
use super::filter::{short_type_name, Filter};
use super::handler::{FromServices, Handler};
use super::services::ServiceProvider;

/// How handler instances are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// One shared instance, created on first use
    Singleton,
    /// A new instance for every invocation
    Scoped,
}

impl Display for Activation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Singleton => "singleton",
            Self::Scoped => "scoped",
        })
    }
}

/// Identity of a handler implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerType {
    id: TypeId,
    name: &'static str,
}

impl HandlerType {
    /// Identity of `H`
    #[must_use]
    pub fn of<H: 'static>() -> Self {
        Self {
            id: TypeId::of::<H>(),
            name: type_name::<H>(),
        }
    }

    /// Type identifier
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module path
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

type HandlerFactory<C> = Arc<dyn Fn(&ServiceProvider) -> ForgeResult<Arc<dyn Handler<C>>> + Send + Sync>;

/// Immutable metadata describing one handler binding
///
/// Use [`HandlerDescriptor::builder`] to create a descriptor and
/// [`HandlerDescriptor::to_builder`] to derive a modified copy.
pub struct HandlerDescriptor<C: EventContext> {
    handler_type: HandlerType,
    order: i32,
    explicit_order: bool,
    activation: Activation,
    filters: Vec<Arc<dyn Filter<C>>>,
    factory: HandlerFactory<C>,
}

impl<C: EventContext> HandlerDescriptor<C> {
    /// Start building a descriptor for context `C`
    #[must_use]
    pub fn builder() -> HandlerDescriptorBuilder<C> {
        HandlerDescriptorBuilder::new()
    }

    /// Builder pre-populated with this descriptor's settings
    #[must_use]
    pub fn to_builder(&self) -> HandlerDescriptorBuilder<C> {
        HandlerDescriptorBuilder {
            implementation: Some(Implementation {
                handler_type: self.handler_type,
                activation: self.activation,
                factory: Arc::clone(&self.factory),
            }),
            order: self.order,
            explicit_order: self.explicit_order,
            filters: self.filters.clone(),
        }
    }

    /// Handler identity
    #[must_use]
    pub const fn handler_type(&self) -> HandlerType {
        self.handler_type
    }

    /// Sort key, lower runs first
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    /// Whether the order was set explicitly through the builder
    #[must_use]
    pub const fn has_explicit_order(&self) -> bool {
        self.explicit_order
    }

    /// Activation mode
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// Filters, evaluated left to right
    #[must_use]
    pub fn filters(&self) -> &[Arc<dyn Filter<C>>] {
        &self.filters
    }

    /// Names of the filters, in evaluation order
    #[must_use]
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    /// Create a handler instance
    ///
    /// # Errors
    ///
    /// Returns the factory's error when a collaborator cannot be resolved
    pub fn create_handler(&self, services: &ServiceProvider) -> ForgeResult<Arc<dyn Handler<C>>> {
        (self.factory)(services)
    }

    pub(crate) fn with_order(&self, order: i32) -> Self {
        Self {
            order,
            ..self.clone()
        }
    }

    pub(crate) fn erase(self) -> ErasedDescriptor {
        ErasedDescriptor {
            context_type: TypeId::of::<C>(),
            context_name: type_name::<C>(),
            handler_type: self.handler_type,
            order: self.order,
            explicit_order: self.explicit_order,
            activation: self.activation,
            filter_names: self.filter_names(),
            reorder: reorder::<C>,
            inner: Arc::new(self),
        }
    }
}

impl<C: EventContext> Clone for HandlerDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            handler_type: self.handler_type,
            order: self.order,
            explicit_order: self.explicit_order,
            activation: self.activation,
            filters: self.filters.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<C: EventContext> Debug for HandlerDescriptor<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("context", &short_type_name(type_name::<C>()))
            .field("handler", &self.handler_type.short_name())
            .field("order", &self.order)
            .field("activation", &self.activation)
            .field("filters", &self.filter_names())
            .finish()
    }
}

struct Implementation<C: EventContext> {
    handler_type: HandlerType,
    activation: Activation,
    factory: HandlerFactory<C>,
}

/// Builder for [`HandlerDescriptor`]
pub struct HandlerDescriptorBuilder<C: EventContext> {
    implementation: Option<Implementation<C>>,
    order: i32,
    explicit_order: bool,
    filters: Vec<Arc<dyn Filter<C>>>,
}

impl<C: EventContext> HandlerDescriptorBuilder<C> {
    fn new() -> Self {
        Self {
            implementation: None,
            order: 0,
            explicit_order: false,
            filters: Vec::new(),
        }
    }

    /// Use `H` as a singleton, built once from the service container
    #[must_use]
    pub fn use_singleton_handler<H>(self) -> Self
    where
        H: Handler<C> + FromServices,
    {
        self.use_factory::<H>(Activation::Singleton)
    }

    /// Use `H` as a scoped handler, built for every invocation
    #[must_use]
    pub fn use_scoped_handler<H>(self) -> Self
    where
        H: Handler<C> + FromServices,
    {
        self.use_factory::<H>(Activation::Scoped)
    }

    /// Use a pre-built singleton instance
    #[must_use]
    pub fn use_singleton_instance<H>(mut self, handler: Arc<H>) -> Self
    where
        H: Handler<C>,
    {
        let handler: Arc<dyn Handler<C>> = handler;
        let factory: HandlerFactory<C> = Arc::new(
            move |_: &ServiceProvider| -> ForgeResult<Arc<dyn Handler<C>>> {
                Ok(Arc::clone(&handler))
            },
        );
        self.implementation = Some(Implementation {
            handler_type: HandlerType::of::<H>(),
            activation: Activation::Singleton,
            factory,
        });
        self
    }

    fn use_factory<H>(mut self, activation: Activation) -> Self
    where
        H: Handler<C> + FromServices,
    {
        let factory: HandlerFactory<C> = Arc::new(
            |services: &ServiceProvider| -> ForgeResult<Arc<dyn Handler<C>>> {
                let handler = H::from_services(services)?;
                Ok(Arc::new(handler))
            },
        );
        self.implementation = Some(Implementation {
            handler_type: HandlerType::of::<H>(),
            activation,
            factory,
        });
        self
    }

    /// Append a filter; filters run in insertion order
    #[must_use]
    pub fn add_filter<F: Filter<C>>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Set the sort key
    #[must_use]
    pub const fn set_order(mut self, order: i32) -> Self {
        self.order = order;
        self.explicit_order = true;
        self
    }

    /// Build the immutable descriptor
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no handler implementation was set
    pub fn build(self) -> ForgeResult<HandlerDescriptor<C>> {
        let implementation = self.implementation.ok_or_else(|| {
            ForgeError::configuration(format!(
                "no handler implementation was specified for a descriptor of {}",
                short_type_name(type_name::<C>())
            ))
        })?;

        Ok(HandlerDescriptor {
            handler_type: implementation.handler_type,
            order: self.order,
            explicit_order: self.explicit_order,
            activation: implementation.activation,
            filters: self.filters,
            factory: implementation.factory,
        })
    }
}

/// Context-independent view of a descriptor, as stored by the registry
#[derive(Clone)]
pub struct ErasedDescriptor {
    pub(crate) context_type: TypeId,
    pub(crate) context_name: &'static str,
    pub(crate) handler_type: HandlerType,
    pub(crate) order: i32,
    pub(crate) explicit_order: bool,
    pub(crate) activation: Activation,
    pub(crate) filter_names: Vec<&'static str>,
    reorder: fn(&ErasedDescriptor, i32) -> Option<ErasedDescriptor>,
    pub(crate) inner: Arc<dyn Any + Send + Sync>,
}

impl ErasedDescriptor {
    /// Context type name without module path
    #[must_use]
    pub fn context_name(&self) -> &'static str {
        short_type_name(self.context_name)
    }

    /// Handler identity
    #[must_use]
    pub const fn handler_type(&self) -> HandlerType {
        self.handler_type
    }

    /// Sort key
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    /// Activation mode
    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// Names of the filters
    #[must_use]
    pub fn filter_names(&self) -> &[&'static str] {
        &self.filter_names
    }

    /// Typed descriptor, when `C` is the context this descriptor was built for
    #[must_use]
    pub fn downcast<C: EventContext>(&self) -> Option<&HandlerDescriptor<C>> {
        self.inner.downcast_ref::<HandlerDescriptor<C>>()
    }

    pub(crate) fn with_order(&self, order: i32) -> Self {
        (self.reorder)(self, order).unwrap_or_else(|| Self {
            order,
            ..self.clone()
        })
    }
}

impl Debug for ErasedDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedDescriptor")
            .field("context", &self.context_name())
            .field("handler", &self.handler_type.short_name())
            .field("order", &self.order)
            .field("activation", &self.activation)
            .field("filters", &self.filter_names)
            .finish_non_exhaustive()
    }
}

fn reorder<C: EventContext>(erased: &ErasedDescriptor, order: i32) -> Option<ErasedDescriptor> {
    Some(erased.downcast::<C>()?.with_order(order).erase())
}

impl<C: EventContext> From<HandlerDescriptor<C>> for ErasedDescriptor {
    fn from(descriptor: HandlerDescriptor<C>) -> Self {
        descriptor.erase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::Transaction;
    use async_trait::async_trait;

    struct TestContext {
        transaction: Transaction<()>,
    }

    crate::impl_event_context!(TestContext, ());

    #[derive(Default)]
    struct Noop;

    crate::stateless_handlers!(Noop);

    #[async_trait]
    impl Handler<TestContext> for Noop {
        async fn handle(&self, _context: &mut TestContext) -> ForgeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_build_requires_implementation() {
        let error = HandlerDescriptor::<TestContext>::builder()
            .set_order(10)
            .build()
            .unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_to_builder_preserves_settings() {
        let descriptor = HandlerDescriptor::<TestContext>::builder()
            .use_scoped_handler::<Noop>()
            .set_order(42)
            .build()
            .unwrap();

        let copy = descriptor.to_builder().build().unwrap();
        assert_eq!(copy.order(), 42);
        assert!(copy.has_explicit_order());
        assert_eq!(copy.activation(), Activation::Scoped);
        assert_eq!(copy.handler_type(), HandlerType::of::<Noop>());
    }

    #[test]
    fn test_erased_reorder_keeps_typed_descriptor_in_sync() {
        let erased = HandlerDescriptor::<TestContext>::builder()
            .use_singleton_handler::<Noop>()
            .build()
            .unwrap()
            .erase();

        let moved = erased.with_order(-7);
        assert_eq!(moved.order(), -7);
        assert_eq!(moved.downcast::<TestContext>().unwrap().order(), -7);
    }
}
