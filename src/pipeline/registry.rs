// ABOUTME: Handler registry mapping each context type to its ordered descriptor list
// ABOUTME: Merges default tables with additions, removals and replacements deterministically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::any::TypeId;
use std::collections::HashMap;

use tracing::{debug, warn};

use super::context::EventContext;
use super::descriptor::{ErasedDescriptor, HandlerDescriptor, HandlerType};

/// Handler removal, either everywhere or for a single context type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Removal {
    context_type: Option<TypeId>,
    handler_type: HandlerType,
}

impl Removal {
    fn matches(&self, descriptor: &ErasedDescriptor) -> bool {
        descriptor.handler_type == self.handler_type
            && self
                .context_type
                .is_none_or(|context| context == descriptor.context_type)
    }
}

/// Caller-supplied changes applied on top of the default handler tables
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistrations {
    additions: Vec<ErasedDescriptor>,
    removals: Vec<Removal>,
    replacements: Vec<(HandlerType, ErasedDescriptor)>,
}

impl HandlerRegistrations {
    /// Create an empty set of registrations
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional handler
    #[must_use]
    pub fn add_handler<C: EventContext>(mut self, descriptor: HandlerDescriptor<C>) -> Self {
        self.additions.push(descriptor.into());
        self
    }

    /// Remove handler `H` from every context it is bound to
    #[must_use]
    pub fn remove_handler<H: 'static>(mut self) -> Self {
        self.removals.push(Removal {
            context_type: None,
            handler_type: HandlerType::of::<H>(),
        });
        self
    }

    /// Remove handler `H` from context `C` only
    #[must_use]
    pub fn remove_handler_for<C: EventContext, H: 'static>(mut self) -> Self {
        self.removals.push(Removal {
            context_type: Some(TypeId::of::<C>()),
            handler_type: HandlerType::of::<H>(),
        });
        self
    }

    /// Replace handler `H` with another descriptor for the same context
    ///
    /// The replacement takes the position and order of `H` unless it was
    /// built with an explicit order.
    #[must_use]
    pub fn replace_handler<H: 'static, C: EventContext>(
        mut self,
        descriptor: HandlerDescriptor<C>,
    ) -> Self {
        self.replacements
            .push((HandlerType::of::<H>(), descriptor.into()));
        self
    }

    /// Whether no change was registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty() && self.replacements.is_empty()
    }
}

/// Context type to ordered descriptor list, built once per configuration
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: HashMap<TypeId, Vec<ErasedDescriptor>>,
}

impl HandlerRegistry {
    /// Build the registry from default descriptors and caller registrations
    ///
    /// Steps: start from the defaults, apply removals, apply replacements,
    /// append additions (duplicates are skipped), then stable-sort every list
    /// by order. The result only depends on the inputs.
    #[must_use]
    pub fn build(defaults: Vec<ErasedDescriptor>, registrations: HandlerRegistrations) -> Self {
        let mut entries: HashMap<TypeId, Vec<ErasedDescriptor>> = HashMap::new();

        for descriptor in defaults {
            push_unique(&mut entries, descriptor);
        }

        for removal in &registrations.removals {
            for list in entries.values_mut() {
                list.retain(|descriptor| !removal.matches(descriptor));
            }
        }

        for (replaced, replacement) in registrations.replacements {
            apply_replacement(&mut entries, replaced, replacement);
        }

        for descriptor in registrations.additions {
            push_unique(&mut entries, descriptor);
        }

        for list in entries.values_mut() {
            list.sort_by_key(ErasedDescriptor::order);
        }

        let registry = Self { entries };
        debug!(
            contexts = registry.entries.len(),
            handlers = registry.len(),
            "handler registry built"
        );
        registry
    }

    /// Ordered descriptors registered for context `C`
    #[must_use]
    pub fn descriptors<C: EventContext>(&self) -> Vec<&HandlerDescriptor<C>> {
        self.entries
            .get(&TypeId::of::<C>())
            .map(|list| list.iter().filter_map(ErasedDescriptor::downcast::<C>).collect())
            .unwrap_or_default()
    }

    /// Whether handler `H` is bound to context `C`
    #[must_use]
    pub fn contains<C: EventContext, H: 'static>(&self) -> bool {
        let handler_type = HandlerType::of::<H>();
        self.entries
            .get(&TypeId::of::<C>())
            .is_some_and(|list| list.iter().any(|d| d.handler_type == handler_type))
    }

    /// Every registered list, sorted by context name for stable listings
    #[must_use]
    pub fn pipelines(&self) -> Vec<(&'static str, &[ErasedDescriptor])> {
        let mut pipelines: Vec<(&'static str, &[ErasedDescriptor])> = self
            .entries
            .values()
            .filter_map(|list| Some((list.first()?.context_name(), list.as_slice())))
            .collect();
        pipelines.sort_by_key(|(name, _)| *name);
        pipelines
    }

    /// Total number of descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether no descriptor is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_unique(entries: &mut HashMap<TypeId, Vec<ErasedDescriptor>>, descriptor: ErasedDescriptor) {
    let list = entries.entry(descriptor.context_type).or_default();
    if list
        .iter()
        .any(|existing| existing.handler_type == descriptor.handler_type)
    {
        warn!(
            context = descriptor.context_name(),
            handler = descriptor.handler_type.short_name(),
            "handler already registered for this context, skipping duplicate"
        );
        return;
    }
    list.push(descriptor);
}

fn apply_replacement(
    entries: &mut HashMap<TypeId, Vec<ErasedDescriptor>>,
    replaced: HandlerType,
    replacement: ErasedDescriptor,
) {
    let list = entries.entry(replacement.context_type).or_default();
    let Some(position) = list.iter().position(|d| d.handler_type == replaced) else {
        debug!(
            context = replacement.context_name(),
            handler = replaced.short_name(),
            "replaced handler is not registered, adding replacement"
        );
        push_unique(entries, replacement);
        return;
    };

    let replacement = if replacement.explicit_order {
        replacement
    } else {
        replacement.with_order(list[position].order)
    };

    // The replacement may already be bound elsewhere in the list.
    let handler_type = replacement.handler_type;
    list[position] = replacement;
    let mut index = 0;
    list.retain(|descriptor| {
        let keep = index == position || descriptor.handler_type != handler_type;
        index += 1;
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::Transaction;
    use crate::pipeline::handler::Handler;
    use async_trait::async_trait;
    use oidc_forge_core::errors::ForgeResult;

    struct Ctx {
        transaction: Transaction<()>,
    }

    crate::impl_event_context!(Ctx, ());

    struct Other {
        transaction: Transaction<()>,
    }

    crate::impl_event_context!(Other, ());

    macro_rules! noop_handlers {
        ($($name:ident),+) => {
            $(
                #[derive(Default)]
                struct $name;

                #[async_trait]
                impl Handler<Ctx> for $name {
                    async fn handle(&self, _context: &mut Ctx) -> ForgeResult<()> {
                        Ok(())
                    }
                }

                #[async_trait]
                impl Handler<Other> for $name {
                    async fn handle(&self, _context: &mut Other) -> ForgeResult<()> {
                        Ok(())
                    }
                }
            )+
            crate::stateless_handlers!($($name),+);
        };
    }

    noop_handlers!(A, B, C, D);

    fn descriptor<H>(order: i32) -> ErasedDescriptor
    where
        H: Handler<Ctx> + crate::pipeline::FromServices,
    {
        HandlerDescriptor::<Ctx>::builder()
            .use_singleton_handler::<H>()
            .set_order(order)
            .build()
            .unwrap()
            .into()
    }

    fn names(registry: &HandlerRegistry) -> Vec<&'static str> {
        registry
            .descriptors::<Ctx>()
            .iter()
            .map(|d| d.handler_type().short_name())
            .collect()
    }

    #[test]
    fn test_stable_sort_preserves_registration_order() {
        let registry = HandlerRegistry::build(
            vec![descriptor::<C>(10), descriptor::<A>(0), descriptor::<B>(10)],
            HandlerRegistrations::new(),
        );
        assert_eq!(names(&registry), vec!["A", "C", "B"]);
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let registrations = HandlerRegistrations::new().add_handler(
            HandlerDescriptor::<Ctx>::builder()
                .use_singleton_handler::<A>()
                .set_order(-100)
                .build()
                .unwrap(),
        );
        let registry = HandlerRegistry::build(vec![descriptor::<A>(5)], registrations);

        let descriptors = registry.descriptors::<Ctx>();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].order(), 5);
    }

    #[test]
    fn test_replacement_inherits_order_unless_explicit() {
        let implicit = HandlerDescriptor::<Ctx>::builder()
            .use_singleton_handler::<D>()
            .build()
            .unwrap();
        let registry = HandlerRegistry::build(
            vec![descriptor::<A>(0), descriptor::<B>(10), descriptor::<C>(20)],
            HandlerRegistrations::new().replace_handler::<B, Ctx>(implicit),
        );
        assert_eq!(names(&registry), vec!["A", "D", "C"]);
        assert_eq!(registry.descriptors::<Ctx>()[1].order(), 10);

        let explicit = HandlerDescriptor::<Ctx>::builder()
            .use_singleton_handler::<D>()
            .set_order(30)
            .build()
            .unwrap();
        let registry = HandlerRegistry::build(
            vec![descriptor::<A>(0), descriptor::<B>(10), descriptor::<C>(20)],
            HandlerRegistrations::new().replace_handler::<B, Ctx>(explicit),
        );
        assert_eq!(names(&registry), vec!["A", "C", "D"]);
    }

    #[test]
    fn test_scoped_removal_leaves_other_contexts_untouched() {
        let other: ErasedDescriptor = HandlerDescriptor::<Other>::builder()
            .use_singleton_handler::<A>()
            .build()
            .unwrap()
            .into();
        let registry = HandlerRegistry::build(
            vec![descriptor::<A>(0), descriptor::<B>(1), other],
            HandlerRegistrations::new().remove_handler_for::<Ctx, A>(),
        );

        assert!(!registry.contains::<Ctx, A>());
        assert!(registry.contains::<Ctx, B>());
        assert!(registry.contains::<Other, A>());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_same_inputs_build_the_same_registry() {
        fn inputs() -> (Vec<ErasedDescriptor>, HandlerRegistrations) {
            let other: ErasedDescriptor = HandlerDescriptor::<Other>::builder()
                .use_singleton_handler::<D>()
                .set_order(7)
                .build()
                .unwrap()
                .into();
            let registrations = HandlerRegistrations::new()
                .remove_handler::<C>()
                .replace_handler::<B, Ctx>(
                    HandlerDescriptor::<Ctx>::builder()
                        .use_singleton_handler::<D>()
                        .build()
                        .unwrap(),
                )
                .add_handler(
                    HandlerDescriptor::<Ctx>::builder()
                        .use_singleton_handler::<B>()
                        .set_order(10)
                        .build()
                        .unwrap(),
                );
            (
                vec![descriptor::<C>(10), other, descriptor::<B>(10), descriptor::<A>(0)],
                registrations,
            )
        }

        fn listing(registry: &HandlerRegistry) -> Vec<(&'static str, Vec<(&'static str, i32)>)> {
            registry
                .pipelines()
                .into_iter()
                .map(|(context, list)| {
                    let handlers = list
                        .iter()
                        .map(|d| (d.handler_type.short_name(), d.order()))
                        .collect();
                    (context, handlers)
                })
                .collect()
        }

        let (defaults, registrations) = inputs();
        let first = HandlerRegistry::build(defaults, registrations);
        let (defaults, registrations) = inputs();
        let second = HandlerRegistry::build(defaults, registrations);

        assert_eq!(listing(&first), listing(&second));
        assert_eq!(names(&first), vec!["A", "D", "B"]);
    }
}
