// ABOUTME: Filters gate handler activation for a given context
// ABOUTME: All filters of a descriptor must pass; evaluation stops at the first false
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::any::type_name;
use std::marker::PhantomData;

use async_trait::async_trait;
use oidc_forge_core::errors::ForgeResult;

use super::context::EventContext;

/// Predicate deciding whether a handler runs for a context
///
/// Filters only read the context; they never change the transaction.
#[async_trait]
pub trait Filter<C: EventContext>: Send + Sync + 'static {
    /// Whether the handler should run
    ///
    /// # Errors
    ///
    /// Returns an error when the predicate itself cannot be evaluated
    async fn is_active(&self, context: &C) -> ForgeResult<bool>;

    /// Name shown in logs and pipeline listings
    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }
}

/// Filter backed by a synchronous closure
pub struct FilterFn<C, F> {
    name: &'static str,
    predicate: F,
    _context: PhantomData<fn(&C)>,
}

impl<C, F> FilterFn<C, F>
where
    C: EventContext,
    F: Fn(&C) -> bool + Send + Sync + 'static,
{
    /// Wrap a closure under the given name
    pub const fn new(name: &'static str, predicate: F) -> Self {
        Self {
            name,
            predicate,
            _context: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F> Filter<C> for FilterFn<C, F>
where
    C: EventContext,
    F: Fn(&C) -> bool + Send + Sync + 'static,
{
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok((self.predicate)(context))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Strip module paths from a type name, keeping generic arguments readable
#[must_use]
pub fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    let start = head.rfind("::").map_or(0, |index| index + 2);
    &full[start..]
}
