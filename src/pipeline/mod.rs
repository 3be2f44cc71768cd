// ABOUTME: Handler pipeline engine: descriptors, filters, registry, dispatcher and contexts
// ABOUTME: Drives every protocol stage through ordered, filterable handler chains
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

//! # Pipeline
//!
//! Every protocol stage is modelled as a context type. Handlers are bound to a
//! context through a [`HandlerDescriptor`] carrying an order, filters and an
//! activation mode. The [`HandlerRegistry`] merges default tables with caller
//! registrations, and the [`Dispatcher`] runs the resulting chain until a
//! handler leaves the transaction in a terminal [`Outcome`].

/// Transaction and stage-context contract
pub mod context;
/// Handler descriptors and builder
pub mod descriptor;
/// Pipeline dispatcher
pub mod dispatcher;
/// Handler activation filters
pub mod filter;
/// Handler contract
pub mod handler;
/// Descriptor registry
pub mod registry;
/// Service container
pub mod services;

pub use context::{EventContext, Outcome, Transaction};
pub use descriptor::{Activation, ErasedDescriptor, HandlerDescriptor, HandlerDescriptorBuilder, HandlerType};
pub use dispatcher::Dispatcher;
pub use filter::{Filter, FilterFn};
pub use handler::{FromServices, Handler};
pub use registry::{HandlerRegistrations, HandlerRegistry};
pub use services::ServiceProvider;
