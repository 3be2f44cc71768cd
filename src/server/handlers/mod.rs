// ABOUTME: Built-in handler tables of the authorization server, one module per endpoint or stage
// ABOUTME: default_handlers() aggregates every table into the registry defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

/// Token resolution shared by every authenticating endpoint
pub mod authentication;
/// Authorization endpoint
pub mod authorization;
/// Client and permission validation shared by the endpoints
pub mod client;
/// Extraction, passthrough and JSON rendering
pub mod common;
/// Device authorization endpoint
pub mod device;
/// Error stage
pub mod error;
/// Introspection endpoint
pub mod introspection;
/// End-session endpoint
pub mod logout;
/// Revocation endpoint
pub mod revocation;
/// Sign-in stage
pub mod signin;
/// Sign-out stage
pub mod signout;
/// Token endpoint
pub mod token;
/// Userinfo endpoint
pub mod userinfo;

use oidc_forge_core::errors::ForgeResult;

use crate::pipeline::{
    ErasedDescriptor, EventContext, FromServices, Handler, HandlerDescriptor,
    HandlerDescriptorBuilder,
};

/// Singleton descriptor builder for `H` at `order`
pub(crate) fn singleton<C, H>(order: i32) -> HandlerDescriptorBuilder<C>
where
    C: EventContext,
    H: Handler<C> + FromServices,
{
    HandlerDescriptor::<C>::builder()
        .use_singleton_handler::<H>()
        .set_order(order)
}

/// Every built-in handler descriptor
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    let tables = [
        authorization::default_handlers()?,
        token::default_handlers()?,
        introspection::default_handlers()?,
        revocation::default_handlers()?,
        userinfo::default_handlers()?,
        device::default_handlers()?,
        logout::default_handlers()?,
        authentication::default_handlers()?,
        signin::default_handlers()?,
        signout::default_handlers()?,
        error::default_handlers()?,
    ];
    Ok(tables.into_iter().flatten().collect())
}
