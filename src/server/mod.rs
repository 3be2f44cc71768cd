// ABOUTME: Authorization server: endpoint markers, stage contexts, filters, default handlers and provider
// ABOUTME: Every endpoint flow is a sequence of dispatches over per-endpoint stage contexts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

//! # Server
//!
//! [`ServerProvider::process`] runs the flow of one endpoint:
//!
//! 1. extract the protocol request from the host request
//! 2. validate it
//! 3. resolve the token the endpoint demands, if any
//! 4. handle it, possibly asking for a sign-in or a sign-out
//! 5. run the sign-in, sign-out or error stage
//! 6. apply the response
//!
//! A handler that enables passthrough suspends the flow at the handle stage
//! and the host resumes it through the provider.

/// Endpoint markers
pub mod endpoints;
/// Stage contexts
pub mod events;
/// Built-in filters
pub mod filters;
/// Built-in handler tables
pub mod handlers;
/// Flow runner
pub mod provider;

pub use endpoints::{
    Authorization, Device, Endpoint, Introspection, Logout, Revocation, Token, TokenDemand,
    Userinfo,
};
pub use events::ServerTransaction;
pub use provider::{FlowResult, PendingRequest, ServerProvider, ServerProviderBuilder};
