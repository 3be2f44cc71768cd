// ABOUTME: Resource-server side: bearer token extraction and validation over the handler pipeline
// ABOUTME: Shares the pipeline engine, token formats and stores with the server side
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

/// Stage contexts
pub mod events;
/// Default handlers and filters
pub mod handlers;
/// Validation entry point
pub mod provider;

pub use events::{ProcessRequestContext, ValidateTokenContext, ValidationTransaction};
pub use provider::{ValidationProvider, ValidationProviderBuilder, ValidationResult};
