// ABOUTME: Protocol message types exchanged between the host transport and the pipeline
// ABOUTME: OpenID request/response parameter bags plus host-neutral HTTP request/response
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

/// Endpoint families
pub mod endpoint;
/// Host-neutral request and response representations
pub mod host;
/// OpenID Connect request and response parameter bags
pub mod message;

pub use endpoint::EndpointKind;
pub use host::{HostRequest, HostResponse};
pub use message::{OpenIdRequest, OpenIdResponse};
