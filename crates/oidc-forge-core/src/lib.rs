// ABOUTME: Core types and constants for the oidc-forge OAuth2/OpenID Connect framework
// ABOUTME: Foundation crate with error handling, protocol constants, entities and pagination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

#![deny(unsafe_code)]

//! # oidc-forge core
//!
//! Foundation crate providing the shared types of the oidc-forge framework.
//! It is designed to change infrequently so that the pipeline crate can be
//! rebuilt incrementally.
//!
//! ## Modules
//!
//! - **errors**: `ForgeError`, `ForgeResult` and the OAuth2 protocol error payload
//! - **constants**: protocol parameter names, grant types, claims and permissions
//! - **models**: persistence entities (applications, authorizations, scopes, tokens)
//! - **pagination**: skip/take paging for store listings

/// Unified error handling and OAuth2 protocol error codes
pub mod errors;

/// Protocol constants organized by domain
pub mod constants;

/// Persistence entities and the token type enumeration
pub mod models;

/// Skip/take pagination for store listings
pub mod pagination;
