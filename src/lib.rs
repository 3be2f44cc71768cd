// ABOUTME: Main library entry point for the oidc-forge OAuth2/OpenID Connect framework
// ABOUTME: Exposes the handler pipeline engine, the authorization server and the validation side
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

// deny(unsafe_code): the crate has no unsafe code and keeps it that way
#![deny(unsafe_code)]

//! # oidc-forge
//!
//! An event-driven OAuth 2.0 / OpenID Connect framework. Every protocol
//! request flows through a sequence of stages; each stage is a list of
//! ordered, filterable handlers that hosts can extend, replace or remove.
//!
//! ## Architecture
//!
//! - **Pipeline**: handler descriptors, filters, the registry and the dispatcher
//! - **Server**: authorization, token, introspection, revocation, userinfo,
//!   device and logout endpoints built on the pipeline
//! - **Validation**: bearer token authentication for resource servers
//! - **Formats**: sealed and JWT token backends over a shared master key
//! - **Stores**: application, authorization, scope and token stores with an
//!   in-memory implementation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use oidc_forge::config::ServerOptions;
//! use oidc_forge::protocol::HostRequest;
//! use oidc_forge::server::{ServerProvider, Token};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = ServerProvider::builder(ServerOptions::from_env()).build()?;
//!
//!     let request = HostRequest::post_form("grant_type=client_credentials&client_id=app");
//!     let response = provider.process::<Token>(request).await?.into_response();
//!     println!("{:?}", response.map(|r| r.status));
//!     Ok(())
//! }
//! ```

/// Server and validation options loaded from the environment
pub mod config;

/// Token formats and key material
pub mod formats;

/// Structured logging setup
pub mod logging;

/// Handler pipeline engine
pub mod pipeline;

/// Claims-based identity carried by tokens
pub mod principal;

/// Protocol messages and the host request/response abstraction
pub mod protocol;

/// Authorization server
pub mod server;

/// Persistence abstractions and the in-memory store
pub mod stores;

/// Resource-server token validation
pub mod validation;

pub use oidc_forge_core::errors::{ForgeError, ForgeResult, OAuthError};
pub use oidc_forge_core::models;
