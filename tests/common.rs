// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides quiet logging, seeded server providers and PKCE helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `oidc_forge`

use std::sync::{Arc, Once};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use oidc_forge::config::ServerOptions;
use oidc_forge::formats::{KeyProvider, StaticKeyProvider};
use oidc_forge::protocol::{EndpointKind, HostResponse};
use oidc_forge::server::handlers::client::hash_client_secret;
use oidc_forge::server::ServerProvider;
use oidc_forge::stores::Store;
use oidc_forge_core::constants::{grant_types, permissions};
use oidc_forge_core::models::Application;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const CLIENT_ID: &str = "web-app";
pub const CLIENT_SECRET: &str = "correct horse battery staple";
pub const PUBLIC_CLIENT_ID: &str = "spa";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const POST_LOGOUT_REDIRECT_URI: &str = "https://app.example.com/signed-out";
pub const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

/// Fixed key material so validation providers can share the server's keys
pub fn test_keys() -> Arc<dyn KeyProvider> {
    Arc::new(StaticKeyProvider::new(vec![7_u8; 32]).unwrap())
}

fn endpoint_permissions(application: Application) -> Application {
    EndpointKind::ALL.into_iter().fold(application, |app, endpoint| {
        app.with_permission(permissions::endpoint(endpoint.as_str()))
    })
}

/// Confidential client allowed to use every grant and endpoint
pub fn confidential_application() -> Application {
    let application = Application::new(CLIENT_ID)
        .with_hashed_secret(hash_client_secret(CLIENT_SECRET))
        .with_redirect_uri(REDIRECT_URI)
        .with_post_logout_redirect_uri(POST_LOGOUT_REDIRECT_URI)
        .with_permission(permissions::grant_type(grant_types::AUTHORIZATION_CODE))
        .with_permission(permissions::grant_type(grant_types::CLIENT_CREDENTIALS))
        .with_permission(permissions::grant_type(grant_types::REFRESH_TOKEN))
        .with_permission(permissions::grant_type(grant_types::DEVICE_CODE))
        .with_permission(permissions::scope("profile"))
        .with_permission(permissions::scope("email"));
    endpoint_permissions(application)
}

/// Public client using the authorization code flow with PKCE
pub fn public_application() -> Application {
    let application = Application::new(PUBLIC_CLIENT_ID)
        .public()
        .with_redirect_uri(REDIRECT_URI)
        .with_permission(permissions::grant_type(grant_types::AUTHORIZATION_CODE))
        .with_permission(permissions::grant_type(grant_types::REFRESH_TOKEN))
        .with_permission(permissions::scope("profile"));
    endpoint_permissions(application)
}

/// Server provider with the test applications registered
pub async fn create_test_provider(options: ServerOptions) -> ServerProvider {
    init_test_logging();
    let provider = ServerProvider::builder(options)
        .with_key_provider(test_keys())
        .build()
        .unwrap();

    let applications = provider.resolver().get::<Application>().unwrap();
    applications.create(confidential_application()).await.unwrap();
    applications.create(public_application()).await.unwrap();
    provider
}

/// Default options with the authorization endpoint handed to the host
pub fn interactive_options() -> ServerOptions {
    ServerOptions::default()
        .with_issuer("https://auth.example.com/")
        .with_passthrough(EndpointKind::Authorization)
        .with_passthrough(EndpointKind::Logout)
        .with_verification_uri("https://auth.example.com/device")
}

/// S256 challenge of [`CODE_VERIFIER`]
pub fn code_challenge() -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(CODE_VERIFIER.as_bytes()))
}

/// JSON body of a response
pub fn body(response: &HostResponse) -> &Value {
    response.body.as_ref().expect("response has a JSON body")
}

/// String field of a JSON response body
pub fn field<'a>(response: &'a HostResponse, name: &str) -> Option<&'a str> {
    response.body.as_ref().and_then(|body| body.get(name)).and_then(Value::as_str)
}
