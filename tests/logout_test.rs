// ABOUTME: Logout endpoint tests: host-driven sign-out and post-logout redirect validation
// ABOUTME: Uses the interactive options where the logout handle stage is passed to the host
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use http::StatusCode;
use oidc_forge::config::ServerOptions;
use oidc_forge::protocol::HostRequest;
use oidc_forge::server::Logout;
use url::form_urlencoded;

use common::{create_test_provider, field, interactive_options, CLIENT_ID, POST_LOGOUT_REDIRECT_URI};

fn logout_query(post_logout_redirect_uri: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", CLIENT_ID)
        .append_pair("post_logout_redirect_uri", post_logout_redirect_uri)
        .append_pair("state", "xyz-42")
        .finish()
}

#[tokio::test]
async fn test_sign_out_redirects_to_registered_uri_with_state() {
    let provider = create_test_provider(interactive_options()).await;

    let pending = provider
        .process::<Logout>(HostRequest::get(logout_query(POST_LOGOUT_REDIRECT_URI)))
        .await
        .unwrap()
        .into_pending()
        .expect("logout is handed to the host");
    assert_eq!(pending.request().state(), Some("xyz-42"));

    let response = provider.sign_out(pending).await.unwrap();

    assert_eq!(response.status, StatusCode::FOUND);
    let location = response.location().unwrap();
    assert!(location.starts_with(POST_LOGOUT_REDIRECT_URI));
    assert_eq!(response.location_parameters().state(), Some("xyz-42"));
}

#[tokio::test]
async fn test_unregistered_post_logout_uri_is_rejected_without_redirect() {
    let provider = create_test_provider(interactive_options()).await;

    let response = provider
        .process::<Logout>(HostRequest::get(logout_query("https://evil.example.com/")))
        .await
        .unwrap()
        .into_response()
        .expect("invalid requests are answered directly");

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.location().is_none());
    assert_eq!(field(&response, "error"), Some("invalid_request"));
}

#[tokio::test]
async fn test_logout_without_passthrough_answers_with_json() {
    let provider = create_test_provider(ServerOptions::default()).await;

    let response = provider
        .process::<Logout>(HostRequest::get("state=abc"))
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(field(&response, "state"), Some("abc"));
}
