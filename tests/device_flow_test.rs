// ABOUTME: End-to-end tests of the device authorization grant
// ABOUTME: Covers pending polls, approval, denial and unknown user codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use http::StatusCode;
use oidc_forge::config::ServerOptions;
use oidc_forge::principal::Principal;
use oidc_forge::protocol::{HostRequest, HostResponse};
use oidc_forge::server::{Device, ServerProvider, Token};
use oidc_forge_core::constants::grant_types;
use oidc_forge_core::errors::ProtocolErrorCode;

use common::{create_test_provider, field, interactive_options, CLIENT_ID, CLIENT_SECRET};

struct DeviceAuthorization {
    device_code: String,
    user_code: String,
}

async fn start(provider: &ServerProvider) -> (HostResponse, DeviceAuthorization) {
    let response = provider
        .process::<Device>(HostRequest::post_pairs([
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
            ("scope", "openid profile"),
        ]))
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(response.status, StatusCode::OK, "{response:?}");

    let authorization = DeviceAuthorization {
        device_code: field(&response, "device_code").unwrap().to_owned(),
        user_code: field(&response, "user_code").unwrap().to_owned(),
    };
    (response, authorization)
}

async fn poll(provider: &ServerProvider, device_code: &str) -> HostResponse {
    provider
        .process::<Token>(HostRequest::post_pairs([
            ("grant_type", grant_types::DEVICE_CODE),
            ("device_code", device_code),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await
        .unwrap()
        .into_response()
        .unwrap()
}

#[tokio::test]
async fn test_device_authorization_response() {
    let provider = create_test_provider(interactive_options()).await;
    let (response, authorization) = start(&provider).await;

    assert_eq!(authorization.user_code.len(), 8);
    assert!(authorization
        .user_code
        .chars()
        .all(|c| "BCDFGHJKLMNPQRSTVWXZ".contains(c)));
    assert_eq!(
        field(&response, "verification_uri"),
        Some("https://auth.example.com/device")
    );
    let complete = field(&response, "verification_uri_complete").unwrap();
    assert!(complete.contains(&format!("user_code={}", authorization.user_code)));
    assert!(common::body(&response)["expires_in"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_approved_device_receives_tokens() {
    let provider = create_test_provider(interactive_options()).await;
    let (_, authorization) = start(&provider).await;

    let pending = poll(&provider, &authorization.device_code).await;
    assert_eq!(field(&pending, "error"), Some("authorization_pending"));

    // Users may type the code in lower case with a separator.
    let typed = format!(
        "{}-{}",
        authorization.user_code[..4].to_lowercase(),
        authorization.user_code[4..].to_lowercase()
    );
    provider
        .approve_device(&typed, &Principal::for_subject("alice"))
        .await
        .unwrap()
        .unwrap();

    let granted = poll(&provider, &authorization.device_code).await;
    assert_eq!(granted.status, StatusCode::OK);
    assert!(field(&granted, "access_token").is_some());

    // Device codes are single use.
    let again = poll(&provider, &authorization.device_code).await;
    assert_eq!(field(&again, "error"), Some("invalid_grant"));
}

#[tokio::test]
async fn test_denied_device_is_refused() {
    let provider = create_test_provider(interactive_options()).await;
    let (_, authorization) = start(&provider).await;

    provider
        .deny_device(&authorization.user_code)
        .await
        .unwrap()
        .unwrap();

    let refused = poll(&provider, &authorization.device_code).await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);
    assert_eq!(field(&refused, "error"), Some("access_denied"));
}

#[tokio::test]
async fn test_user_codes_cannot_be_reused() {
    let provider = create_test_provider(interactive_options()).await;
    let (_, authorization) = start(&provider).await;
    let user = Principal::for_subject("alice");

    provider
        .approve_device(&authorization.user_code, &user)
        .await
        .unwrap()
        .unwrap();
    let second = provider
        .approve_device(&authorization.user_code, &user)
        .await
        .unwrap();
    assert!(second.is_err());

    let unknown = provider.deny_device("BCDFGHJK").await.unwrap().unwrap_err();
    assert_eq!(unknown.error, ProtocolErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_device_flow_requires_token_storage() {
    let provider =
        create_test_provider(ServerOptions::default().with_token_storage_disabled()).await;

    let response = provider
        .process::<Device>(HostRequest::post_pairs([
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(field(&response, "error"), Some("server_error"));
}
