// ABOUTME: End-to-end tests of the authorization code, client credentials and refresh token flows
// ABOUTME: Covers PKCE, code replay detection, revocation, introspection and userinfo
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::StatusCode;
use oidc_forge::config::ServerOptions;
use oidc_forge::formats::{KeyProvider, TokenFormatKind};
use oidc_forge::principal::Principal;
use oidc_forge::protocol::{EndpointKind, HostRequest, HostResponse};
use oidc_forge::server::{
    Authorization, FlowResult, Introspection, Revocation, ServerProvider, Token, Userinfo,
};
use oidc_forge::stores::Store;
use oidc_forge_core::errors::{ForgeError, ForgeResult};
use oidc_forge_core::models::{Application, TokenType};
use url::form_urlencoded;
use zeroize::Zeroizing;

use common::{
    code_challenge, create_test_provider, field, interactive_options, CLIENT_ID, CLIENT_SECRET,
    CODE_VERIFIER, PUBLIC_CLIENT_ID, REDIRECT_URI,
};

fn authorization_query(client_id: &str, scope: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", REDIRECT_URI)
        .append_pair("scope", scope)
        .append_pair("state", "af0ifjsldkj")
        .append_pair("code_challenge", &code_challenge())
        .append_pair("code_challenge_method", "S256")
        .finish()
}

/// Run the authorization endpoint, sign `alice` in and return the redirect
async fn authorize(provider: &ServerProvider, client_id: &str, scope: &str) -> HostResponse {
    let flow = provider
        .process::<Authorization>(HostRequest::get(authorization_query(client_id, scope)))
        .await
        .unwrap();
    let pending = match flow {
        FlowResult::Passthrough(pending) => pending,
        FlowResult::Response(response) => panic!("authorization request rejected: {response:?}"),
    };
    assert_eq!(pending.request().client_id(), Some(client_id));

    let mut user = Principal::for_subject("alice");
    user.set_claim("name", "Alice Liddell");
    provider.sign_in(pending, user).await.unwrap()
}

async fn token(provider: &ServerProvider, pairs: &[(&str, &str)]) -> HostResponse {
    provider
        .process::<Token>(HostRequest::post_pairs(pairs.iter().copied()))
        .await
        .unwrap()
        .into_response()
        .unwrap()
}

async fn redeem_code(provider: &ServerProvider, code: &str) -> HostResponse {
    token(
        provider,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", CODE_VERIFIER),
            ("client_id", PUBLIC_CLIENT_ID),
        ],
    )
    .await
}

#[tokio::test]
async fn test_client_credentials_with_basic_authentication() {
    let provider = create_test_provider(ServerOptions::default()).await;
    let credentials = STANDARD.encode(format!("{CLIENT_ID}:{CLIENT_SECRET}"));
    let request = HostRequest::post_pairs([("grant_type", "client_credentials"), ("scope", "profile")])
        .with_header(AUTHORIZATION, &format!("Basic {credentials}"));

    let response = provider
        .process::<Token>(request)
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert!(field(&response, "access_token").is_some());
    assert_eq!(field(&response, "scope"), Some("profile"));
}

#[tokio::test]
async fn test_wrong_client_secret_is_rejected() {
    let provider = create_test_provider(ServerOptions::default()).await;

    let response = token(
        &provider,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", CLIENT_ID),
            ("client_secret", "guess"),
        ],
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(field(&response, "error"), Some("invalid_client"));
}

#[tokio::test]
async fn test_authorization_code_flow_with_pkce() {
    let provider = create_test_provider(interactive_options()).await;

    let redirect = authorize(&provider, PUBLIC_CLIENT_ID, "openid profile offline_access").await;
    assert_eq!(redirect.status, StatusCode::FOUND);
    assert!(redirect.location().unwrap().starts_with(REDIRECT_URI));
    let parameters = redirect.location_parameters();
    assert_eq!(parameters.state(), Some("af0ifjsldkj"));
    let code = parameters.code().unwrap().to_owned();

    let response = redeem_code(&provider, &code).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(field(&response, "access_token").is_some());
    assert!(field(&response, "refresh_token").is_some());
    assert_eq!(field(&response, "token_type"), Some("Bearer"));
}

#[tokio::test]
async fn test_wrong_code_verifier_is_rejected() {
    let provider = create_test_provider(interactive_options()).await;
    let redirect = authorize(&provider, PUBLIC_CLIENT_ID, "openid").await;
    let code = redirect.location_parameters().code().unwrap().to_owned();

    let response = token(
        &provider,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", "Zm9vYmFyYmF6cXV4Zm9vYmFyYmF6cXV4Zm9vYmFyYmF6cXV4"),
            ("client_id", PUBLIC_CLIENT_ID),
        ],
    )
    .await;

    assert_eq!(field(&response, "error"), Some("invalid_grant"));
}

#[tokio::test]
async fn test_replayed_code_revokes_the_issued_tokens() {
    let provider = create_test_provider(interactive_options()).await;
    let redirect = authorize(&provider, PUBLIC_CLIENT_ID, "openid offline_access").await;
    let code = redirect.location_parameters().code().unwrap().to_owned();

    let first = redeem_code(&provider, &code).await;
    let refresh_token = field(&first, "refresh_token").unwrap().to_owned();

    let replay = redeem_code(&provider, &code).await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(field(&replay, "error"), Some("invalid_grant"));

    let refreshed = token(
        &provider,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", PUBLIC_CLIENT_ID),
        ],
    )
    .await;
    assert_eq!(field(&refreshed, "error"), Some("invalid_grant"));
}

#[tokio::test]
async fn test_refresh_tokens_roll_over() {
    let provider = create_test_provider(interactive_options()).await;
    let redirect = authorize(&provider, PUBLIC_CLIENT_ID, "openid profile offline_access").await;
    let code = redirect.location_parameters().code().unwrap().to_owned();
    let issued = redeem_code(&provider, &code).await;
    let refresh_token = field(&issued, "refresh_token").unwrap().to_owned();

    let refresh = |token_value: String| {
        let provider = &provider;
        async move {
            token(
                provider,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", &token_value),
                    ("client_id", PUBLIC_CLIENT_ID),
                ],
            )
            .await
        }
    };

    let renewed = refresh(refresh_token.clone()).await;
    assert_eq!(renewed.status, StatusCode::OK);
    let next_refresh_token = field(&renewed, "refresh_token").unwrap().to_owned();
    assert_ne!(next_refresh_token, refresh_token);

    let reused = refresh(refresh_token).await;
    assert_eq!(field(&reused, "error"), Some("invalid_grant"));
}

#[tokio::test]
async fn test_refresh_cannot_widen_scopes() {
    let provider = create_test_provider(interactive_options()).await;
    let redirect = authorize(&provider, PUBLIC_CLIENT_ID, "openid offline_access").await;
    let code = redirect.location_parameters().code().unwrap().to_owned();
    let issued = redeem_code(&provider, &code).await;
    let refresh_token = field(&issued, "refresh_token").unwrap().to_owned();

    let response = token(
        &provider,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", PUBLIC_CLIENT_ID),
            ("scope", "openid profile"),
        ],
    )
    .await;
    assert_eq!(field(&response, "error"), Some("invalid_scope"));
}

#[tokio::test]
async fn test_unregistered_redirect_uri_is_not_followed() {
    let provider = create_test_provider(interactive_options()).await;
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", CLIENT_ID)
        .append_pair("redirect_uri", "https://evil.example.com/callback")
        .finish();

    let response = provider
        .process::<Authorization>(HostRequest::get(query))
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.location().is_none());
    assert_eq!(field(&response, "error"), Some("invalid_request"));
}

#[tokio::test]
async fn test_host_rejection_is_redirected_with_state() {
    let provider = create_test_provider(interactive_options()).await;
    let pending = provider
        .process::<Authorization>(HostRequest::get(authorization_query(PUBLIC_CLIENT_ID, "openid")))
        .await
        .unwrap()
        .into_pending()
        .unwrap();

    let response = provider
        .reject(
            pending,
            oidc_forge::OAuthError::new(
                oidc_forge_core::errors::ProtocolErrorCode::AccessDenied,
                "The user denied the request.",
            ),
        )
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::FOUND);
    let parameters = response.location_parameters();
    assert_eq!(parameters.get("error"), Some("access_denied"));
    assert_eq!(parameters.state(), Some("af0ifjsldkj"));
}

#[tokio::test]
async fn test_revoked_token_introspects_as_inactive() {
    let provider = create_test_provider(interactive_options()).await;
    let redirect = authorize(&provider, CLIENT_ID, "openid offline_access").await;
    let code = redirect.location_parameters().code().unwrap().to_owned();
    let issued = token(
        &provider,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", CODE_VERIFIER),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ],
    )
    .await;
    let refresh_token = field(&issued, "refresh_token").unwrap().to_owned();

    let introspect = |token_value: String| {
        let provider = &provider;
        async move {
            provider
                .process::<Introspection>(HostRequest::post_pairs([
                    ("token", token_value.as_str()),
                    ("client_id", CLIENT_ID),
                    ("client_secret", CLIENT_SECRET),
                ]))
                .await
                .unwrap()
                .into_response()
                .unwrap()
        }
    };

    let active = introspect(refresh_token.clone()).await;
    assert_eq!(common::body(&active)["active"], true);
    assert_eq!(field(&active, "sub"), Some("alice"));
    assert_eq!(field(&active, "client_id"), Some(CLIENT_ID));

    let revoked = provider
        .process::<Revocation>(HostRequest::post_pairs([
            ("token", refresh_token.as_str()),
            ("token_type_hint", "refresh_token"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(revoked.status, StatusCode::OK);

    let inactive = introspect(refresh_token).await;
    assert_eq!(common::body(&inactive)["active"], false);
}

#[tokio::test]
async fn test_userinfo_releases_claims_of_granted_scopes() {
    let provider = create_test_provider(interactive_options()).await;
    let redirect = authorize(&provider, PUBLIC_CLIENT_ID, "openid profile").await;
    let code = redirect.location_parameters().code().unwrap().to_owned();
    let issued = redeem_code(&provider, &code).await;
    let access_token = field(&issued, "access_token").unwrap().to_owned();

    let response = provider
        .process::<Userinfo>(HostRequest::get("").with_bearer(&access_token))
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(field(&response, "sub"), Some("alice"));
    assert_eq!(field(&response, "name"), Some("Alice Liddell"));

    let anonymous = provider
        .process::<Userinfo>(HostRequest::get(""))
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(anonymous.status, StatusCode::BAD_REQUEST);

    let forged = provider
        .process::<Userinfo>(HostRequest::get("").with_bearer("not-a-token"))
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    let challenge = forged.headers.get(WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.starts_with("Bearer error=\"invalid_token\""));
}

#[tokio::test]
async fn test_disabled_endpoint_rejects_requests() {
    let options = ServerOptions::default().without_endpoint(EndpointKind::Introspection);
    let provider = create_test_provider(options).await;

    let response = provider
        .process::<Introspection>(HostRequest::post_pairs([
            ("token", "anything"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(field(&response, "error"), Some("invalid_request"));
}

#[tokio::test]
async fn test_reference_access_tokens_are_opaque_identifiers() {
    let provider = create_test_provider(ServerOptions::default().with_reference_access_tokens()).await;

    let response = token(
        &provider,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ],
    )
    .await;

    let access_token = field(&response, "access_token").unwrap();
    assert_eq!(access_token.len(), 43);
    assert!(!access_token.contains('.'));
}

#[tokio::test]
async fn test_unrepresentable_lifetime_fails_without_panicking() {
    let mut options = ServerOptions::default();
    options.access_token_lifetime = chrono::Duration::seconds(10_000_000_000_000);
    let provider = create_test_provider(options).await;

    let error = provider
        .process::<Token>(HostRequest::post_pairs([
            ("grant_type", "client_credentials"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await
        .err()
        .expect("an expiration date past the calendar range is a configuration error");

    assert!(error.is_configuration());
    assert!(error.to_string().contains("access_token"));
}

struct UnreachableKeyVault;

impl KeyProvider for UnreachableKeyVault {
    fn master_key(&self) -> ForgeResult<Zeroizing<Vec<u8>>> {
        Err(ForgeError::backend_unavailable("key-vault", "connection refused"))
    }
}

#[tokio::test]
async fn test_unavailable_key_material_aborts_the_request() {
    let healthy = create_test_provider(ServerOptions::default()).await;
    let refresh_token = healthy
        .formats()
        .get(TokenFormatKind::Sealed)
        .write_token(&Principal::for_subject("alice"), TokenType::RefreshToken)
        .unwrap();

    let provider = ServerProvider::builder(ServerOptions::default())
        .with_key_provider(Arc::new(UnreachableKeyVault))
        .build()
        .unwrap();
    provider
        .resolver()
        .get::<Application>()
        .unwrap()
        .create(common::confidential_application())
        .await
        .unwrap();

    let issue = provider
        .process::<Token>(HostRequest::post_pairs([
            ("grant_type", "client_credentials"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await;
    assert!(matches!(issue, Err(ForgeError::TokenBackendUnavailable { .. })));

    let redeem = provider
        .process::<Token>(HostRequest::post_pairs([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await;
    assert!(matches!(redeem, Err(ForgeError::TokenBackendUnavailable { .. })));
}

#[tokio::test]
async fn test_tokens_of_either_format_are_accepted() {
    let provider =
        create_test_provider(ServerOptions::default().with_format(TokenFormatKind::Jwt)).await;

    for kind in [TokenFormatKind::Jwt, TokenFormatKind::Sealed] {
        let access_token = provider
            .formats()
            .get(kind)
            .write_token(&Principal::for_subject("alice"), TokenType::AccessToken)
            .unwrap();

        let response = provider
            .process::<Userinfo>(HostRequest::get("").with_bearer(&access_token))
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(response.status, StatusCode::OK, "{kind} token: {response:?}");
        assert_eq!(field(&response, "sub"), Some("alice"));
    }
}
