// ABOUTME: Resource-server validation tests against tokens issued by a co-located server
// ABOUTME: Covers bearer extraction, audiences, expiration, reference tokens and revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use chrono::{Duration, Utc};
use http::StatusCode;
use oidc_forge::config::{ServerOptions, ValidationOptions};
use oidc_forge::formats::TokenFormatKind;
use oidc_forge::principal::Principal;
use oidc_forge::protocol::HostRequest;
use oidc_forge::server::{Revocation, ServerProvider, Token};
use oidc_forge::validation::{ValidationProvider, ValidationResult};
use oidc_forge_core::errors::ProtocolErrorCode;
use oidc_forge_core::models::TokenType;

use common::{create_test_provider, field, CLIENT_ID, CLIENT_SECRET};

async fn issue_access_token(provider: &ServerProvider) -> String {
    let response = provider
        .process::<Token>(HostRequest::post_pairs([
            ("grant_type", "client_credentials"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
            ("scope", "profile"),
        ]))
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(response.status, StatusCode::OK, "{response:?}");
    field(&response, "access_token").unwrap().to_owned()
}

fn validator(provider: &ServerProvider, options: ValidationOptions) -> ValidationProvider {
    ValidationProvider::builder(options)
        .with_formats(provider.formats().clone())
        .with_resolver(provider.resolver().clone())
        .build()
        .unwrap()
}

fn rejection(result: &ValidationResult) -> ProtocolErrorCode {
    match result {
        ValidationResult::Invalid(error) => error.error,
        ValidationResult::Valid(principal) => panic!("unexpectedly valid: {principal:?}"),
    }
}

#[tokio::test]
async fn test_bearer_token_issued_by_the_server_is_accepted() {
    let provider = create_test_provider(ServerOptions::default()).await;
    let token = issue_access_token(&provider).await;
    let validator = validator(&provider, ValidationOptions::default());

    let result = validator
        .authenticate(HostRequest::get("").with_bearer(&token))
        .await
        .unwrap();

    let principal = result.principal().expect("token should be valid");
    assert!(principal.has_scope("profile"));
    assert_eq!(principal.token_type(), Some(TokenType::AccessToken));
    assert!(result.challenge().is_none());
}

#[tokio::test]
async fn test_missing_and_forged_tokens_are_rejected_with_a_challenge() {
    let provider = create_test_provider(ServerOptions::default()).await;
    let validator = validator(&provider, ValidationOptions::default());

    let missing = validator.authenticate(HostRequest::get("")).await.unwrap();
    assert_eq!(rejection(&missing), ProtocolErrorCode::InvalidToken);

    let forged = validator
        .authenticate(HostRequest::get("").with_bearer("forged"))
        .await
        .unwrap();
    assert_eq!(rejection(&forged), ProtocolErrorCode::InvalidToken);
    assert!(forged
        .challenge()
        .unwrap()
        .starts_with("Bearer error=\"invalid_token\""));
}

#[tokio::test]
async fn test_token_sent_twice_is_an_invalid_request() {
    let provider = create_test_provider(ServerOptions::default()).await;
    let token = issue_access_token(&provider).await;
    let validator = validator(&provider, ValidationOptions::default());

    let request = HostRequest::get(&format!("access_token={token}")).with_bearer(&token);
    let result = validator.authenticate(request).await.unwrap();
    assert_eq!(rejection(&result), ProtocolErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_audience_restriction() {
    let provider = create_test_provider(ServerOptions::default()).await;
    let validator = validator(&provider, ValidationOptions::default().with_audience("orders-api"));

    // Client credentials tokens carry no audience unless requested.
    let token = issue_access_token(&provider).await;
    let result = validator.validate_token(&token).await.unwrap();
    assert_eq!(rejection(&result), ProtocolErrorCode::InvalidToken);

    let mut principal = Principal::for_subject("alice");
    principal.set_audiences(["orders-api"]);
    let bound = provider
        .formats()
        .get(TokenFormatKind::Sealed)
        .write_token(&principal, TokenType::AccessToken)
        .unwrap();
    let result = validator.validate_token(&bound).await.unwrap();
    assert_eq!(result.principal().and_then(Principal::subject), Some("alice"));
}

#[tokio::test]
async fn test_expired_tokens_are_rejected() {
    let provider = create_test_provider(ServerOptions::default()).await;
    let validator = validator(&provider, ValidationOptions::default());

    let mut principal = Principal::for_subject("alice");
    principal.set_expiration_date(Utc::now() - Duration::minutes(5));
    let expired = provider
        .formats()
        .get(TokenFormatKind::Sealed)
        .write_token(&principal, TokenType::AccessToken)
        .unwrap();

    let result = validator.validate_token(&expired).await.unwrap();
    assert_eq!(rejection(&result), ProtocolErrorCode::InvalidToken);
}

#[tokio::test]
async fn test_jwt_tokens_are_read_by_a_sealed_validator() {
    let provider =
        create_test_provider(ServerOptions::default().with_format(TokenFormatKind::Jwt)).await;
    let token = issue_access_token(&provider).await;
    assert_eq!(token.split('.').count(), 3);

    let validator = validator(&provider, ValidationOptions::default());
    let result = validator.validate_token(&token).await.unwrap();
    assert!(result.principal().is_some());
}

#[tokio::test]
async fn test_reference_tokens_require_entry_validation_and_follow_revocation() {
    let provider =
        create_test_provider(ServerOptions::default().with_reference_access_tokens()).await;
    let reference = issue_access_token(&provider).await;

    let without_entries = validator(&provider, ValidationOptions::default());
    let result = without_entries.validate_token(&reference).await.unwrap();
    assert_eq!(rejection(&result), ProtocolErrorCode::InvalidToken);

    let with_entries = validator(
        &provider,
        ValidationOptions::default().with_token_entry_validation(),
    );
    let result = with_entries.validate_token(&reference).await.unwrap();
    assert!(result.principal().is_some(), "{result:?}");

    let revoked = provider
        .process::<Revocation>(HostRequest::post_pairs([
            ("token", reference.as_str()),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ]))
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(revoked.status, StatusCode::OK);

    let result = with_entries.validate_token(&reference).await.unwrap();
    assert_eq!(rejection(&result), ProtocolErrorCode::InvalidToken);
}

#[test]
fn test_entry_validation_without_store_is_a_configuration_error() {
    let error = ValidationProvider::builder(
        ValidationOptions::default()
            .with_signing_key("BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=")
            .with_token_entry_validation(),
    )
    .build()
    .err()
    .expect("entry validation needs a store");
    assert!(error.is_configuration());
}

#[test]
fn test_validator_without_key_material_is_a_configuration_error() {
    let error = ValidationProvider::builder(ValidationOptions::default())
        .build()
        .err()
        .expect("key material is required");
    assert!(error.is_configuration());
}
