// ABOUTME: Request extraction, passthrough and JSON rendering handlers shared by the endpoints
// ABOUTME: Generic over the endpoint marker so each endpoint registers its own copy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use http::{Method, StatusCode};
use oidc_forge_core::constants::parameters;
use oidc_forge_core::errors::{ForgeResult, OAuthError, ProtocolErrorCode};
use tracing::debug;

use crate::pipeline::{EventContext, Handler};
use crate::protocol::{HostRequest, HostResponse, OpenIdRequest};
use crate::server::endpoints::Endpoint;
use crate::server::events::{ApplyResponseContext, ExtractRequestContext, HandleRequestContext};
use crate::stateless_handlers;

/// HTTP status matching an optional rejection
#[must_use]
pub fn status_for(error: Option<&OAuthError>) -> StatusCode {
    error.map_or(StatusCode::OK, |error| {
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::BAD_REQUEST)
    })
}

/// Whether a PKCE value has the RFC 7636 shape: 43 to 128 unreserved characters
#[must_use]
pub fn is_valid_pkce_value(value: &str) -> bool {
    (43..=128).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Rejects requests sent to a disabled endpoint
#[derive(Debug, Default)]
pub struct RejectDisabledEndpoint;

impl RejectDisabledEndpoint {
    /// Runs before any extraction
    pub const ORDER: i32 = i32::MIN + 100_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ExtractRequestContext<E>> for RejectDisabledEndpoint {
    async fn handle(&self, context: &mut ExtractRequestContext<E>) -> ForgeResult<()> {
        if !context.options().is_endpoint_enabled(E::KIND) {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                format!("The {} endpoint is not enabled.", E::KIND),
            );
        }
        Ok(())
    }
}

/// Reads parameters from the query string (GET) or the form body (POST)
#[derive(Debug, Default)]
pub struct ExtractGetOrPostRequest;

impl ExtractGetOrPostRequest {
    /// Sort key
    pub const ORDER: i32 = RejectDisabledEndpoint::ORDER + 1_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ExtractRequestContext<E>> for ExtractGetOrPostRequest {
    async fn handle(&self, context: &mut ExtractRequestContext<E>) -> ForgeResult<()> {
        extract(context, true);
        Ok(())
    }
}

/// Reads parameters from the form body, rejecting any other method
#[derive(Debug, Default)]
pub struct ExtractPostRequest;

impl ExtractPostRequest {
    /// Sort key
    pub const ORDER: i32 = RejectDisabledEndpoint::ORDER + 1_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ExtractRequestContext<E>> for ExtractPostRequest {
    async fn handle(&self, context: &mut ExtractRequestContext<E>) -> ForgeResult<()> {
        extract(context, false);
        Ok(())
    }
}

// Transactions created without a host request keep the parameters the
// host already filled in.
fn extract<C: EventContext>(context: &mut C, allow_get: bool) {
    let Some(host) = context.transaction().host_request.as_ref() else {
        return;
    };

    match parse_host_request(host, allow_get) {
        Ok(request) => {
            debug!(
                transaction = %context.transaction().id(),
                parameters = request.len(),
                "protocol request extracted"
            );
            context.transaction_mut().request = request;
        }
        Err(error) => context.transaction_mut().reject(error),
    }
}

fn parse_host_request(host: &HostRequest, allow_get: bool) -> Result<OpenIdRequest, OAuthError> {
    if host.method == Method::GET && allow_get {
        return Ok(host.query_parameters());
    }
    if host.method != Method::POST {
        return Err(OAuthError::invalid_request("The specified HTTP method is not valid."));
    }
    if !host.has_form_content_type() {
        return Err(OAuthError::invalid_request(
            "The specified 'Content-Type' header is not valid; use application/x-www-form-urlencoded.",
        ));
    }
    Ok(host.form_parameters())
}

/// Reads client credentials from an `Authorization: Basic` header
#[derive(Debug, Default)]
pub struct ExtractBasicCredentials;

impl ExtractBasicCredentials {
    /// Sort key
    pub const ORDER: i32 = ExtractPostRequest::ORDER + 1_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ExtractRequestContext<E>> for ExtractBasicCredentials {
    async fn handle(&self, context: &mut ExtractRequestContext<E>) -> ForgeResult<()> {
        let credentials = context
            .transaction()
            .host_request
            .as_ref()
            .and_then(|host| host.headers.get(AUTHORIZATION))
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("basic"))
            .map(|(_, encoded)| decode_basic(encoded.trim()));

        let Some(credentials) = credentials else {
            return Ok(());
        };
        let Some((client_id, client_secret)) = credentials else {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The specified basic authentication header is malformed.",
            );
            return Ok(());
        };

        let request = &context.transaction().request;
        if request.client_secret().is_some()
            || request.client_id().is_some_and(|id| id != client_id)
        {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                "Multiple client credentials cannot be specified.",
            );
            return Ok(());
        }

        let request = &mut context.transaction_mut().request;
        request.set(parameters::CLIENT_ID, client_id);
        request.set(parameters::CLIENT_SECRET, client_secret);
        Ok(())
    }
}

fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    (!client_id.is_empty()).then(|| (client_id.to_owned(), client_secret.to_owned()))
}

/// Hands the request over to the host application
#[derive(Debug, Default)]
pub struct EnablePassthroughMode;

impl EnablePassthroughMode {
    /// Runs before the default handle handlers
    pub const ORDER: i32 = i32::MIN + 100_000;
}

#[async_trait]
impl<E: Endpoint> Handler<HandleRequestContext<E>> for EnablePassthroughMode {
    async fn handle(&self, context: &mut HandleRequestContext<E>) -> ForgeResult<()> {
        debug!(
            transaction = %context.transaction().id(),
            endpoint = %E::KIND,
            "passthrough enabled, handing the request to the host"
        );
        context.transaction_mut().skip_request();
        Ok(())
    }
}

/// Renders the response parameters as a JSON document
#[derive(Debug, Default)]
pub struct ApplyJsonResponse;

impl ApplyJsonResponse {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ApplyResponseContext<E>> for ApplyJsonResponse {
    async fn handle(&self, context: &mut ApplyResponseContext<E>) -> ForgeResult<()> {
        let status = status_for(context.error.as_ref());
        context.response = Some(HostResponse::json(
            status,
            context.transaction().response.to_json(),
        ));
        Ok(())
    }
}

stateless_handlers!(
    RejectDisabledEndpoint,
    ExtractGetOrPostRequest,
    ExtractPostRequest,
    ExtractBasicCredentials,
    EnablePassthroughMode,
    ApplyJsonResponse,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_value_shape() {
        assert!(is_valid_pkce_value(&"a".repeat(43)));
        assert!(!is_valid_pkce_value(&"a".repeat(42)));
        assert!(!is_valid_pkce_value(&"a".repeat(129)));
        assert!(!is_valid_pkce_value(&format!("{}+", "a".repeat(43))));
    }

    #[test]
    fn test_basic_credentials_decoding() {
        let encoded = STANDARD.encode("console:s3cret:with-colon");
        assert_eq!(
            decode_basic(&encoded),
            Some(("console".to_owned(), "s3cret:with-colon".to_owned()))
        );
        assert_eq!(decode_basic("%%%"), None);
        assert_eq!(decode_basic(&STANDARD.encode(":secret")), None);
    }

    #[test]
    fn test_get_is_rejected_when_only_post_is_allowed() {
        let host = HostRequest::get("client_id=app");
        assert!(parse_host_request(&host, true).is_ok());
        let error = parse_host_request(&host, false).unwrap_err();
        assert_eq!(error.error, ProtocolErrorCode::InvalidRequest);
    }

    #[test]
    fn test_error_status() {
        assert_eq!(status_for(None), StatusCode::OK);
        assert_eq!(
            status_for(Some(&OAuthError::invalid_client("bad secret"))),
            StatusCode::UNAUTHORIZED
        );
    }
}
