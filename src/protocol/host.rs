// ABOUTME: Host-neutral HTTP request and response used to embed the engine behind any transport
// ABOUTME: Wraps http crate primitives and parses query strings and urlencoded forms
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use http::header::{HeaderName, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, LOCATION, PRAGMA};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::Value;
use url::Url;

use super::message::OpenIdRequest;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Inbound request handed over by the host transport
#[derive(Debug, Clone)]
pub struct HostRequest {
    /// HTTP method
    pub method: Method,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    /// Raw request body
    pub body: Option<String>,
    /// Request headers
    pub headers: HeaderMap,
}

impl HostRequest {
    /// Create a GET request with the given query string
    #[must_use]
    pub fn get(query: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            query: Some(query.into()),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Create a POST request carrying an urlencoded form
    #[must_use]
    pub fn post_form(body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        Self {
            method: Method::POST,
            query: None,
            body: Some(body.into()),
            headers,
        }
    }

    /// Create a POST request from name/value pairs
    #[must_use]
    pub fn post_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Self::post_form(body)
    }

    /// Add a header; invalid header values are ignored
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add an `Authorization: Bearer` header
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION, &format!("Bearer {token}"))
    }

    /// Whether the request body is an urlencoded form
    #[must_use]
    pub fn has_form_content_type(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value
                    .split(';')
                    .next()
                    .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
            })
    }

    /// Parameters from the query string
    #[must_use]
    pub fn query_parameters(&self) -> OpenIdRequest {
        parse_pairs(self.query.as_deref())
    }

    /// Parameters from the urlencoded form body
    #[must_use]
    pub fn form_parameters(&self) -> OpenIdRequest {
        parse_pairs(self.body.as_deref())
    }

    /// Token carried by an `Authorization: Bearer` header
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        let header = self.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }
}

fn parse_pairs(raw: Option<&str>) -> OpenIdRequest {
    raw.map_or_else(OpenIdRequest::new, |raw| {
        OpenIdRequest::from_pairs(url::form_urlencoded::parse(raw.as_bytes()).into_owned())
    })
}

/// Outbound response produced by the apply-response stage
#[derive(Debug, Clone)]
pub struct HostResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// JSON body, if any
    pub body: Option<Value>,
}

impl HostResponse {
    /// JSON response with cache-prevention headers
    #[must_use]
    pub fn json(status: StatusCode, body: Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json;charset=UTF-8"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        Self {
            status,
            headers,
            body: Some(body),
        }
    }

    /// Redirect to `location` with the given parameters appended to the query string
    #[must_use]
    pub fn redirect(location: &Url, parameters: &[(String, String)]) -> Self {
        let mut target = location.clone();
        if !parameters.is_empty() {
            target.query_pairs_mut().extend_pairs(parameters);
        }

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(target.as_str()) {
            headers.insert(LOCATION, value);
        }
        Self {
            status: StatusCode::FOUND,
            headers,
            body: None,
        }
    }

    /// Empty response with the given status
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Value of the `Location` header
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|value| value.to_str().ok())
    }

    /// Parameters of the redirect target's query string
    #[must_use]
    pub fn location_parameters(&self) -> OpenIdRequest {
        self.location()
            .and_then(|location| Url::parse(location).ok())
            .map_or_else(OpenIdRequest::new, |url| {
                OpenIdRequest::from_pairs(url.query_pairs().into_owned())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_parsing_decodes_values() {
        let request = HostRequest::post_form("client_id=app&redirect_uri=https%3A%2F%2Fa.example%2Fcb");
        assert!(request.has_form_content_type());

        let parameters = request.form_parameters();
        assert_eq!(parameters.client_id(), Some("app"));
        assert_eq!(parameters.redirect_uri(), Some("https://a.example/cb"));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let request = HostRequest::get("").with_bearer("abc.def");
        assert_eq!(request.bearer_token(), Some("abc.def"));

        let basic = HostRequest::get("").with_header(AUTHORIZATION, "Basic Zm9vOmJhcg==");
        assert_eq!(basic.bearer_token(), None);
    }

    #[test]
    fn test_redirect_appends_parameters() {
        let base = Url::parse("https://client.example/cb?keep=1").unwrap();
        let response = HostResponse::redirect(
            &base,
            &[("code".to_owned(), "xyz".to_owned()), ("state".to_owned(), "s 1".to_owned())],
        );

        assert_eq!(response.status, StatusCode::FOUND);
        let parameters = response.location_parameters();
        assert_eq!(parameters.get("keep"), Some("1"));
        assert_eq!(parameters.code(), Some("xyz"));
        assert_eq!(parameters.state(), Some("s 1"));
    }
}
