// ABOUTME: Endpoint markers keying the per-endpoint stage contexts
// ABOUTME: Each marker states which token, if any, the endpoint authenticates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use oidc_forge_core::constants::{grant_types, parameters, token_type_hints};
use oidc_forge_core::errors::ProtocolErrorCode;
use oidc_forge_core::models::TokenType;

use crate::protocol::{EndpointKind, OpenIdRequest};

/// Token an endpoint asks the authentication stage to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDemand {
    /// Parameter the token was read from
    pub parameter: &'static str,
    /// Raw token, `None` when the parameter is missing
    pub token: Option<String>,
    /// Token types tried in order
    pub candidates: Vec<TokenType>,
    /// Whether a missing or invalid token rejects the request
    pub required: bool,
    /// Error code used when a required token is invalid
    pub error: ProtocolErrorCode,
}

impl TokenDemand {
    fn required(
        request: &OpenIdRequest,
        parameter: &'static str,
        token_type: TokenType,
        error: ProtocolErrorCode,
    ) -> Self {
        Self {
            parameter,
            token: request.get(parameter).map(str::to_owned),
            candidates: vec![token_type],
            required: true,
            error,
        }
    }

    fn optional(request: &OpenIdRequest) -> Self {
        Self {
            parameter: parameters::TOKEN,
            token: request.token().map(str::to_owned),
            candidates: hinted_candidates(request.token_type_hint()),
            required: false,
            error: ProtocolErrorCode::InvalidToken,
        }
    }
}

/// Candidate order for introspection and revocation, honouring `token_type_hint`
#[must_use]
pub fn hinted_candidates(hint: Option<&str>) -> Vec<TokenType> {
    let preferred = match hint {
        Some(token_type_hints::REFRESH_TOKEN) => Some(TokenType::RefreshToken),
        Some(token_type_hints::ACCESS_TOKEN) => Some(TokenType::AccessToken),
        Some(other) => TokenType::parse(other),
        None => None,
    };

    let mut candidates = Vec::with_capacity(TokenType::CANDIDATES.len());
    candidates.extend(preferred);
    candidates.extend(
        TokenType::CANDIDATES
            .into_iter()
            .filter(|candidate| Some(*candidate) != preferred),
    );
    candidates
}

/// Endpoint served by the authorization server
///
/// Markers are zero-sized; they only exist so that every (stage, endpoint)
/// pair is its own context type and therefore its own handler pipeline.
pub trait Endpoint: Send + Sync + 'static {
    /// Endpoint family
    const KIND: EndpointKind;

    /// Token the authentication stage must resolve for this request
    fn token_demand(_request: &OpenIdRequest) -> Option<TokenDemand> {
        None
    }
}

/// Authorization endpoint (`response_type=code`)
#[derive(Debug, Clone, Copy, Default)]
pub struct Authorization;

impl Endpoint for Authorization {
    const KIND: EndpointKind = EndpointKind::Authorization;
}

/// Token endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct Token;

impl Endpoint for Token {
    const KIND: EndpointKind = EndpointKind::Token;

    fn token_demand(request: &OpenIdRequest) -> Option<TokenDemand> {
        let (parameter, token_type) = match request.grant_type()? {
            grant_types::AUTHORIZATION_CODE => (parameters::CODE, TokenType::AuthorizationCode),
            grant_types::REFRESH_TOKEN => (parameters::REFRESH_TOKEN, TokenType::RefreshToken),
            grant_types::DEVICE_CODE => (parameters::DEVICE_CODE, TokenType::DeviceCode),
            _ => return None,
        };
        Some(TokenDemand::required(
            request,
            parameter,
            token_type,
            ProtocolErrorCode::InvalidGrant,
        ))
    }
}

/// Introspection endpoint (RFC 7662)
#[derive(Debug, Clone, Copy, Default)]
pub struct Introspection;

impl Endpoint for Introspection {
    const KIND: EndpointKind = EndpointKind::Introspection;

    fn token_demand(request: &OpenIdRequest) -> Option<TokenDemand> {
        Some(TokenDemand::optional(request))
    }
}

/// Revocation endpoint (RFC 7009)
#[derive(Debug, Clone, Copy, Default)]
pub struct Revocation;

impl Endpoint for Revocation {
    const KIND: EndpointKind = EndpointKind::Revocation;

    fn token_demand(request: &OpenIdRequest) -> Option<TokenDemand> {
        Some(TokenDemand::optional(request))
    }
}

/// Userinfo endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct Userinfo;

impl Endpoint for Userinfo {
    const KIND: EndpointKind = EndpointKind::Userinfo;

    fn token_demand(request: &OpenIdRequest) -> Option<TokenDemand> {
        Some(TokenDemand::required(
            request,
            parameters::ACCESS_TOKEN,
            TokenType::AccessToken,
            ProtocolErrorCode::InvalidToken,
        ))
    }
}

/// Device authorization endpoint (RFC 8628)
#[derive(Debug, Clone, Copy, Default)]
pub struct Device;

impl Endpoint for Device {
    const KIND: EndpointKind = EndpointKind::Device;
}

/// End-session endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct Logout;

impl Endpoint for Logout {
    const KIND: EndpointKind = EndpointKind::Logout;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_moves_candidate_first() {
        assert_eq!(
            hinted_candidates(Some("refresh_token")),
            vec![
                TokenType::RefreshToken,
                TokenType::AccessToken,
                TokenType::AuthorizationCode,
                TokenType::DeviceCode,
                TokenType::UserCode,
            ]
        );
        assert_eq!(hinted_candidates(None), TokenType::CANDIDATES.to_vec());
        assert_eq!(hinted_candidates(Some("id_token")), TokenType::CANDIDATES.to_vec());
    }

    #[test]
    fn test_token_endpoint_demand_per_grant() {
        let request = OpenIdRequest::new()
            .with("grant_type", "authorization_code")
            .with("code", "abc");
        let demand = Token::token_demand(&request).unwrap();
        assert_eq!(demand.candidates, vec![TokenType::AuthorizationCode]);
        assert_eq!(demand.token.as_deref(), Some("abc"));
        assert!(demand.required);

        let request = OpenIdRequest::new().with("grant_type", "client_credentials");
        assert!(Token::token_demand(&request).is_none());
        assert!(Authorization::token_demand(&request).is_none());
    }
}
