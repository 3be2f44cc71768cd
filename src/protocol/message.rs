// ABOUTME: OpenID Connect request and response parameter bags with typed accessors
// ABOUTME: Requests are parsed from host parameters; responses are rendered as JSON or query strings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::collections::BTreeMap;

use oidc_forge_core::constants::parameters;
use oidc_forge_core::errors::OAuthError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of an inbound OAuth2 / OpenID Connect request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenIdRequest {
    parameters: BTreeMap<String, String>,
}

impl OpenIdRequest {
    /// Create an empty request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a request from name/value pairs
    ///
    /// When a parameter is repeated the first occurrence wins; the
    /// validation handlers reject ambiguous requests separately.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut parameters = BTreeMap::new();
        for (name, value) in pairs {
            parameters.entry(name.into()).or_insert_with(|| value.into());
        }
        Self { parameters }
    }

    /// Get a parameter, treating empty values as absent
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Set a parameter
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Builder-style variant of [`OpenIdRequest::set`]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the request carries no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// `client_id`
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.get(parameters::CLIENT_ID)
    }

    /// `client_secret`
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.get(parameters::CLIENT_SECRET)
    }

    /// `grant_type`
    #[must_use]
    pub fn grant_type(&self) -> Option<&str> {
        self.get(parameters::GRANT_TYPE)
    }

    /// `response_type`
    #[must_use]
    pub fn response_type(&self) -> Option<&str> {
        self.get(parameters::RESPONSE_TYPE)
    }

    /// `redirect_uri`
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.get(parameters::REDIRECT_URI)
    }

    /// `post_logout_redirect_uri`
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> Option<&str> {
        self.get(parameters::POST_LOGOUT_REDIRECT_URI)
    }

    /// `state`
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.get(parameters::STATE)
    }

    /// `code`
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.get(parameters::CODE)
    }

    /// `code_challenge`
    #[must_use]
    pub fn code_challenge(&self) -> Option<&str> {
        self.get(parameters::CODE_CHALLENGE)
    }

    /// `code_challenge_method`
    #[must_use]
    pub fn code_challenge_method(&self) -> Option<&str> {
        self.get(parameters::CODE_CHALLENGE_METHOD)
    }

    /// `code_verifier`
    #[must_use]
    pub fn code_verifier(&self) -> Option<&str> {
        self.get(parameters::CODE_VERIFIER)
    }

    /// `refresh_token`
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.get(parameters::REFRESH_TOKEN)
    }

    /// `device_code`
    #[must_use]
    pub fn device_code(&self) -> Option<&str> {
        self.get(parameters::DEVICE_CODE)
    }

    /// `user_code`
    #[must_use]
    pub fn user_code(&self) -> Option<&str> {
        self.get(parameters::USER_CODE)
    }

    /// `token`
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.get(parameters::TOKEN)
    }

    /// `token_type_hint`
    #[must_use]
    pub fn token_type_hint(&self) -> Option<&str> {
        self.get(parameters::TOKEN_TYPE_HINT)
    }

    /// `access_token`
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.get(parameters::ACCESS_TOKEN)
    }

    /// `scope` as a raw string
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.get(parameters::SCOPE)
    }

    /// `scope` split into individual values
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope()
            .map(|scope| scope.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }
}

/// Parameters of an outbound OAuth2 / OpenID Connect response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenIdResponse {
    parameters: Map<String, Value>,
}

impl OpenIdResponse {
    /// Create an empty response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a parameter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Get a string parameter
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }

    /// Set a parameter
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Remove a parameter
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.parameters.remove(name)
    }

    /// Whether the response carries no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Iterate over the parameters
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.parameters.iter()
    }

    /// `access_token`
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.get_str(parameters::ACCESS_TOKEN)
    }

    /// `refresh_token`
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.get_str(parameters::REFRESH_TOKEN)
    }

    /// `code`
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.get_str(parameters::CODE)
    }

    /// `device_code`
    #[must_use]
    pub fn device_code(&self) -> Option<&str> {
        self.get_str(parameters::DEVICE_CODE)
    }

    /// `user_code`
    #[must_use]
    pub fn user_code(&self) -> Option<&str> {
        self.get_str(parameters::USER_CODE)
    }

    /// `error`
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.get_str(parameters::ERROR)
    }

    /// Copy an OAuth2 error into the response parameters
    pub fn set_error(&mut self, error: &OAuthError) -> &mut Self {
        self.set(parameters::ERROR, error.error.as_str());
        if let Some(description) = &error.error_description {
            self.set(parameters::ERROR_DESCRIPTION, description.as_str());
        }
        if let Some(uri) = &error.error_uri {
            self.set(parameters::ERROR_URI, uri.as_str());
        }
        self
    }

    /// Render the response as a JSON object
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.parameters.clone())
    }

    /// Render scalar parameters as `name=value` pairs for redirects
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .filter_map(|(name, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((name.clone(), rendered))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_wins_and_empty_is_absent() {
        let request = OpenIdRequest::from_pairs([
            ("client_id", "first"),
            ("client_id", "second"),
            ("state", ""),
        ]);

        assert_eq!(request.client_id(), Some("first"));
        assert_eq!(request.state(), None);
    }

    #[test]
    fn test_scopes_split_on_whitespace() {
        let request = OpenIdRequest::new().with("scope", "openid  profile\temail");
        assert_eq!(request.scopes(), vec!["openid", "profile", "email"]);
    }

    #[test]
    fn test_error_rendering() {
        let mut response = OpenIdResponse::new();
        response.set_error(&OAuthError::invalid_grant("expired"));

        assert_eq!(response.error(), Some("invalid_grant"));
        let pairs = response.to_query_pairs();
        assert!(pairs.contains(&("error_description".to_owned(), "expired".to_owned())));
    }
}
