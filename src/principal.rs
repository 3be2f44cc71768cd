// ABOUTME: Claims-bearing principal produced by validation and sign-in handlers
// ABOUTME: Typed accessors over a deterministic claim map, including private token metadata
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use oidc_forge_core::constants::claims;
use oidc_forge_core::models::TokenType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claims-bearing identity carried by tokens
///
/// Claims are kept in a `BTreeMap` so serialization is deterministic, which
/// keeps sealed tokens and JWT payloads stable for identical principals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal {
    claims: BTreeMap<String, Value>,
}

impl Principal {
    /// Create an empty principal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a principal for the given subject
    #[must_use]
    pub fn for_subject(subject: impl Into<String>) -> Self {
        let mut principal = Self::new();
        principal.set_subject(subject);
        principal
    }

    /// Build a principal from a raw claim map
    #[must_use]
    pub const fn from_claims(claims: BTreeMap<String, Value>) -> Self {
        Self { claims }
    }

    /// Consume the principal and return its claims
    #[must_use]
    pub fn into_claims(self) -> BTreeMap<String, Value> {
        self.claims
    }

    /// Iterate over all claims
    pub fn claims(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.claims.iter()
    }

    /// Get a claim value
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Get a string claim
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// Whether the claim is present
    #[must_use]
    pub fn has_claim(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    /// Set a claim, replacing any previous value
    pub fn set_claim(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Builder-style variant of [`Principal::set_claim`]
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_claim(name, value);
        self
    }

    /// Remove a claim
    pub fn remove_claim(&mut self, name: &str) -> Option<Value> {
        self.claims.remove(name)
    }

    /// Subject identifier
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claim_str(claims::SUBJECT)
    }

    /// Set the subject identifier
    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.set_claim(claims::SUBJECT, subject.into())
    }

    /// Token usage stored in the private claim
    #[must_use]
    pub fn token_type(&self) -> Option<TokenType> {
        self.claim_str(claims::private::TOKEN_USAGE)
            .and_then(TokenType::parse)
    }

    /// Set the token usage
    pub fn set_token_type(&mut self, token_type: TokenType) -> &mut Self {
        self.set_claim(claims::private::TOKEN_USAGE, token_type.as_str())
    }

    /// Identifier of the stored token entry
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        self.claim_str(claims::private::TOKEN_ID)
    }

    /// Set the identifier of the stored token entry
    pub fn set_token_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.set_claim(claims::private::TOKEN_ID, id.into())
    }

    /// Identifier of the authorization entry
    #[must_use]
    pub fn authorization_id(&self) -> Option<&str> {
        self.claim_str(claims::private::AUTHORIZATION_ID)
    }

    /// Set the identifier of the authorization entry
    pub fn set_authorization_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.set_claim(claims::private::AUTHORIZATION_ID, id.into())
    }

    /// Granted scopes
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.string_array(claims::private::SCOPES)
    }

    /// Replace the granted scopes
    pub fn set_scopes<I, S>(&mut self, scopes: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_string_array(claims::private::SCOPES, scopes)
    }

    /// Whether the scope was granted
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().iter().any(|s| s == scope)
    }

    /// Audiences
    #[must_use]
    pub fn audiences(&self) -> Vec<String> {
        self.string_array(claims::AUDIENCE)
    }

    /// Replace the audiences
    pub fn set_audiences<I, S>(&mut self, audiences: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_string_array(claims::AUDIENCE, audiences)
    }

    /// Presenters (clients allowed to use the token)
    #[must_use]
    pub fn presenters(&self) -> Vec<String> {
        self.string_array(claims::private::PRESENTERS)
    }

    /// Replace the presenters
    pub fn set_presenters<I, S>(&mut self, presenters: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_string_array(claims::private::PRESENTERS, presenters)
    }

    /// Creation date (`iat`)
    #[must_use]
    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.timestamp(claims::ISSUED_AT)
    }

    /// Set the creation date
    pub fn set_creation_date(&mut self, date: DateTime<Utc>) -> &mut Self {
        self.set_claim(claims::ISSUED_AT, date.timestamp())
    }

    /// Expiration date (`exp`)
    #[must_use]
    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        self.timestamp(claims::EXPIRES_AT)
    }

    /// Set the expiration date
    pub fn set_expiration_date(&mut self, date: DateTime<Utc>) -> &mut Self {
        self.set_claim(claims::EXPIRES_AT, date.timestamp())
    }

    /// Whether the principal has expired at the given instant
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date()
            .is_some_and(|expiration| expiration <= now)
    }

    fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        let seconds = self.claims.get(name)?.as_i64()?;
        Utc.timestamp_opt(seconds, 0).single()
    }

    fn string_array(&self, name: &str) -> Vec<String> {
        match self.claims.get(name) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(value)) => vec![value.clone()],
            _ => Vec::new(),
        }
    }

    fn set_string_array<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = values
            .into_iter()
            .map(|value| Value::String(value.into()))
            .collect();
        self.set_claim(name, Value::Array(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_typed_accessors() {
        let mut principal = Principal::for_subject("alice");
        principal
            .set_token_type(TokenType::RefreshToken)
            .set_scopes(["openid", "offline_access"])
            .set_audiences(["api"]);

        assert_eq!(principal.subject(), Some("alice"));
        assert_eq!(principal.token_type(), Some(TokenType::RefreshToken));
        assert!(principal.has_scope("offline_access"));
        assert!(!principal.has_scope("email"));
        assert_eq!(principal.audiences(), vec!["api".to_owned()]);
    }

    #[test]
    fn test_single_string_audience_is_accepted() {
        let principal = Principal::new().with_claim(claims::AUDIENCE, "api");
        assert_eq!(principal.audiences(), vec!["api".to_owned()]);
    }

    #[test]
    fn test_expiration() {
        let now = Utc::now();
        let mut principal = Principal::for_subject("bob");
        assert!(!principal.is_expired_at(now));

        principal.set_expiration_date(now - Duration::seconds(5));
        assert!(principal.is_expired_at(now));
    }
}
