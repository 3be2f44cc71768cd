// ABOUTME: Authentication stage: resolves, decodes and validates the token an endpoint demands
// ABOUTME: Reference lookup, candidate decoding, expiration, store entry checks and redemption
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use oidc_forge_core::constants::properties;
use oidc_forge_core::errors::{ForgeError, ForgeResult, OAuthError, ProtocolErrorCode};
use oidc_forge_core::models::{Authorization, AuthorizationStatus, Token, TokenStatus, TokenType};
use oidc_forge_core::pagination::Page;
use tracing::{debug, info, trace};

use crate::formats::{read_token_with_candidates, TokenFormatKind, TokenFormats};
use crate::pipeline::{
    ErasedDescriptor, EventContext, FromServices, Handler, HandlerDescriptor, ServiceProvider,
};
use crate::protocol::EndpointKind;
use crate::server::events::ProcessAuthenticationContext;
use crate::server::filters::{
    RequirePrincipal, RequireTokenStorageEnabled, RequireUndecodedToken,
};
use crate::stateless_handlers;
use crate::stores::{StoreExt, StoreResolver};

type Context = ProcessAuthenticationContext;

/// Stored entry backing the authenticated token
#[must_use]
pub fn token_entry(context: &Context) -> Option<&Token> {
    context.transaction().property::<Token>(properties::TOKEN_ENTRY)
}

// Refresh tokens roll: each redemption issues a new one.
const fn is_single_use(token_type: TokenType) -> bool {
    matches!(
        token_type,
        TokenType::AuthorizationCode | TokenType::DeviceCode | TokenType::RefreshToken
    )
}

/// Rejects requests whose demanded token is missing
#[derive(Debug, Default)]
pub struct ValidateTokenPresence;

impl ValidateTokenPresence {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<Context> for ValidateTokenPresence {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        if context.token.is_none() && context.demand.required {
            let description = format!(
                "The mandatory '{}' parameter is missing.",
                context.demand.parameter
            );
            context.reject(ProtocolErrorCode::InvalidRequest, description);
        }
        Ok(())
    }
}

/// Swaps a reference identifier for the payload stored in its token entry
pub struct ResolveReferenceToken {
    resolver: Arc<StoreResolver>,
}

impl ResolveReferenceToken {
    /// Sort key
    pub const ORDER: i32 = ValidateTokenPresence::ORDER + 1_000;
}

impl FromServices for ResolveReferenceToken {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for ResolveReferenceToken {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let Some(token) = context.token.clone() else {
            return Ok(());
        };

        let store = self.resolver.get::<Token>()?;
        let entry = store
            .find_first_where(&|entry: &Token| entry.reference_id.as_deref() == Some(token.as_str()))
            .await?;
        let Some(entry) = entry else {
            return Ok(());
        };

        match entry.payload.clone() {
            Some(payload) => {
                trace!(token_type = %entry.token_type, "reference identifier resolved");
                context.token = Some(payload);
                context
                    .transaction_mut()
                    .set_property(properties::TOKEN_ENTRY, entry);
            }
            None => {
                context.token = None;
                context.fail("The specified token has no stored payload.");
            }
        }
        Ok(())
    }
}

// Decode with one format and attach the principal when a candidate matches.
fn decode_with(
    formats: &TokenFormats,
    kind: TokenFormatKind,
    context: &mut Context,
) -> ForgeResult<()> {
    let Some(token) = context.token.clone() else {
        return Ok(());
    };
    let decoded = read_token_with_candidates(formats.get(kind), &token, &context.demand.candidates)?;
    let Some((token_type, principal)) = decoded else {
        trace!(format = %kind, "token not readable by this format");
        return Ok(());
    };

    if token_entry(context).is_some_and(|entry| entry.token_type != token_type) {
        context.token = None;
        context.fail("The specified token does not match its stored entry.");
        return Ok(());
    }

    context.token_type = Some(token_type);
    context.transaction_mut().principal = Some(principal);
    Ok(())
}

/// Define a handler decoding the token with one format
macro_rules! format_decoder {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $order:expr) => {
        $(#[$doc])*
        pub struct $name {
            formats: Arc<TokenFormats>,
        }

        impl $name {
            /// Sort key
            pub const ORDER: i32 = $order;
        }

        impl FromServices for $name {
            fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
                Ok(Self {
                    formats: services.require::<TokenFormats>()?,
                })
            }
        }

        #[async_trait]
        impl Handler<Context> for $name {
            async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
                decode_with(&self.formats, $kind, context)
            }
        }
    };
}

format_decoder!(
    /// Decodes JWT tokens
    DecodeJwtToken,
    TokenFormatKind::Jwt,
    ResolveReferenceToken::ORDER + 1_000
);

format_decoder!(
    /// Decodes sealed tokens the JWT decoder did not read
    DecodeSealedToken,
    TokenFormatKind::Sealed,
    DecodeJwtToken::ORDER + 500
);

/// Rejects a token no format could read
#[derive(Debug, Default)]
pub struct RejectUndecodedToken;

impl RejectUndecodedToken {
    /// Sort key
    pub const ORDER: i32 = DecodeSealedToken::ORDER + 400;
}

#[async_trait]
impl Handler<Context> for RejectUndecodedToken {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        debug!(
            transaction = %context.transaction().id(),
            parameter = context.demand.parameter,
            "token could not be decoded"
        );
        let description = format!("The specified '{}' is invalid.", context.demand.parameter);
        context.fail(&description);
        Ok(())
    }
}

/// Rejects expired tokens
#[derive(Debug, Default)]
pub struct ValidateExpiration;

impl ValidateExpiration {
    /// Sort key
    pub const ORDER: i32 = DecodeJwtToken::ORDER + 1_000;
}

#[async_trait]
impl Handler<Context> for ValidateExpiration {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let expired = context
            .transaction()
            .principal
            .as_ref()
            .is_some_and(|principal| principal.is_expired_at(Utc::now()));
        if !expired {
            return Ok(());
        }

        if context.token_type == Some(TokenType::DeviceCode) && context.demand.required {
            context.reject(ProtocolErrorCode::ExpiredToken, "The specified device code has expired.");
        } else {
            context.fail("The specified token has expired.");
        }
        Ok(())
    }
}

/// Checks the store entry of the token
///
/// Replaying a redeemed authorization code revokes every token issued under
/// the same authorization.
pub struct ValidateTokenEntry {
    resolver: Arc<StoreResolver>,
}

impl ValidateTokenEntry {
    /// Sort key
    pub const ORDER: i32 = ValidateExpiration::ORDER + 1_000;
}

impl FromServices for ValidateTokenEntry {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for ValidateTokenEntry {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let Some(token_id) = context
            .transaction()
            .principal
            .as_ref()
            .and_then(|principal| principal.token_id().map(str::to_owned))
        else {
            return Ok(());
        };

        let entry = match token_entry(context) {
            Some(entry) => Some(entry.clone()),
            None => self.resolver.get::<Token>()?.find_by_id(&token_id).await?,
        };
        let Some(entry) = entry else {
            context.fail("The specified token is no longer valid.");
            return Ok(());
        };

        let required = context.demand.required;
        let token_type = entry.token_type;
        let rejection = match entry.status {
            _ if entry.is_expired_at(Utc::now()) => {
                Some(OAuthError::new(context.demand.error, "The specified token has expired."))
            }
            TokenStatus::Valid => None,
            TokenStatus::Redeemed if is_single_use(token_type) && required => {
                if let Some(authorization_id) = entry.authorization_id.as_deref() {
                    self.revoke_authorization_tokens(authorization_id).await?;
                }
                info!(token_id = %token_id, token_type = %token_type, "replayed token, authorization revoked");
                Some(OAuthError::invalid_grant("The specified token has already been redeemed."))
            }
            TokenStatus::Revoked if token_type == TokenType::DeviceCode && required => Some(
                OAuthError::new(ProtocolErrorCode::AccessDenied, "The device authorization was denied."),
            ),
            TokenStatus::Inactive if token_type == TokenType::DeviceCode && required => Some(
                OAuthError::new(
                    ProtocolErrorCode::AuthorizationPending,
                    "The device authorization is still pending.",
                ),
            ),
            TokenStatus::Redeemed | TokenStatus::Revoked | TokenStatus::Inactive => Some(
                OAuthError::new(context.demand.error, "The specified token is no longer valid."),
            ),
        };

        if let Some(error) = rejection {
            if required {
                context.transaction_mut().reject(error);
            } else {
                context.fail("The specified token is no longer valid.");
            }
            return Ok(());
        }

        if token_type == TokenType::DeviceCode {
            if let (Some(subject), Some(principal)) =
                (entry.subject.as_deref(), context.transaction_mut().principal.as_mut())
            {
                if principal.subject().is_none() {
                    principal.set_subject(subject);
                }
            }
        }
        context
            .transaction_mut()
            .set_property(properties::TOKEN_ENTRY, entry);
        Ok(())
    }
}

impl ValidateTokenEntry {
    async fn revoke_authorization_tokens(&self, authorization_id: &str) -> ForgeResult<()> {
        let store = self.resolver.get::<Token>()?;
        let predicate = |entry: &Token| {
            entry.authorization_id.as_deref() == Some(authorization_id)
                && entry.status != TokenStatus::Revoked
        };
        // Revoked entries drop out of the listing, so the first page drains.
        loop {
            let tokens = store.list_where(&predicate, Page::default()).await?;
            if tokens.is_empty() {
                break;
            }
            for mut entry in tokens {
                entry.status = TokenStatus::Revoked;
                store.update(entry).await?;
            }
        }

        let authorizations = self.resolver.get::<Authorization>()?;
        if let Some(mut authorization) = authorizations.find_by_id(authorization_id).await? {
            authorization.status = AuthorizationStatus::Revoked;
            authorizations.update(authorization).await?;
        }
        Ok(())
    }
}

/// Rejects tokens whose authorization was revoked
pub struct ValidateAuthorizationEntry {
    resolver: Arc<StoreResolver>,
}

impl ValidateAuthorizationEntry {
    /// Sort key
    pub const ORDER: i32 = ValidateTokenEntry::ORDER + 1_000;
}

impl FromServices for ValidateAuthorizationEntry {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for ValidateAuthorizationEntry {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let Some(authorization_id) = context
            .transaction()
            .principal
            .as_ref()
            .and_then(|principal| principal.authorization_id().map(str::to_owned))
        else {
            return Ok(());
        };

        let authorization = self
            .resolver
            .get::<Authorization>()?
            .find_by_id(&authorization_id)
            .await?;
        if !authorization.is_some_and(|authorization| authorization.is_valid()) {
            context.fail("The authorization associated with the token is no longer valid.");
        }
        Ok(())
    }
}

/// Marks codes and refresh tokens redeemed once the token endpoint accepted them
pub struct RedeemTokenEntry {
    resolver: Arc<StoreResolver>,
}

impl RedeemTokenEntry {
    /// Runs after every endpoint-specific authentication check
    pub const ORDER: i32 = ValidateAuthorizationEntry::ORDER + 10_000;
}

impl FromServices for RedeemTokenEntry {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for RedeemTokenEntry {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let single_use = context.token_type.is_some_and(is_single_use);
        if !single_use || context.transaction().endpoint != EndpointKind::Token {
            return Ok(());
        }
        let Some(mut entry) = token_entry(context).cloned() else {
            return Ok(());
        };

        entry.status = TokenStatus::Redeemed;
        entry.redemption_date = Some(Utc::now());
        match self.resolver.get::<Token>()?.update(entry).await {
            Ok(entry) => {
                debug!(token_type = %entry.token_type, "token entry redeemed");
                context
                    .transaction_mut()
                    .set_property(properties::TOKEN_ENTRY, entry);
            }
            // Another request redeemed the same entry first.
            Err(ForgeError::ConcurrencyConflict { .. }) => {
                context.fail("The specified token has already been redeemed.");
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }
}

stateless_handlers!(ValidateTokenPresence, RejectUndecodedToken, ValidateExpiration);

/// Default authentication handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    Ok(vec![
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<ValidateTokenPresence>()
            .set_order(ValidateTokenPresence::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<ResolveReferenceToken>()
            .add_filter(RequireTokenStorageEnabled)
            .set_order(ResolveReferenceToken::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<DecodeJwtToken>()
            .add_filter(RequireUndecodedToken)
            .set_order(DecodeJwtToken::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<DecodeSealedToken>()
            .add_filter(RequireUndecodedToken)
            .set_order(DecodeSealedToken::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<RejectUndecodedToken>()
            .add_filter(RequireUndecodedToken)
            .set_order(RejectUndecodedToken::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<ValidateExpiration>()
            .add_filter(RequirePrincipal)
            .set_order(ValidateExpiration::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<ValidateTokenEntry>()
            .add_filter(RequireTokenStorageEnabled)
            .add_filter(RequirePrincipal)
            .set_order(ValidateTokenEntry::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<ValidateAuthorizationEntry>()
            .add_filter(RequireTokenStorageEnabled)
            .add_filter(RequirePrincipal)
            .set_order(ValidateAuthorizationEntry::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Context>::builder()
            .use_singleton_handler::<RedeemTokenEntry>()
            .add_filter(RequireTokenStorageEnabled)
            .add_filter(RequirePrincipal)
            .set_order(RedeemTokenEntry::ORDER)
            .build()?
            .into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{HandlerRegistrations, HandlerRegistry};

    #[test]
    fn test_each_format_decodes_in_its_own_handler() {
        let registry =
            HandlerRegistry::build(default_handlers().unwrap(), HandlerRegistrations::new());
        let decoders: Vec<_> = registry
            .descriptors::<Context>()
            .into_iter()
            .filter(|descriptor| descriptor.filter_names().contains(&"RequireUndecodedToken"))
            .map(|descriptor| (descriptor.handler_type().short_name(), descriptor.order()))
            .collect();

        assert_eq!(
            decoders,
            vec![
                ("DecodeJwtToken", DecodeJwtToken::ORDER),
                ("DecodeSealedToken", DecodeJwtToken::ORDER + 500),
                ("RejectUndecodedToken", RejectUndecodedToken::ORDER),
            ]
        );
        assert!(RejectUndecodedToken::ORDER < ValidateExpiration::ORDER);
    }
}
