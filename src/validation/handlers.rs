// ABOUTME: Default handlers of the validation pipeline: bearer extraction, decoding and checks
// ABOUTME: Token entry checks run only when the options ask for them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use oidc_forge_core::constants::{parameters, properties};
use oidc_forge_core::errors::{ForgeResult, ProtocolErrorCode};
use oidc_forge_core::models::{Token, TokenStatus, TokenType};
use tracing::debug;

use super::events::{ProcessRequestContext, ValidateTokenContext};
use crate::config::ValidationOptions;
use crate::formats::{read_token_with_candidates, TokenFormatKind, TokenFormats};
use crate::pipeline::{
    ErasedDescriptor, EventContext, Filter, FromServices, Handler, HandlerDescriptor,
    ServiceProvider,
};
use crate::stateless_handlers;
use crate::stores::{StoreExt, StoreResolver};

/// Active when token entries are checked against the token store
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireTokenEntryValidationEnabled;

#[async_trait]
impl<C: EventContext<Options = ValidationOptions>> Filter<C> for RequireTokenEntryValidationEnabled {
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok(context.options().validate_token_entries)
    }
}

/// Active when accepted audiences are configured
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAudiences;

#[async_trait]
impl<C: EventContext<Options = ValidationOptions>> Filter<C> for RequireAudiences {
    async fn is_active(&self, context: &C) -> ForgeResult<bool> {
        Ok(!context.options().audiences.is_empty())
    }
}

/// Reads the token from `Authorization: Bearer`
#[derive(Debug, Default)]
pub struct ExtractAccessTokenFromHeader;

impl ExtractAccessTokenFromHeader {
    /// Sort key
    pub const ORDER: i32 = 10_000;
}

#[async_trait]
impl Handler<ProcessRequestContext> for ExtractAccessTokenFromHeader {
    async fn handle(&self, context: &mut ProcessRequestContext) -> ForgeResult<()> {
        context.token = context
            .transaction()
            .host_request
            .as_ref()
            .and_then(|host| host.bearer_token())
            .map(str::to_owned);
        Ok(())
    }
}

/// Falls back to the `access_token` query or form parameter
#[derive(Debug, Default)]
pub struct ExtractAccessTokenFromParameter;

impl ExtractAccessTokenFromParameter {
    /// Sort key
    pub const ORDER: i32 = ExtractAccessTokenFromHeader::ORDER + 1_000;
}

#[async_trait]
impl Handler<ProcessRequestContext> for ExtractAccessTokenFromParameter {
    async fn handle(&self, context: &mut ProcessRequestContext) -> ForgeResult<()> {
        let transaction = context.transaction();
        let parameter = transaction
            .request
            .access_token()
            .map(str::to_owned)
            .or_else(|| {
                transaction.host_request.as_ref().and_then(|host| {
                    let query = host.query_parameters();
                    let form = host.form_parameters();
                    query
                        .access_token()
                        .or_else(|| form.access_token())
                        .map(str::to_owned)
                })
            });

        match (context.token.is_some(), parameter) {
            (true, Some(_)) => context.reject(
                ProtocolErrorCode::InvalidRequest,
                "The access token cannot be sent both as a header and as a parameter.",
            ),
            (false, Some(token)) => {
                context
                    .transaction_mut()
                    .request
                    .set(parameters::ACCESS_TOKEN, token.as_str());
                context.token = Some(token);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Rejects requests without access token
#[derive(Debug, Default)]
pub struct ValidateAccessTokenPresence;

impl ValidateAccessTokenPresence {
    /// Sort key
    pub const ORDER: i32 = ExtractAccessTokenFromParameter::ORDER + 1_000;
}

#[async_trait]
impl Handler<ProcessRequestContext> for ValidateAccessTokenPresence {
    async fn handle(&self, context: &mut ProcessRequestContext) -> ForgeResult<()> {
        if context.token.is_none() {
            context.reject(ProtocolErrorCode::InvalidToken, "The access token is missing.");
        }
        Ok(())
    }
}

/// Replaces a reference identifier by its stored payload
pub struct ResolveReferenceAccessToken {
    resolver: Arc<StoreResolver>,
}

impl ResolveReferenceAccessToken {
    /// Sort key
    pub const ORDER: i32 = 10_000;
}

impl FromServices for ResolveReferenceAccessToken {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<ValidateTokenContext> for ResolveReferenceAccessToken {
    async fn handle(&self, context: &mut ValidateTokenContext) -> ForgeResult<()> {
        let token = context.token.clone();
        let entry = self
            .resolver
            .get::<Token>()?
            .find_first_where(&|entry: &Token| {
                entry.token_type == TokenType::AccessToken
                    && entry.reference_id.as_deref() == Some(token.as_str())
            })
            .await?;

        if let Some(entry) = entry {
            let Some(payload) = entry.payload.clone() else {
                context.reject(ProtocolErrorCode::InvalidToken, "The access token is invalid.");
                return Ok(());
            };
            context.token = payload;
            context
                .transaction_mut()
                .set_property(properties::TOKEN_ENTRY, entry);
        }
        Ok(())
    }
}

/// Decodes the access token with the configured format, then the other one
pub struct DecodeAccessToken {
    formats: Arc<TokenFormats>,
}

impl DecodeAccessToken {
    /// Sort key
    pub const ORDER: i32 = ResolveReferenceAccessToken::ORDER + 1_000;
}

impl FromServices for DecodeAccessToken {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            formats: services.require::<TokenFormats>()?,
        })
    }
}

#[async_trait]
impl Handler<ValidateTokenContext> for DecodeAccessToken {
    async fn handle(&self, context: &mut ValidateTokenContext) -> ForgeResult<()> {
        let preferred = context.options().format;
        let fallback = match preferred {
            TokenFormatKind::Sealed => TokenFormatKind::Jwt,
            TokenFormatKind::Jwt => TokenFormatKind::Sealed,
        };

        for kind in [preferred, fallback] {
            let decoded = read_token_with_candidates(
                self.formats.get(kind),
                &context.token,
                &[TokenType::AccessToken],
            )?;
            if let Some((token_type, principal)) = decoded {
                context.token_type = Some(token_type);
                context.transaction_mut().principal = Some(principal);
                return Ok(());
            }
        }

        debug!(transaction = %context.transaction().id(), "access token could not be decoded");
        context.reject(ProtocolErrorCode::InvalidToken, "The access token is invalid.");
        Ok(())
    }
}

/// Rejects expired access tokens
#[derive(Debug, Default)]
pub struct ValidateTokenExpiration;

impl ValidateTokenExpiration {
    /// Sort key
    pub const ORDER: i32 = DecodeAccessToken::ORDER + 1_000;
}

#[async_trait]
impl Handler<ValidateTokenContext> for ValidateTokenExpiration {
    async fn handle(&self, context: &mut ValidateTokenContext) -> ForgeResult<()> {
        let expired = context
            .transaction()
            .principal
            .as_ref()
            .is_some_and(|principal| principal.is_expired_at(Utc::now()));
        if expired {
            context.reject(ProtocolErrorCode::InvalidToken, "The access token is no longer valid.");
        }
        Ok(())
    }
}

/// Requires one of the configured audiences
#[derive(Debug, Default)]
pub struct ValidateAudience;

impl ValidateAudience {
    /// Sort key
    pub const ORDER: i32 = ValidateTokenExpiration::ORDER + 1_000;
}

#[async_trait]
impl Handler<ValidateTokenContext> for ValidateAudience {
    async fn handle(&self, context: &mut ValidateTokenContext) -> ForgeResult<()> {
        let accepted = &context.options().audiences;
        let matches = context.transaction().principal.as_ref().is_some_and(|principal| {
            principal
                .audiences()
                .iter()
                .any(|audience| accepted.contains(audience))
        });
        if !matches {
            context.reject(
                ProtocolErrorCode::InvalidToken,
                "The access token is not valid for this resource server.",
            );
        }
        Ok(())
    }
}

/// Requires the stored entry of the token to be valid
pub struct ValidateAccessTokenEntry {
    resolver: Arc<StoreResolver>,
}

impl ValidateAccessTokenEntry {
    /// Sort key
    pub const ORDER: i32 = ValidateAudience::ORDER + 1_000;
}

impl FromServices for ValidateAccessTokenEntry {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<ValidateTokenContext> for ValidateAccessTokenEntry {
    async fn handle(&self, context: &mut ValidateTokenContext) -> ForgeResult<()> {
        let token_id = context
            .transaction()
            .principal
            .as_ref()
            .and_then(|principal| principal.token_id())
            .map(str::to_owned);

        let entry = match context
            .transaction()
            .property::<Token>(properties::TOKEN_ENTRY)
            .cloned()
        {
            Some(entry) => Some(entry),
            None => match token_id {
                Some(id) => self.resolver.get::<Token>()?.find_by_id(&id).await?,
                None => None,
            },
        };

        let valid = entry.as_ref().is_some_and(|entry| {
            entry.status == TokenStatus::Valid && !entry.is_expired_at(Utc::now())
        });
        if !valid {
            debug!(
                transaction = %context.transaction().id(),
                status = ?entry.as_ref().map(|entry| entry.status),
                "access token entry rejected"
            );
            context.reject(ProtocolErrorCode::InvalidToken, "The access token is no longer valid.");
        }
        Ok(())
    }
}

stateless_handlers!(
    ExtractAccessTokenFromHeader,
    ExtractAccessTokenFromParameter,
    ValidateAccessTokenPresence,
    ValidateTokenExpiration,
    ValidateAudience,
);

/// Default validation handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    type Request = ProcessRequestContext;
    type Validate = ValidateTokenContext;

    Ok(vec![
        HandlerDescriptor::<Request>::builder()
            .use_singleton_handler::<ExtractAccessTokenFromHeader>()
            .set_order(ExtractAccessTokenFromHeader::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Request>::builder()
            .use_singleton_handler::<ExtractAccessTokenFromParameter>()
            .set_order(ExtractAccessTokenFromParameter::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Request>::builder()
            .use_singleton_handler::<ValidateAccessTokenPresence>()
            .set_order(ValidateAccessTokenPresence::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Validate>::builder()
            .use_singleton_handler::<ResolveReferenceAccessToken>()
            .add_filter(RequireTokenEntryValidationEnabled)
            .set_order(ResolveReferenceAccessToken::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Validate>::builder()
            .use_singleton_handler::<DecodeAccessToken>()
            .set_order(DecodeAccessToken::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Validate>::builder()
            .use_singleton_handler::<ValidateTokenExpiration>()
            .set_order(ValidateTokenExpiration::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Validate>::builder()
            .use_singleton_handler::<ValidateAudience>()
            .add_filter(RequireAudiences)
            .set_order(ValidateAudience::ORDER)
            .build()?
            .into(),
        HandlerDescriptor::<Validate>::builder()
            .use_singleton_handler::<ValidateAccessTokenEntry>()
            .add_filter(RequireTokenEntryValidationEnabled)
            .set_order(ValidateAccessTokenEntry::ORDER)
            .build()?
            .into(),
    ])
}
