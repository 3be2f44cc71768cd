// ABOUTME: Sign-in stage: decides which tokens to issue, persists their entries and encodes them
// ABOUTME: Reference identifiers replace stored payloads when the options ask for them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use oidc_forge_core::constants::{claims, code_challenge_methods, grant_types, parameters, scopes};
use oidc_forge_core::errors::{ForgeError, ForgeResult};
use oidc_forge_core::models::{Authorization, Token, TokenStatus, TokenType};
use rand::Rng;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info};

use super::client;
use super::singleton;
use super::token::strip_token_claims;
use crate::formats::{TokenFormat, TokenFormatKind, TokenFormats};
use crate::pipeline::{ErasedDescriptor, EventContext, FromServices, Handler, ServiceProvider};
use crate::principal::Principal;
use crate::protocol::EndpointKind;
use crate::server::events::ProcessSigninContext;
use crate::server::filters::{
    RequireAccessTokenIncluded, RequireAuthorizationCodeIncluded, RequireDeviceCodeIncluded,
    RequireJwtFormatPreferred, RequireRefreshTokenIncluded, RequireSealedFormatPreferred,
    RequireTokenStorageEnabled, RequireUserCodeIncluded,
};
use crate::stateless_handlers;
use crate::stores::StoreResolver;

type Context = ProcessSigninContext;

/// Characters user codes are drawn from: no vowels, no look-alikes
pub const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Length of generated user codes
pub const USER_CODE_LENGTH: usize = 8;

/// Generate an opaque reference identifier (256 bits, base64url)
///
/// # Errors
///
/// Returns a token generation error if the system random source fails
pub fn generate_reference_id() -> ForgeResult<String> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| ForgeError::TokenGeneration {
            backend: "reference",
            reason: "system random source unavailable".to_owned(),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a user code users can type
#[must_use]
pub fn generate_user_code() -> String {
    let mut rng = rand::thread_rng();
    (0..USER_CODE_LENGTH)
        .map(|_| char::from(USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())]))
        .collect()
}

/// Normalize a user code typed by a user (case, separators)
#[must_use]
pub fn normalize_user_code(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Rejects principals without subject outside the device flow
#[derive(Debug, Default)]
pub struct ValidateSigninPrincipal;

impl ValidateSigninPrincipal {
    /// Sort key
    pub const ORDER: i32 = 100_000;
}

#[async_trait]
impl Handler<Context> for ValidateSigninPrincipal {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let endpoint = context.transaction().endpoint;
        if context.principal.subject().is_none() && endpoint != EndpointKind::Device {
            return Err(ForgeError::InvalidState(format!(
                "the principal signed in at the {endpoint} endpoint has no subject"
            )));
        }
        Ok(())
    }
}

/// Picks the token types issued by the endpoint
#[derive(Debug, Default)]
pub struct EvaluateGeneratedTokens;

impl EvaluateGeneratedTokens {
    /// Sort key
    pub const ORDER: i32 = ValidateSigninPrincipal::ORDER + 1_000;
}

#[async_trait]
impl Handler<Context> for EvaluateGeneratedTokens {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let endpoint = context.transaction().endpoint;
        match endpoint {
            EndpointKind::Authorization => context.include(TokenType::AuthorizationCode),
            EndpointKind::Token => {
                context.include(TokenType::AccessToken);
                let refreshable = context.principal.has_scope(scopes::OFFLINE_ACCESS)
                    && context.request().grant_type() != Some(grant_types::CLIENT_CREDENTIALS);
                if refreshable {
                    context.include(TokenType::RefreshToken);
                }
            }
            EndpointKind::Device => {
                context.include(TokenType::DeviceCode);
                context.include(TokenType::UserCode);
            }
            _ => {}
        }
        debug!(
            transaction = %context.transaction().id(),
            %endpoint,
            tokens = ?context.included,
            "token types selected"
        );
        Ok(())
    }
}

/// Grants the requested scopes when the host did not set any
#[derive(Debug, Default)]
pub struct AttachRequestedScopes;

impl AttachRequestedScopes {
    /// Sort key
    pub const ORDER: i32 = EvaluateGeneratedTokens::ORDER + 1_000;
}

#[async_trait]
impl Handler<Context> for AttachRequestedScopes {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        if context.principal.scopes().is_empty() {
            let requested = context.request().scopes();
            if !requested.is_empty() {
                context.principal.set_scopes(requested);
            }
        }
        Ok(())
    }
}

/// Creates an ad-hoc authorization for long-lived grants
///
/// Codes and refresh tokens are tied to an authorization so a replayed code
/// can revoke everything issued from it.
pub struct AttachAuthorization {
    resolver: Arc<StoreResolver>,
}

impl AttachAuthorization {
    /// Sort key
    pub const ORDER: i32 = AttachRequestedScopes::ORDER + 1_000;
}

impl FromServices for AttachAuthorization {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for AttachAuthorization {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let long_lived = context.includes(TokenType::AuthorizationCode)
            || context.includes(TokenType::RefreshToken);
        if !long_lived || context.principal.authorization_id().is_some() {
            return Ok(());
        }
        let Some(subject) = context.principal.subject() else {
            return Ok(());
        };

        let application_id =
            client::application(context.transaction()).and_then(|app| app.id.clone());
        let mut authorization = Authorization::ad_hoc(subject, application_id);
        authorization.scopes = context.principal.scopes();

        let authorization = self.resolver.get::<Authorization>()?.create(authorization).await?;
        if let Some(id) = authorization.id {
            debug!(authorization_id = %id, "ad-hoc authorization created");
            context.principal.set_authorization_id(id);
        }
        Ok(())
    }
}

// Copy of the signed-in principal stamped for one token type.
fn token_principal(context: &Context, token_type: TokenType) -> ForgeResult<Principal> {
    let now = Utc::now();
    let lifetime = context.options().lifetime(token_type);
    let expiration = now.checked_add_signed(lifetime).ok_or_else(|| {
        ForgeError::configuration(format!(
            "the {token_type} lifetime of {} seconds is out of range",
            lifetime.num_seconds()
        ))
    })?;

    let mut principal = context.principal.clone();
    strip_token_claims(&mut principal);
    principal
        .set_token_type(token_type)
        .set_creation_date(now)
        .set_expiration_date(expiration);
    if let Some(client_id) = context.request().client_id() {
        principal.set_presenters([client_id]);
    }
    Ok(principal)
}

/// Define a handler preparing the principal of one token type
macro_rules! prepare_principal {
    ($(#[$doc:meta])* $name:ident, $token_type:expr, $order:expr) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $name;

        impl $name {
            /// Sort key
            pub const ORDER: i32 = $order;
        }

        #[async_trait]
        impl Handler<Context> for $name {
            async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
                let principal = token_principal(context, $token_type)?;
                context.principals.insert($token_type, principal);
                Ok(())
            }
        }
    };
}

prepare_principal!(
    /// Prepares the access token principal
    PrepareAccessTokenPrincipal,
    TokenType::AccessToken,
    110_000
);

prepare_principal!(
    /// Prepares the refresh token principal
    PrepareRefreshTokenPrincipal,
    TokenType::RefreshToken,
    PrepareAccessTokenPrincipal::ORDER + 1_000
);

prepare_principal!(
    /// Prepares the device code principal
    PrepareDeviceCodePrincipal,
    TokenType::DeviceCode,
    PrepareAuthorizationCodePrincipal::ORDER + 1_000
);

prepare_principal!(
    /// Prepares the user code principal
    PrepareUserCodePrincipal,
    TokenType::UserCode,
    PrepareDeviceCodePrincipal::ORDER + 1_000
);

/// Prepares the authorization code principal, binding PKCE and the redirect URI
#[derive(Debug, Default)]
pub struct PrepareAuthorizationCodePrincipal;

impl PrepareAuthorizationCodePrincipal {
    /// Sort key
    pub const ORDER: i32 = PrepareRefreshTokenPrincipal::ORDER + 1_000;
}

#[async_trait]
impl Handler<Context> for PrepareAuthorizationCodePrincipal {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let mut principal = token_principal(context, TokenType::AuthorizationCode)?;
        let request = context.request();
        if let Some(challenge) = request.code_challenge() {
            let method = request
                .code_challenge_method()
                .unwrap_or(code_challenge_methods::S256);
            principal
                .set_claim(claims::private::CODE_CHALLENGE, challenge)
                .set_claim(claims::private::CODE_CHALLENGE_METHOD, method);
        }
        if let Some(redirect_uri) = request.redirect_uri() {
            principal.set_claim(claims::private::REDIRECT_URI, redirect_uri);
        }
        context
            .principals
            .insert(TokenType::AuthorizationCode, principal);
        Ok(())
    }
}

/// Persists a token entry for every prepared principal
pub struct CreateTokenEntries {
    resolver: Arc<StoreResolver>,
}

impl CreateTokenEntries {
    /// Sort key
    pub const ORDER: i32 = 120_000;
}

impl FromServices for CreateTokenEntries {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for CreateTokenEntries {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let store = self.resolver.get::<Token>()?;
        let application_id =
            client::application(context.transaction()).and_then(|app| app.id.clone());
        let token_types: Vec<TokenType> = context.principals.iter().map(|(t, _)| t).collect();

        for token_type in token_types {
            let Some(principal) = context.principals.get(token_type) else {
                continue;
            };
            let mut entry = Token::new(token_type);
            entry.application_id.clone_from(&application_id);
            entry.authorization_id = principal.authorization_id().map(str::to_owned);
            entry.subject = principal.subject().map(str::to_owned);
            entry.expiration_date = principal.expiration_date();
            if token_type == TokenType::DeviceCode {
                // Approved later through the user code.
                entry.status = TokenStatus::Inactive;
            }

            let entry = store.create(entry).await?;
            let Some(id) = entry.id.clone() else {
                return Err(ForgeError::InvalidState(format!(
                    "the token store returned a {token_type} entry without identifier"
                )));
            };
            if let Some(principal) = context.principals.get_mut(token_type) {
                principal.set_token_id(id);
            }
            context.entries.insert(token_type, entry);
        }

        let device_entry_id = context
            .entries
            .get(TokenType::DeviceCode)
            .and_then(|entry| entry.id.clone());
        if let (Some(id), Some(principal)) =
            (device_entry_id, context.principals.get_mut(TokenType::UserCode))
        {
            principal.set_claim(claims::private::DEVICE_CODE_ID, id);
        }
        Ok(())
    }
}

fn encode_tokens(format: &dyn TokenFormat, context: &mut Context) -> ForgeResult<()> {
    let mut encoded = Vec::new();
    for (token_type, principal) in context.principals.iter() {
        encoded.push((token_type, format.write_token(principal, token_type)?));
    }
    for (token_type, token) in encoded {
        context.tokens.insert(token_type, token);
    }
    Ok(())
}

/// Encodes the prepared principals as JWTs
pub struct GenerateJwtTokens {
    formats: Arc<TokenFormats>,
}

impl GenerateJwtTokens {
    /// Sort key
    pub const ORDER: i32 = 130_000;
}

impl FromServices for GenerateJwtTokens {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            formats: services.require::<TokenFormats>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for GenerateJwtTokens {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        encode_tokens(self.formats.get(TokenFormatKind::Jwt), context)
    }
}

/// Encodes the prepared principals as sealed tokens
pub struct GenerateSealedTokens {
    formats: Arc<TokenFormats>,
}

impl GenerateSealedTokens {
    /// Sort key
    pub const ORDER: i32 = GenerateJwtTokens::ORDER - 500;
}

impl FromServices for GenerateSealedTokens {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            formats: services.require::<TokenFormats>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for GenerateSealedTokens {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        encode_tokens(self.formats.get(TokenFormatKind::Sealed), context)
    }
}

/// Stores payloads and hands out reference identifiers instead
pub struct ConvertReferenceTokens {
    resolver: Arc<StoreResolver>,
}

impl ConvertReferenceTokens {
    /// Sort key
    pub const ORDER: i32 = GenerateJwtTokens::ORDER + 1_000;
}

impl FromServices for ConvertReferenceTokens {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl Handler<Context> for ConvertReferenceTokens {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let store = self.resolver.get::<Token>()?;
        let token_types: Vec<TokenType> = context
            .tokens
            .iter()
            .map(|(t, _)| t)
            .filter(|t| context.options().uses_reference_identifier(*t))
            .collect();

        for token_type in token_types {
            let (Some(payload), Some(mut entry)) = (
                context.tokens.get(token_type).cloned(),
                context.entries.get(token_type).cloned(),
            ) else {
                continue;
            };
            let reference = if token_type == TokenType::UserCode {
                generate_user_code()
            } else {
                generate_reference_id()?
            };
            entry.payload = Some(payload);
            entry.reference_id = Some(reference.clone());

            let entry = store.update(entry).await?;
            context.entries.insert(token_type, entry);
            context.tokens.insert(token_type, reference);
        }
        Ok(())
    }
}

/// Copies the issued tokens into the response
#[derive(Debug, Default)]
pub struct AttachSigninParameters;

impl AttachSigninParameters {
    /// Sort key
    pub const ORDER: i32 = 140_000;
}

#[async_trait]
impl Handler<Context> for AttachSigninParameters {
    async fn handle(&self, context: &mut Context) -> ForgeResult<()> {
        let options = context.options();
        let access_lifetime = options.lifetime(TokenType::AccessToken).num_seconds();
        let device_lifetime = options.lifetime(TokenType::DeviceCode).num_seconds();
        let verification_uri = options.verification_uri.clone();
        let state = (context.transaction().endpoint == EndpointKind::Authorization)
            .then(|| context.request().state().map(str::to_owned))
            .flatten();
        let scope = context.principal.scopes().join(" ");
        let tokens = context.tokens.clone();

        let response = context.response_mut();
        if let Some(access_token) = tokens.get(TokenType::AccessToken) {
            response
                .set(parameters::ACCESS_TOKEN, access_token.as_str())
                .set(parameters::TOKEN_TYPE, "Bearer")
                .set(parameters::EXPIRES_IN, access_lifetime);
            if !scope.is_empty() {
                response.set(parameters::SCOPE, scope);
            }
        }
        if let Some(refresh_token) = tokens.get(TokenType::RefreshToken) {
            response.set(parameters::REFRESH_TOKEN, refresh_token.as_str());
        }
        if let Some(code) = tokens.get(TokenType::AuthorizationCode) {
            response.set(parameters::CODE, code.as_str());
        }
        if let Some(device_code) = tokens.get(TokenType::DeviceCode) {
            response
                .set(parameters::DEVICE_CODE, device_code.as_str())
                .set(parameters::EXPIRES_IN, device_lifetime);
        }
        if let Some(user_code) = tokens.get(TokenType::UserCode) {
            response.set(parameters::USER_CODE, user_code.as_str());
            if let Some(uri) = verification_uri {
                let complete = url::Url::parse_with_params(&uri, [(parameters::USER_CODE, user_code)])
                    .map(String::from)
                    .ok();
                response.set(parameters::VERIFICATION_URI, uri);
                if let Some(complete) = complete {
                    response.set(parameters::VERIFICATION_URI_COMPLETE, complete);
                }
            }
        }
        if let Some(state) = state {
            response.set(parameters::STATE, state);
        }

        info!(
            transaction = %context.transaction().id(),
            endpoint = %context.transaction().endpoint,
            tokens = ?tokens.iter().map(|(t, _)| t).collect::<Vec<_>>(),
            "principal signed in"
        );
        Ok(())
    }
}

stateless_handlers!(
    ValidateSigninPrincipal,
    EvaluateGeneratedTokens,
    AttachRequestedScopes,
    PrepareAccessTokenPrincipal,
    PrepareRefreshTokenPrincipal,
    PrepareAuthorizationCodePrincipal,
    PrepareDeviceCodePrincipal,
    PrepareUserCodePrincipal,
    AttachSigninParameters,
);

/// Default sign-in handlers
///
/// # Errors
///
/// Returns a configuration error if a descriptor cannot be built
pub fn default_handlers() -> ForgeResult<Vec<ErasedDescriptor>> {
    Ok(vec![
        singleton::<Context, ValidateSigninPrincipal>(ValidateSigninPrincipal::ORDER)
            .build()?
            .into(),
        singleton::<Context, EvaluateGeneratedTokens>(EvaluateGeneratedTokens::ORDER)
            .build()?
            .into(),
        singleton::<Context, AttachRequestedScopes>(AttachRequestedScopes::ORDER)
            .build()?
            .into(),
        singleton::<Context, AttachAuthorization>(AttachAuthorization::ORDER)
            .add_filter(RequireTokenStorageEnabled)
            .build()?
            .into(),
        singleton::<Context, PrepareAccessTokenPrincipal>(PrepareAccessTokenPrincipal::ORDER)
            .add_filter(RequireAccessTokenIncluded)
            .build()?
            .into(),
        singleton::<Context, PrepareRefreshTokenPrincipal>(PrepareRefreshTokenPrincipal::ORDER)
            .add_filter(RequireRefreshTokenIncluded)
            .build()?
            .into(),
        singleton::<Context, PrepareAuthorizationCodePrincipal>(
            PrepareAuthorizationCodePrincipal::ORDER,
        )
        .add_filter(RequireAuthorizationCodeIncluded)
        .build()?
        .into(),
        singleton::<Context, PrepareDeviceCodePrincipal>(PrepareDeviceCodePrincipal::ORDER)
            .add_filter(RequireDeviceCodeIncluded)
            .build()?
            .into(),
        singleton::<Context, PrepareUserCodePrincipal>(PrepareUserCodePrincipal::ORDER)
            .add_filter(RequireUserCodeIncluded)
            .build()?
            .into(),
        singleton::<Context, CreateTokenEntries>(CreateTokenEntries::ORDER)
            .add_filter(RequireTokenStorageEnabled)
            .build()?
            .into(),
        singleton::<Context, GenerateSealedTokens>(GenerateSealedTokens::ORDER)
            .add_filter(RequireSealedFormatPreferred)
            .build()?
            .into(),
        singleton::<Context, GenerateJwtTokens>(GenerateJwtTokens::ORDER)
            .add_filter(RequireJwtFormatPreferred)
            .build()?
            .into(),
        singleton::<Context, ConvertReferenceTokens>(ConvertReferenceTokens::ORDER)
            .add_filter(RequireTokenStorageEnabled)
            .build()?
            .into(),
        singleton::<Context, AttachSigninParameters>(AttachSigninParameters::ORDER)
            .build()?
            .into(),
    ])
}
