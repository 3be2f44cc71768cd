// ABOUTME: Client validation handlers shared by the endpoints accepting client credentials
// ABOUTME: Resolves the application, checks its secret, permissions and requested scopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::sync::Arc;

use async_trait::async_trait;
use oidc_forge_core::constants::{grant_types, permissions, properties, scopes};
use oidc_forge_core::errors::{ForgeResult, ProtocolErrorCode};
use oidc_forge_core::models::{Application, Scope};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::pipeline::{EventContext, FromServices, Handler, ServiceProvider};
use crate::protocol::{EndpointKind, OpenIdRequest};
use crate::server::endpoints::Endpoint;
use crate::server::events::{ServerTransaction, ValidateRequestContext};
use crate::stateless_handlers;
use crate::stores::{StoreExt, StoreResolver};

/// Hash a client secret the way applications store it (hex SHA-256)
#[must_use]
pub fn hash_client_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Compare a presented secret with a stored hash in constant time
#[must_use]
pub fn verify_client_secret(secret: &str, hash: &str) -> bool {
    let computed = hash_client_secret(secret);
    computed.as_bytes().ct_eq(hash.as_bytes()).into()
}

/// Application resolved by [`ValidateClient`]
#[must_use]
pub fn application(transaction: &ServerTransaction) -> Option<&Application> {
    transaction.property::<Application>(properties::APPLICATION)
}

// The authorization endpoint cannot authenticate clients, so unknown clients
// are malformed requests there and authentication failures elsewhere.
fn client_error(endpoint: EndpointKind) -> ProtocolErrorCode {
    match endpoint {
        EndpointKind::Authorization | EndpointKind::Logout => ProtocolErrorCode::InvalidRequest,
        _ => ProtocolErrorCode::InvalidClient,
    }
}

/// Grant type a request uses, as checked against `gt:` permissions
fn requested_grant<E: Endpoint>(request: &OpenIdRequest) -> Option<&str> {
    match E::KIND {
        EndpointKind::Authorization => Some(grant_types::AUTHORIZATION_CODE),
        EndpointKind::Device => Some(grant_types::DEVICE_CODE),
        EndpointKind::Token => request.grant_type(),
        _ => None,
    }
}

/// Rejects requests without `client_id`
#[derive(Debug, Default)]
pub struct ValidateClientIdParameter;

impl ValidateClientIdParameter {
    /// Sort key
    pub const ORDER: i32 = 10_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateClientIdParameter {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        if context.request().client_id().is_none() {
            context.reject(
                client_error(E::KIND),
                "The mandatory 'client_id' parameter is missing.",
            );
        }
        Ok(())
    }
}

/// Resolves the application matching `client_id`
pub struct ValidateClient {
    resolver: Arc<StoreResolver>,
}

impl ValidateClient {
    /// Sort key
    pub const ORDER: i32 = 30_000;
}

impl FromServices for ValidateClient {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateClient {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        let Some(client_id) = context.request().client_id().map(str::to_owned) else {
            return Ok(());
        };

        let store = self.resolver.get::<Application>()?;
        let Some(application) = store.find_by_client_id(&client_id).await?.into_iter().next() else {
            debug!(client_id = %client_id, "unknown client application");
            context.reject(
                client_error(E::KIND),
                "The specified 'client_id' is invalid.",
            );
            return Ok(());
        };

        context
            .transaction_mut()
            .set_property(properties::APPLICATION, application);
        Ok(())
    }
}

/// Authenticates the client with its secret
///
/// Confidential clients must present their secret; public clients must not
/// present one and cannot use the introspection endpoint.
#[derive(Debug, Default)]
pub struct ValidateClientSecret;

impl ValidateClientSecret {
    /// Sort key
    pub const ORDER: i32 = ValidateClient::ORDER + 1_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateClientSecret {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        let Some(application) = application(context.transaction()) else {
            return Ok(());
        };
        let secret = context.request().client_secret();

        let failure = if application.is_public() {
            if E::KIND == EndpointKind::Introspection {
                Some("This client application is not allowed to use the introspection endpoint.")
            } else if secret.is_some() {
                Some("The 'client_secret' parameter is not valid for this client application.")
            } else {
                None
            }
        } else {
            match (secret, application.client_secret.as_deref()) {
                (None, _) => Some("The mandatory 'client_secret' parameter is missing."),
                (Some(_), None) => Some("The client application has no registered secret."),
                (Some(secret), Some(hash)) if !verify_client_secret(secret, hash) => {
                    Some("The specified client credentials are invalid.")
                }
                _ => None,
            }
        };

        if let Some(description) = failure {
            warn!(client_id = %application.client_id, endpoint = %E::KIND, "client authentication failed");
            context.reject(ProtocolErrorCode::InvalidClient, description);
        }
        Ok(())
    }
}

/// Requires the `ept:` permission of the endpoint
#[derive(Debug, Default)]
pub struct ValidateEndpointPermissions;

impl ValidateEndpointPermissions {
    /// Sort key
    pub const ORDER: i32 = ValidateClientSecret::ORDER + 1_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateEndpointPermissions {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        let allowed = application(context.transaction())
            .is_none_or(|app| app.has_permission(&permissions::endpoint(E::KIND.as_str())));
        if !allowed {
            context.reject(
                ProtocolErrorCode::UnauthorizedClient,
                format!("This client application is not allowed to use the {} endpoint.", E::KIND),
            );
        }
        Ok(())
    }
}

/// Requires the `gt:` permission of the grant in use
#[derive(Debug, Default)]
pub struct ValidateGrantTypePermissions;

impl ValidateGrantTypePermissions {
    /// Sort key
    pub const ORDER: i32 = ValidateEndpointPermissions::ORDER + 1_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateGrantTypePermissions {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        let Some(application) = application(context.transaction()) else {
            return Ok(());
        };
        let request = context.request();

        let failure = if requested_grant::<E>(request)
            .is_some_and(|grant| !application.has_permission(&permissions::grant_type(grant)))
        {
            Some("This client application is not allowed to use the specified grant type.")
        } else if request.scopes().iter().any(|scope| scope == scopes::OFFLINE_ACCESS)
            && !application.has_permission(&permissions::grant_type(grant_types::REFRESH_TOKEN))
        {
            Some("The client application is not allowed to use the 'offline_access' scope.")
        } else {
            None
        };

        if let Some(description) = failure {
            context.reject(ProtocolErrorCode::UnauthorizedClient, description);
        }
        Ok(())
    }
}

/// Requires a `scp:` permission for every requested scope
///
/// `openid` and `offline_access` are governed by other permissions.
#[derive(Debug, Default)]
pub struct ValidateScopePermissions;

impl ValidateScopePermissions {
    /// Sort key
    pub const ORDER: i32 = ValidateGrantTypePermissions::ORDER + 1_000;
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateScopePermissions {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        let Some(application) = application(context.transaction()) else {
            return Ok(());
        };
        let denied = context
            .request()
            .scopes()
            .into_iter()
            .filter(|scope| scope != scopes::OPENID && scope != scopes::OFFLINE_ACCESS)
            .find(|scope| !application.has_permission(&permissions::scope(scope)));

        if let Some(scope) = denied {
            context.reject(
                ProtocolErrorCode::InvalidRequest,
                format!("This client application is not allowed to use the '{scope}' scope."),
            );
        }
        Ok(())
    }
}

/// Rejects scopes the server does not know
///
/// A scope is known when it is registered in the options or, outside degraded
/// mode, stored in the scope store. Token requests redeeming a grant are
/// checked against the granted scopes during authentication instead.
pub struct ValidateScopes {
    resolver: Arc<StoreResolver>,
}

impl ValidateScopes {
    /// Runs after client validation so scope errors can be redirected
    pub const ORDER: i32 = 40_000;
}

impl FromServices for ValidateScopes {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            resolver: services.require::<StoreResolver>()?,
        })
    }
}

#[async_trait]
impl<E: Endpoint> Handler<ValidateRequestContext<E>> for ValidateScopes {
    async fn handle(&self, context: &mut ValidateRequestContext<E>) -> ForgeResult<()> {
        let request = context.request();
        if E::KIND == EndpointKind::Token
            && request.grant_type() != Some(grant_types::CLIENT_CREDENTIALS)
        {
            return Ok(());
        }

        let options = context.options();
        let unknown: Vec<String> = request
            .scopes()
            .into_iter()
            .filter(|scope| !options.registered_scopes.contains(scope))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }

        let mut rejected = unknown.first().cloned();
        if !options.degraded_mode {
            let store = self.resolver.get::<Scope>()?;
            rejected = None;
            for name in &unknown {
                let found = store
                    .find_first_where(&|scope: &Scope| scope.name == *name)
                    .await?;
                if found.is_none() {
                    rejected = Some(name.clone());
                    break;
                }
            }
        }

        if let Some(scope) = rejected {
            context.reject(
                ProtocolErrorCode::InvalidScope,
                format!("The specified scope '{scope}' is not supported."),
            );
        }
        Ok(())
    }
}

stateless_handlers!(
    ValidateClientIdParameter,
    ValidateClientSecret,
    ValidateEndpointPermissions,
    ValidateGrantTypePermissions,
    ValidateScopePermissions,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_hash_verification() {
        let hash = hash_client_secret("s3cret");
        assert_eq!(hash.len(), 64);
        assert!(verify_client_secret("s3cret", &hash));
        assert!(!verify_client_secret("S3cret", &hash));
        assert!(!verify_client_secret("s3cret", "short"));
    }

    #[test]
    fn test_client_error_depends_on_endpoint() {
        assert_eq!(
            client_error(EndpointKind::Authorization),
            ProtocolErrorCode::InvalidRequest
        );
        assert_eq!(client_error(EndpointKind::Token), ProtocolErrorCode::InvalidClient);
    }
}
