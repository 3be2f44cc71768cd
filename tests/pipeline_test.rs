// ABOUTME: Integration tests for the handler pipeline: ordering, filters, short-circuiting and overrides
// ABOUTME: Exercises the registry and dispatcher directly and through a server provider
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use oidc_forge::impl_event_context;
use oidc_forge::config::ServerOptions;
use oidc_forge::pipeline::{
    Dispatcher, EventContext, FilterFn, FromServices, Handler, HandlerDescriptor,
    HandlerRegistrations, HandlerRegistry, HandlerType, Outcome, ServiceProvider, Transaction,
};
use oidc_forge::protocol::{EndpointKind, HostRequest};
use oidc_forge::server::endpoints::Token;
use oidc_forge::server::events::{HandleRequestContext, ValidateRequestContext};
use oidc_forge::server::handlers;
use oidc_forge::server::handlers::client::ValidateScopes;
use oidc_forge::server::handlers::token::HandleTokenRequest;
use oidc_forge::server::ServerProvider;
use oidc_forge::stores::Store;
use oidc_forge::{stateless_handlers, ForgeResult};
use oidc_forge_core::constants::permissions;
use oidc_forge_core::errors::ProtocolErrorCode;
use oidc_forge_core::models::Application;

use common::{
    confidential_application, create_test_provider, field, test_keys, CLIENT_ID, CLIENT_SECRET,
};

struct TraceContext {
    transaction: Transaction<()>,
    visited: Vec<&'static str>,
    stop_at: Option<&'static str>,
}

impl_event_context!(TraceContext, ());

impl TraceContext {
    fn new() -> Self {
        Self {
            transaction: Transaction::new(Arc::new(()), EndpointKind::Unknown),
            visited: Vec::new(),
            stop_at: None,
        }
    }
}

macro_rules! tracing_handler {
    ($name:ident) => {
        #[derive(Default)]
        struct $name;

        #[async_trait]
        impl Handler<TraceContext> for $name {
            async fn handle(&self, context: &mut TraceContext) -> ForgeResult<()> {
                let name = stringify!($name);
                context.visited.push(name);
                if context.stop_at == Some(name) {
                    context.transaction_mut().handle_request();
                }
                Ok(())
            }
        }
    };
}

tracing_handler!(First);
tracing_handler!(Second);
tracing_handler!(Third);
stateless_handlers!(First, Second, Third);

/// Fails to build unless a counter service is registered
struct Counting {
    calls: Arc<AtomicUsize>,
}

impl FromServices for Counting {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            calls: services.require::<AtomicUsize>()?,
        })
    }
}

#[async_trait]
impl Handler<TraceContext> for Counting {
    async fn handle(&self, context: &mut TraceContext) -> ForgeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        context.visited.push("Counting");
        Ok(())
    }
}

fn descriptor<H>(order: i32) -> HandlerDescriptor<TraceContext>
where
    H: Handler<TraceContext> + FromServices,
{
    HandlerDescriptor::builder()
        .use_singleton_handler::<H>()
        .set_order(order)
        .build()
        .unwrap()
}

fn dispatcher(defaults: Vec<HandlerDescriptor<TraceContext>>, services: ServiceProvider) -> Dispatcher {
    let registry = HandlerRegistry::build(
        defaults.into_iter().map(Into::into).collect(),
        HandlerRegistrations::new(),
    );
    Dispatcher::new(Arc::new(registry), Arc::new(services))
}

#[tokio::test]
async fn test_handlers_run_in_order_regardless_of_registration_order() {
    let dispatcher = dispatcher(
        vec![descriptor::<Third>(300), descriptor::<First>(100), descriptor::<Second>(200)],
        ServiceProvider::new(),
    );

    let mut context = TraceContext::new();
    let outcome = dispatcher.dispatch(&mut context).await.unwrap();

    assert_eq!(outcome, Outcome::Continue);
    assert_eq!(context.visited, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn test_terminal_outcome_stops_dispatch() {
    let dispatcher = dispatcher(
        vec![descriptor::<First>(100), descriptor::<Second>(200), descriptor::<Third>(300)],
        ServiceProvider::new(),
    );

    let mut context = TraceContext::new();
    context.stop_at = Some("Second");
    let outcome = dispatcher.dispatch(&mut context).await.unwrap();

    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(context.visited, vec!["First", "Second"]);
}

#[tokio::test]
async fn test_filtered_handler_is_never_constructed() {
    let gated = HandlerDescriptor::<TraceContext>::builder()
        .use_singleton_handler::<Counting>()
        .set_order(200)
        .add_filter(FilterFn::new("RequireStopMarker", |context: &TraceContext| {
            context.stop_at.is_some()
        }))
        .build()
        .unwrap();
    let dispatcher = dispatcher(vec![descriptor::<First>(100), gated], ServiceProvider::new());

    // No counter service: constructing the handler would fail.
    let mut context = TraceContext::new();
    dispatcher.dispatch(&mut context).await.unwrap();
    assert_eq!(context.visited, vec!["First"]);

    let mut context = TraceContext::new();
    context.stop_at = Some("Nothing");
    let error = dispatcher.dispatch(&mut context).await.unwrap_err();
    assert!(error.is_configuration());
    assert!(error.to_string().contains("AtomicUsize"));
}

#[tokio::test]
async fn test_scoped_handlers_are_built_for_every_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let services = ServiceProvider::new();
    services.insert(Arc::clone(&calls));

    let scoped = HandlerDescriptor::<TraceContext>::builder()
        .use_scoped_handler::<Counting>()
        .set_order(100)
        .build()
        .unwrap();
    let dispatcher = dispatcher(vec![scoped], services);

    for _ in 0..3 {
        let mut context = TraceContext::new();
        dispatcher.dispatch(&mut context).await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Audit log shared between a test and its host handler
#[derive(Clone, Default)]
struct AuditLog(Arc<Mutex<Vec<String>>>);

/// Host handler observing the token requests that reach validation
struct AuditClientIds {
    log: Arc<AuditLog>,
}

impl FromServices for AuditClientIds {
    fn from_services(services: &ServiceProvider) -> ForgeResult<Self> {
        Ok(Self {
            log: services.require::<AuditLog>()?,
        })
    }
}

#[async_trait]
impl Handler<ValidateRequestContext<Token>> for AuditClientIds {
    async fn handle(&self, context: &mut ValidateRequestContext<Token>) -> ForgeResult<()> {
        if let Some(client_id) = context.request().client_id() {
            self.log.0.lock().unwrap().push(client_id.to_owned());
        }
        Ok(())
    }
}

/// Replacement for the default token handler that refuses every grant
#[derive(Default)]
struct RefuseGrants;

#[async_trait]
impl Handler<HandleRequestContext<Token>> for RefuseGrants {
    async fn handle(&self, context: &mut HandleRequestContext<Token>) -> ForgeResult<()> {
        context.reject(ProtocolErrorCode::AccessDenied, "Grants are disabled.");
        Ok(())
    }
}

stateless_handlers!(RefuseGrants);

fn client_credentials_request() -> HostRequest {
    HostRequest::post_pairs([
        ("grant_type", "client_credentials"),
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
    ])
}

#[tokio::test]
async fn test_host_handlers_are_added_and_defaults_replaced() {
    let log = AuditLog::default();
    let audit = HandlerDescriptor::<ValidateRequestContext<Token>>::builder()
        .use_singleton_handler::<AuditClientIds>()
        .set_order(1)
        .build()
        .unwrap();
    let refuse = HandlerDescriptor::<HandleRequestContext<Token>>::builder()
        .use_singleton_handler::<RefuseGrants>()
        .build()
        .unwrap();

    let registrations = HandlerRegistrations::new()
        .add_handler(audit)
        .replace_handler::<HandleTokenRequest, _>(refuse);

    let provider = ServerProvider::builder(ServerOptions::default())
        .with_key_provider(test_keys())
        .with_registrations(registrations)
        .with_service(log.clone())
        .build()
        .unwrap();
    provider
        .resolver()
        .get::<Application>()
        .unwrap()
        .create(confidential_application())
        .await
        .unwrap();

    let response = provider
        .process::<Token>(client_credentials_request())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(field(&response, "error"), Some("access_denied"));
    assert_eq!(log.0.lock().unwrap().as_slice(), [CLIENT_ID.to_owned()]);
    let registry = provider.registry();
    assert!(!registry.contains::<HandleRequestContext<Token>, HandleTokenRequest>());
    assert!(registry.contains::<HandleRequestContext<Token>, RefuseGrants>());
}

#[tokio::test]
async fn test_default_pipeline_issues_client_credentials_token() {
    let provider = create_test_provider(ServerOptions::default()).await;

    let response = provider
        .process::<Token>(client_credentials_request())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.status, http::StatusCode::OK);
    assert!(field(&response, "access_token").is_some());
    assert_eq!(field(&response, "token_type"), Some("Bearer"));
    assert!(field(&response, "refresh_token").is_none());
}

async fn calendar_provider(registrations: HandlerRegistrations) -> ServerProvider {
    let provider = ServerProvider::builder(ServerOptions::default())
        .with_key_provider(test_keys())
        .with_registrations(registrations)
        .build()
        .unwrap();
    provider
        .resolver()
        .get::<Application>()
        .unwrap()
        .create(confidential_application().with_permission(permissions::scope("calendar")))
        .await
        .unwrap();
    provider
}

fn calendar_request() -> HostRequest {
    HostRequest::post_pairs([
        ("grant_type", "client_credentials"),
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
        ("scope", "calendar"),
    ])
}

#[tokio::test]
async fn test_default_handler_disabled_through_an_added_filter() {
    let defaults = HandlerRegistry::build(
        handlers::default_handlers().unwrap(),
        HandlerRegistrations::new(),
    );
    let validate_scopes = defaults
        .descriptors::<ValidateRequestContext<Token>>()
        .into_iter()
        .find(|descriptor| descriptor.handler_type() == HandlerType::of::<ValidateScopes>())
        .expect("scope validation is a default token handler");
    let disabled = validate_scopes
        .to_builder()
        .add_filter(FilterFn::new("NeverActive", |_: &ValidateRequestContext<Token>| false))
        .build()
        .unwrap();
    assert_eq!(disabled.order(), ValidateScopes::ORDER);

    // The scope is permitted for the client but known to nobody.
    let rejecting = calendar_provider(HandlerRegistrations::new()).await;
    let response = rejecting
        .process::<Token>(calendar_request())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(field(&response, "error"), Some("invalid_scope"));

    let provider = calendar_provider(
        HandlerRegistrations::new().replace_handler::<ValidateScopes, _>(disabled),
    )
    .await;
    let response = provider
        .process::<Token>(calendar_request())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert_eq!(response.status, http::StatusCode::OK, "{response:?}");
    assert!(field(&response, "access_token").is_some());

    let registry = provider.registry();
    let replaced = registry
        .descriptors::<ValidateRequestContext<Token>>()
        .into_iter()
        .find(|descriptor| descriptor.handler_type() == HandlerType::of::<ValidateScopes>())
        .unwrap();
    assert!(replaced.filter_names().contains(&"NeverActive"));
}
