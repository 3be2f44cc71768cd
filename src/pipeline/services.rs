// ABOUTME: Type-keyed service container handed to handler factories
// ABOUTME: Holds shared collaborators such as options, token formats and the store resolver
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use dashmap::DashMap;
use oidc_forge_core::errors::{ForgeError, ForgeResult};

/// Service container keyed by concrete type
///
/// Each type is stored at most once; inserting a second value replaces the
/// first. Values are shared through `Arc` so handlers can keep them for the
/// lifetime of a singleton.
#[derive(Default)]
pub struct ServiceProvider {
    services: DashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>,
}

impl ServiceProvider {
    /// Create an empty container
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service
    pub fn insert<T: Send + Sync + 'static>(&self, service: Arc<T>) {
        self.services
            .insert(TypeId::of::<T>(), (type_name::<T>(), service));
    }

    /// Builder-style variant of [`ServiceProvider::insert`]
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(self, service: T) -> Self {
        self.insert(Arc::new(service));
        self
    }

    /// Get a service if registered
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let entry = self.services.get(&TypeId::of::<T>())?;
        Arc::clone(&entry.value().1).downcast::<T>().ok()
    }

    /// Get a service that must be registered
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing service type
    pub fn require<T: Send + Sync + 'static>(&self) -> ForgeResult<Arc<T>> {
        self.get::<T>().ok_or_else(|| {
            ForgeError::configuration(format!(
                "no service of type '{}' was registered",
                type_name::<T>()
            ))
        })
    }

    /// Whether a service of type `T` is registered
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }
}

impl Debug for ServiceProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&'static str> = self.services.iter().map(|e| e.value().0).collect();
        names.sort_unstable();
        f.debug_struct("ServiceProvider")
            .field("services", &names)
            .finish()
    }
}
