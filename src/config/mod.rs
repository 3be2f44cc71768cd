// ABOUTME: Configuration for the server and validation stacks
// ABOUTME: Plain option structs with defaults, builder methods and environment loading
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors

/// Authorization server options
pub mod server;
/// Resource-server validation options
pub mod validation;

pub use server::ServerOptions;
pub use validation::ValidationOptions;

pub use crate::pipeline::HandlerRegistrations;

use std::env;
use std::str::FromStr;

use tracing::warn;

/// Read an environment variable, treating empty values as unset
pub(crate) fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an environment variable, keeping `default` when unset or invalid
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env_string(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring invalid configuration value");
            default
        }),
        None => default,
    }
}

/// Parse a boolean environment variable (`true/false`, `1/0`, `yes/no`, `on/off`)
pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    match env_string(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        Some(value) if matches!(value.as_str(), "true" | "1" | "yes" | "on") => true,
        Some(value) if matches!(value.as_str(), "false" | "0" | "no" | "off") => false,
        Some(value) => {
            warn!(key, value = %value, "ignoring invalid boolean configuration value");
            default
        }
        None => default,
    }
}

/// Split a comma separated environment variable
pub(crate) fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_owned)
            .collect()
    })
}
