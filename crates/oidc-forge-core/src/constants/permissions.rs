// ABOUTME: Application permission values checked by the server handlers
// ABOUTME: Permissions are prefixed strings stored on the application entity

/// Prefix of grant type permissions
pub const GRANT_TYPE_PREFIX: &str = "gt:";
/// Prefix of endpoint permissions
pub const ENDPOINT_PREFIX: &str = "ept:";
/// Prefix of scope permissions
pub const SCOPE_PREFIX: &str = "scp:";

/// Build the permission string for a grant type
#[must_use]
pub fn grant_type(grant_type: &str) -> String {
    format!("{GRANT_TYPE_PREFIX}{grant_type}")
}

/// Build the permission string for an endpoint
#[must_use]
pub fn endpoint(endpoint: &str) -> String {
    format!("{ENDPOINT_PREFIX}{endpoint}")
}

/// Build the permission string for a scope
#[must_use]
pub fn scope(scope: &str) -> String {
    format!("{SCOPE_PREFIX}{scope}")
}
