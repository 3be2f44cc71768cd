// ABOUTME: Claim names carried by principals and tokens
// ABOUTME: Standard JWT claims plus the private claims used for token metadata

/// Subject identifier
pub const SUBJECT: &str = "sub";
/// Expiration time (seconds since epoch)
pub const EXPIRES_AT: &str = "exp";
/// Issued-at time (seconds since epoch)
pub const ISSUED_AT: &str = "iat";
/// Token issuer
pub const ISSUER: &str = "iss";
/// Audiences
pub const AUDIENCE: &str = "aud";
/// Unique token identifier
pub const JWT_ID: &str = "jti";
/// Client the token was issued to
pub const CLIENT_ID: &str = "client_id";
/// Space-delimited scope in introspection responses
pub const SCOPE: &str = "scope";
/// User name
pub const NAME: &str = "name";
/// E-mail address
pub const EMAIL: &str = "email";
/// Whether the e-mail address was verified
pub const EMAIL_VERIFIED: &str = "email_verified";
/// Preferred user name
pub const PREFERRED_USERNAME: &str = "preferred_username";
/// Introspection activity flag
pub const ACTIVE: &str = "active";
/// Token type in introspection responses
pub const TOKEN_TYPE: &str = "token_type";

/// Private claims never exposed to clients
pub mod private {
    /// Token usage (`access_token`, `refresh_token`, ...)
    pub const TOKEN_USAGE: &str = "fg_tkn_use";
    /// Identifier of the stored token entry
    pub const TOKEN_ID: &str = "fg_tkn_id";
    /// Identifier of the authorization entry
    pub const AUTHORIZATION_ID: &str = "fg_au_id";
    /// Granted scopes (array)
    pub const SCOPES: &str = "fg_scp";
    /// Presenters (client identifiers allowed to use the token)
    pub const PRESENTERS: &str = "fg_prst";
    /// Resources the token is valid for
    pub const RESOURCES: &str = "fg_rsrc";
    /// PKCE code challenge bound to an authorization code
    pub const CODE_CHALLENGE: &str = "fg_cd_chlg";
    /// PKCE code challenge method bound to an authorization code
    pub const CODE_CHALLENGE_METHOD: &str = "fg_cd_chlg_meth";
    /// Redirect URI bound to an authorization code
    pub const REDIRECT_URI: &str = "fg_reduri";
    /// Creation date (seconds since epoch)
    pub const CREATION_DATE: &str = "fg_crt_dt";
    /// User code bound to a device code
    pub const USER_CODE: &str = "fg_usr_cd";
    /// Identifier of the device code entry a user code approves
    pub const DEVICE_CODE_ID: &str = "fg_dvc_id";
}
