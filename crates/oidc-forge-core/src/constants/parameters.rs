// ABOUTME: OAuth2 / OpenID Connect request and response parameter names
// ABOUTME: Shared by the request extraction and response rendering handlers

/// `access_token` parameter
pub const ACCESS_TOKEN: &str = "access_token";
/// `client_id` parameter
pub const CLIENT_ID: &str = "client_id";
/// `client_secret` parameter
pub const CLIENT_SECRET: &str = "client_secret";
/// `code` parameter
pub const CODE: &str = "code";
/// `code_challenge` parameter
pub const CODE_CHALLENGE: &str = "code_challenge";
/// `code_challenge_method` parameter
pub const CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
/// `code_verifier` parameter
pub const CODE_VERIFIER: &str = "code_verifier";
/// `device_code` parameter
pub const DEVICE_CODE: &str = "device_code";
/// `error` parameter
pub const ERROR: &str = "error";
/// `error_description` parameter
pub const ERROR_DESCRIPTION: &str = "error_description";
/// `error_uri` parameter
pub const ERROR_URI: &str = "error_uri";
/// `expires_in` parameter
pub const EXPIRES_IN: &str = "expires_in";
/// `grant_type` parameter
pub const GRANT_TYPE: &str = "grant_type";
/// `id_token_hint` parameter
pub const ID_TOKEN_HINT: &str = "id_token_hint";
/// `post_logout_redirect_uri` parameter
pub const POST_LOGOUT_REDIRECT_URI: &str = "post_logout_redirect_uri";
/// `redirect_uri` parameter
pub const REDIRECT_URI: &str = "redirect_uri";
/// `refresh_token` parameter
pub const REFRESH_TOKEN: &str = "refresh_token";
/// `response_type` parameter
pub const RESPONSE_TYPE: &str = "response_type";
/// `scope` parameter
pub const SCOPE: &str = "scope";
/// `state` parameter
pub const STATE: &str = "state";
/// `token` parameter
pub const TOKEN: &str = "token";
/// `token_type` parameter
pub const TOKEN_TYPE: &str = "token_type";
/// `token_type_hint` parameter
pub const TOKEN_TYPE_HINT: &str = "token_type_hint";
/// `user_code` parameter
pub const USER_CODE: &str = "user_code";
/// `verification_uri` parameter
pub const VERIFICATION_URI: &str = "verification_uri";
/// `verification_uri_complete` parameter
pub const VERIFICATION_URI_COMPLETE: &str = "verification_uri_complete";
