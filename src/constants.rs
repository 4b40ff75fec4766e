// ABOUTME: Protocol literals, identifier alphabets, and timing limits shared across the server
// ABOUTME: Single source of truth for OAuth grant names, token TTLs, and session lifetimes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// OAuth 2.0 / OIDC protocol literals
pub mod oauth {
    /// Authorization code grant (RFC 6749 section 4.1)
    pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
    /// Device authorization grant (RFC 8628)
    pub const GRANT_TYPE_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
    /// The only supported response type on the authorization endpoint
    pub const RESPONSE_TYPE_CODE: &str = "code";
    /// PKCE challenge methods (RFC 7636)
    pub const PKCE_METHOD_PLAIN: &str = "plain";
    /// SHA-256 PKCE challenge method
    pub const PKCE_METHOD_S256: &str = "S256";
    /// Token type returned by the token endpoint
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";
}

/// Session and token lifetimes
pub mod limits {
    /// Authorization sessions live 15 minutes from creation, both flows
    pub const SESSION_TTL_MINUTES: i64 = 15;
    /// Access tokens default to 7 days
    pub const ACCESS_TOKEN_TTL_DAYS: i64 = 7;
    /// ID tokens default to 1 hour
    pub const ID_TOKEN_TTL_HOURS: i64 = 1;
    /// Device flow poll interval floor in seconds
    pub const DEVICE_POLL_INTERVAL_SECS: i64 = 5;
    /// `expires_in` advertised by the device authorization endpoint
    pub const DEVICE_CODE_EXPIRES_IN_SECS: u64 = 900;
    /// `expires_in` advertised by the token endpoint (7 days)
    pub const ACCESS_TOKEN_EXPIRES_IN_SECS: u64 = 604_800;
}

/// Identifier shapes
pub mod ids {
    /// Application identifiers are 21-char URL-safe tokens
    pub const APP_ID_LEN: usize = 21;
    /// Session ids, device codes, and auth codes are 32-char URL-safe tokens
    pub const TOKEN_LEN: usize = 32;
    /// User codes are 8 positions from the transcription-safe alphabet
    pub const USER_CODE_LEN: usize = 8;
    /// nanoid-style URL-safe alphabet
    pub const URL_SAFE_ALPHABET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
    /// 32 symbols, no I/O/1/0 to prevent transcription errors
    pub const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    /// Raw API keys carry this prefix so logs can identify them without storing them
    pub const API_KEY_PREFIX: &str = "sk_";
}

/// Service identity
pub mod service_names {
    /// Name used in logging configuration
    pub const SERVICE: &str = "passgate";
    /// The built-in application id that user-session bearer tokens are issued for
    pub const SYSTEM_CLIENT: &str = "system";
}
