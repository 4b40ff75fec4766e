// ABOUTME: OAuth 2.0 wire-level request and response types for both flows
// ABOUTME: Implements the RFC 6749/8628 error shape with constructors per error code
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authorization request (GET /oauth2/authorize query parameters)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type; only `code` is supported
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Opaque client state echoed back on redirect
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE challenge method, `plain` or `S256`; defaults to `plain`
    pub code_challenge_method: Option<String>,
}

/// Token request (POST /oauth2/token form fields, plus HTTP Basic credentials)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Grant type selector
    pub grant_type: String,
    /// Authorization code (code flow)
    pub code: Option<String>,
    /// Client identifier, from the form or Basic auth username
    pub client_id: Option<String>,
    /// Client secret, from the form or Basic auth password
    pub client_secret: Option<String>,
    /// PKCE code verifier (code flow)
    pub code_verifier: Option<String>,
    /// Device code (device flow)
    pub device_code: Option<String>,
}

/// Successful token response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Always "Bearer"
    pub token_type: String,
    /// RS256 access token
    pub access_token: String,
    /// RS256 OIDC ID token
    pub id_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Device authorization response (RFC 8628 section 3.2)
#[derive(Debug, Serialize)]
pub struct DeviceAuthorizationResponse {
    /// Opaque code the client polls with
    pub device_code: String,
    /// Short code the user types at the verification URI
    pub user_code: String,
    /// Where the user goes to enter the code
    pub verification_uri: String,
    /// Verification URI with the user code pre-filled
    pub verification_uri_complete: String,
    /// Minimum seconds between polls
    pub interval: u64,
    /// Session lifetime in seconds
    pub expires_in: u64,
}

/// Session details returned to the consent UI
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetailsResponse {
    /// Session identifier
    pub session_id: String,
    /// Application requesting access
    pub app_id: String,
    /// User that decided, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Current session status
    pub status: String,
    /// Session deadline
    pub expires_at: DateTime<Utc>,
}

/// Consent decision posted by the authenticated user
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    /// Session being decided
    pub session_id: String,
    /// true approves, false denies
    pub approve: bool,
}

/// Consent response for the device flow
#[derive(Debug, Serialize)]
pub struct ConsentMessageResponse {
    /// Human-readable outcome
    pub message: String,
}

/// Consent response for the code flow: where the UI should navigate
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRedirectResponse {
    /// Final redirect target, back to the client or to the auth page
    pub redirect_url: String,
}

/// OAuth 2.0 error response (RFC 6749 section 5.2, RFC 8628 section 3.5)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuth2Error {
    fn bare(code: &str) -> Self {
        Self {
            error: code.to_owned(),
            error_description: None,
        }
    }

    fn described(code: &str, description: &str) -> Self {
        Self {
            error: code.to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::described("invalid_request", description)
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::described("invalid_client", "Client authentication failed")
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::described("invalid_grant", description)
    }

    /// Create an `unauthorized_client` error
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self::described("unauthorized_client", description)
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::described("unsupported_grant_type", "Grant type not supported")
    }

    /// Create an `access_denied` error
    #[must_use]
    pub fn access_denied() -> Self {
        Self::bare("access_denied")
    }

    /// Create an `authorization_pending` error (RFC 8628)
    #[must_use]
    pub fn authorization_pending() -> Self {
        Self::bare("authorization_pending")
    }

    /// Create a `slow_down` error (RFC 8628)
    #[must_use]
    pub fn slow_down() -> Self {
        Self::bare("slow_down")
    }

    /// Create an `expired_token` error (RFC 8628)
    #[must_use]
    pub fn expired_token() -> Self {
        Self::bare("expired_token")
    }
}
