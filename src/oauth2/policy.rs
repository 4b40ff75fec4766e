// ABOUTME: Trust and policy gate: app usability, client authentication resolution, PKCE checks
// ABOUTME: Comparisons over challenge material are constant-time
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::models::OAuth2Error;
use crate::constants::oauth;
use crate::models::{Application, AuthorizationSession};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// How the client must authenticate at the token endpoint
///
/// PKCE and client secrets are mutually exclusive: a session that stored a
/// challenge is exchanged with a verifier, everything else needs a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuthMethod {
    /// Verifier must satisfy the stored challenge
    Pkce,
    /// A valid client secret must be presented
    ClientSecret,
}

/// Resolve the required client authentication for a session
#[must_use]
pub fn resolve_client_auth(session: &AuthorizationSession) -> ClientAuthMethod {
    if session.has_pkce() {
        ClientAuthMethod::Pkce
    } else {
        ClientAuthMethod::ClientSecret
    }
}

/// Reject suspended applications; `None` maps to `invalid_client`
///
/// # Errors
/// Returns `invalid_client` for unknown apps and `access_denied` while suspended
pub fn require_usable_app(
    app: Option<Application>,
    now: DateTime<Utc>,
) -> Result<Application, OAuth2Error> {
    let app = app.ok_or_else(OAuth2Error::invalid_client)?;
    if app.is_suspended(now) {
        return Err(OAuth2Error::access_denied());
    }
    Ok(app)
}

/// Reject applications that have not enabled the device flow
///
/// # Errors
/// Returns `unauthorized_client` when the flag is off
pub fn require_device_flow_enabled(app: &Application) -> Result<(), OAuth2Error> {
    if !app.device_code_enabled {
        return Err(OAuth2Error::unauthorized_client(
            "Device code flow is disabled for this application",
        ));
    }
    Ok(())
}

/// Whether the challenge method is one we can verify
#[must_use]
pub fn is_supported_challenge_method(method: &str) -> bool {
    method == oauth::PKCE_METHOD_PLAIN || method == oauth::PKCE_METHOD_S256
}

/// Compute the S256 challenge for a verifier: base64url(SHA-256(verifier)), no padding
#[must_use]
pub fn compute_s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verify a PKCE verifier against the stored challenge, constant-time
///
/// # Errors
/// Returns `invalid_grant` on mismatch or an unknown method
pub fn check_pkce(challenge: &str, method: &str, verifier: &str) -> Result<(), OAuth2Error> {
    let matches = match method {
        oauth::PKCE_METHOD_S256 => {
            let computed = compute_s256_challenge(verifier);
            bool::from(computed.as_bytes().ct_eq(challenge.as_bytes()))
        }
        oauth::PKCE_METHOD_PLAIN => bool::from(verifier.as_bytes().ct_eq(challenge.as_bytes())),
        _ => {
            return Err(OAuth2Error::invalid_grant(
                "Unsupported code_challenge_method",
            ))
        }
    };

    if matches {
        Ok(())
    } else {
        Err(OAuth2Error::invalid_grant("Invalid code_verifier"))
    }
}
