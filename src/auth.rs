// ABOUTME: RS256 token signing and validation for access tokens, ID tokens, and user sessions
// ABOUTME: Extracts authenticated (username, client_id) context from bearer headers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Token Signing and Session Authentication
//!
//! Access tokens and ID tokens are stateless RS256 JWTs signed with the
//! process-wide key from [`crate::crypto`]. User-session bearer tokens are
//! ordinary access tokens issued for the built-in `system` application.

use crate::constants::{limits, service_names};
use crate::crypto::JwksManager;
use crate::errors::AppError;
use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer (backend base URL)
    pub iss: String,
    /// Audience: the client application id
    pub aud: String,
    /// Subject: the username
    pub sub: String,
    /// Issued-at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Application id, duplicated for clients that read flat claims
    #[serde(rename = "appId")]
    pub app_id: String,
    /// Username, duplicated for clients that read flat claims
    pub username: String,
}

/// Claims carried by OIDC ID tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer (backend base URL)
    pub iss: String,
    /// Audience: the client application id
    pub aud: String,
    /// Subject: the username
    pub sub: String,
    /// Issued-at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Username claim
    pub username: String,
    /// Replay-protection nonce, echoed when the client supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Token validation error with enough detail for log triage
#[derive(Debug, Clone)]
pub enum JwtValidationError {
    /// Token has expired
    TokenExpired,
    /// Token signature or issuer is invalid
    TokenInvalid {
        /// Reason for invalidity
        reason: String,
    },
    /// Token is not proper JWT format
    TokenMalformed {
        /// Details about malformation
        details: String,
    },
}

impl std::fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenExpired => write!(f, "JWT token has expired"),
            Self::TokenInvalid { reason } => write!(f, "JWT token is invalid: {reason}"),
            Self::TokenMalformed { details } => write!(f, "JWT token is malformed: {details}"),
        }
    }
}

impl std::error::Error for JwtValidationError {}

/// Authenticated caller context extracted from a bearer token
#[derive(Debug, Clone)]
pub struct AuthedUser {
    /// Username from the token subject
    pub username: String,
    /// Application the token was issued for
    pub client_id: String,
}

/// Signs and validates RS256 tokens for a fixed issuer
pub struct AuthManager {
    issuer: String,
}

impl AuthManager {
    /// Create a manager for the given issuer (backend base URL, no trailing slash)
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// The issuer this manager signs for
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign an access token for `username` scoped to `client_id`
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails
    pub fn sign_access_token(
        &self,
        jwks_manager: &JwksManager,
        client_id: &str,
        username: &str,
        ttl: Duration,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: client_id.to_owned(),
            sub: username.to_owned(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            app_id: client_id.to_owned(),
            username: username.to_owned(),
        };

        self.sign(jwks_manager, &claims)
    }

    /// Sign an access token with the default 7-day TTL
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails
    pub fn sign_default_access_token(
        &self,
        jwks_manager: &JwksManager,
        client_id: &str,
        username: &str,
    ) -> Result<String> {
        self.sign_access_token(
            jwks_manager,
            client_id,
            username,
            Duration::days(limits::ACCESS_TOKEN_TTL_DAYS),
        )
    }

    /// Sign an OIDC ID token with the default 1-hour TTL
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails
    pub fn sign_id_token(
        &self,
        jwks_manager: &JwksManager,
        client_id: &str,
        username: &str,
        nonce: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            aud: client_id.to_owned(),
            sub: username.to_owned(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(limits::ID_TOKEN_TTL_HOURS)).timestamp(),
            username: username.to_owned(),
            nonce: nonce.map(str::to_owned),
        };

        self.sign(jwks_manager, &claims)
    }

    fn sign<T: Serialize>(&self, jwks_manager: &JwksManager, claims: &T) -> Result<String> {
        let key = jwks_manager.signing_key();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());

        encode(&header, claims, &key.encoding_key())
            .map_err(|e| anyhow!("Failed to encode RS256 JWT: {e}"))
    }

    /// Validate a token: signature, `exp`, and `iss`
    ///
    /// # Errors
    /// Returns a [`JwtValidationError`] describing why the token was rejected
    pub fn validate_token(
        &self,
        jwks_manager: &JwksManager,
        token: &str,
    ) -> Result<Claims, JwtValidationError> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|e| JwtValidationError::TokenMalformed {
                details: format!("Failed to decode token header: {e}"),
            })?;

        let kid = header
            .kid
            .ok_or_else(|| JwtValidationError::TokenMalformed {
                details: "Token header missing kid (key ID)".to_owned(),
            })?;

        let key = jwks_manager
            .get_key(&kid)
            .ok_or_else(|| JwtValidationError::TokenInvalid {
                reason: format!("Key not found in JWKS: {kid}"),
            })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        // Audience is the per-app client_id; callers check it themselves
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    JwtValidationError::TokenExpired
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature
                | jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    JwtValidationError::TokenInvalid {
                        reason: format!("Token validation failed: {e}"),
                    }
                }
                _ => JwtValidationError::TokenMalformed {
                    details: format!("Token validation failed: {e}"),
                },
            })
    }

    /// Validate a token and return its `(client_id, username)` pair
    ///
    /// # Errors
    /// Returns a [`JwtValidationError`] if the token is rejected
    pub fn validate(
        &self,
        jwks_manager: &JwksManager,
        token: &str,
    ) -> Result<(String, String), JwtValidationError> {
        let claims = self.validate_token(jwks_manager, token)?;
        Ok((claims.app_id, claims.username))
    }

    /// Authenticate a request from its `Authorization` header
    ///
    /// # Errors
    /// Returns 401-mapped [`AppError`]s for missing, malformed, or invalid tokens
    pub fn authenticate_request(
        &self,
        jwks_manager: &JwksManager,
        auth_header: Option<&str>,
    ) -> Result<AuthedUser, AppError> {
        let header = auth_header
            .ok_or_else(|| AppError::auth_required("Authorization header is required"))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::auth_required("Authorization header must be in format Bearer {token}")
        })?;

        let claims = self
            .validate_token(jwks_manager, token)
            .map_err(|e| {
                tracing::debug!("Bearer token rejected: {e}");
                AppError::auth_invalid("Invalid or expired token")
            })?;

        Ok(AuthedUser {
            username: claims.username,
            client_id: claims.app_id,
        })
    }

    /// Authenticate an end-user session: a bearer token issued for the
    /// built-in `system` application
    ///
    /// # Errors
    /// Returns 401-mapped [`AppError`]s for invalid tokens or tokens issued
    /// to other applications
    pub fn authenticate_user_session(
        &self,
        jwks_manager: &JwksManager,
        auth_header: Option<&str>,
    ) -> Result<AuthedUser, AppError> {
        let user = self.authenticate_request(jwks_manager, auth_header)?;
        if user.client_id != service_names::SYSTEM_CLIENT {
            return Err(AppError::auth_invalid("Invalid or expired token"));
        }
        Ok(user)
    }
}
