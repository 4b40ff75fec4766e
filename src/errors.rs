// ABOUTME: Centralized error handling and error types for the passgate API
// ABOUTME: Defines error codes and their HTTP response mapping used across all modules
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Unified Error Handling
//!
//! Internal failures are carried as [`AppError`] with a stable [`ErrorCode`].
//! Protocol-level OAuth errors are a separate wire type
//! ([`crate::oauth2::models::OAuth2Error`]) because RFC 6749/8628 mandate
//! their own JSON shape; everything else maps through `http_status` here.

use serde::Serialize;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Authentication is required but not provided
    AuthRequired,
    /// Authentication credentials are invalid
    AuthInvalid,
    /// Authentication token has expired
    AuthExpired,
    /// Caller lacks permission for the requested operation
    PermissionDenied,
    /// Input validation failed
    InvalidInput,
    /// Requested resource was not found
    ResourceNotFound,
    /// Rate limit has been exceeded
    RateLimitExceeded,
    /// Database operation failed
    DatabaseError,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// HTTP status code for this error category
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired => 401,
            Self::PermissionDenied => 403,
            Self::InvalidInput => 400,
            Self::ResourceNotFound => 404,
            Self::RateLimitExceeded => 429,
            Self::DatabaseError | Self::InternalError => 500,
        }
    }
}

/// Application error with a stable code and a human-readable message
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// Error category
    pub code: ErrorCode,
    /// Human-readable message, safe to return to callers
    pub message: String,
}

impl AppError {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Authentication required (401)
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthRequired, message)
    }

    /// Invalid credentials (401)
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Invalid input (400)
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, message)
    }

    /// Internal error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// HTTP status for the response
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Record not found"),
            other => Self::new(ErrorCode::DatabaseError, format!("Database error: {other}")),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

/// Result alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// JSON body for non-protocol error responses: `{"message": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub message: String,
}

impl ErrorResponse {
    /// Build a response body from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
