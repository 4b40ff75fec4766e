// ABOUTME: Self-hosted identity provider with OAuth 2.0 / OIDC single sign-on
// ABOUTME: Library crate wiring the credential store, session store, signer, and HTTP surface
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # passgate
//!
//! A self-hosted identity provider and single-sign-on server. Registered
//! applications delegate user authentication here through the OAuth 2.0
//! authorization code flow (with PKCE, RFC 7636) and the device
//! authorization flow (RFC 8628). Tokens are RS256 JWTs verifiable against
//! the published JWKS.
//!
//! ## Architecture
//!
//! - [`database`]: SQLite-backed credential and session stores
//! - [`crypto`]: process-wide RSA signing key and JWKS
//! - [`auth`]: token signing/validation and bearer authentication
//! - [`oauth2`]: the authorization engines, policy gate, and protocol routes
//! - [`routes`]: consent endpoints, health, and route composition

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// API key generation and hashing
pub mod api_keys;
/// Token signing and bearer authentication
pub mod auth;
/// Environment-driven configuration
pub mod config;
/// Shared protocol and timing constants
pub mod constants;
/// RSA key management and JWKS
pub mod crypto;
/// Persistence layer
pub mod database;
/// Unified error handling
pub mod errors;
/// Structured logging setup
pub mod logging;
/// Domain models and the session state machine
pub mod models;
/// OAuth 2.0 / OIDC engine
pub mod oauth2;
/// HTTP route composition
pub mod routes;
/// Shared helpers
pub mod utils;
