// ABOUTME: Cryptographic key management for token signing
// ABOUTME: Owns the process-wide RSA signing key and its JWKS projection
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// RSA key pairs, JWKS, and the shared signer
pub mod keys;

pub use keys::{
    init_shared_signer, shared_signer, JsonWebKey, JsonWebKeySet, JwksManager, RsaKeyPair,
};
