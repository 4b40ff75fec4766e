// ABOUTME: API key generation and hashing for app-to-server machine endpoints
// ABOUTME: Raw keys are sk_-prefixed and returned once; only SHA-256 digests persist
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::constants::ids::{API_KEY_PREFIX, URL_SAFE_ALPHABET};
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

/// Random portion length of a raw API key
const API_KEY_RANDOM_LEN: usize = 64;

/// Generates and hashes API keys
#[derive(Debug, Clone, Default)]
pub struct ApiKeyManager;

impl ApiKeyManager {
    /// Create a new manager
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generate a raw API key and its storage hash
    ///
    /// The raw key is returned to the caller exactly once; the hex SHA-256
    /// digest is what the store keeps and what lookups match against.
    #[must_use]
    pub fn generate_key(&self) -> (String, String) {
        let mut rng = thread_rng();
        let random: String = (0..API_KEY_RANDOM_LEN)
            .map(|_| char::from(URL_SAFE_ALPHABET[rng.gen_range(0..URL_SAFE_ALPHABET.len())]))
            .collect();

        let raw = format!("{API_KEY_PREFIX}{random}");
        let hash = self.hash_key(&raw);
        (raw, hash)
    }

    /// Hex SHA-256 digest of a raw key
    #[must_use]
    pub fn hash_key(&self, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
