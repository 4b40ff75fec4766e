// ABOUTME: RSA key pair generation and JWKS (JSON Web Key Set) management for RS256 signing
// ABOUTME: Process-wide singleton signer behind a readers/writers lock with late initialization
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! JWKS (JSON Web Key Set) Management
//!
//! This module provides:
//! - RSA key pair generation for RS256 JWT signing
//! - JWKS JSON format for public key distribution
//! - A lazily-initialized process-wide signer
//!
//! ## Security Model
//!
//! - The private key never leaves the process
//! - The public key is distributed via `/.well-known/jwks.json`
//! - The key lives for the process lifetime; rotation is out of scope

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::{
    pkcs8::{EncodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, RwLock};

/// RSA key size in bits for RS256
const RSA_KEY_SIZE: usize = 2048;

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// RSA key pair with metadata
#[derive(Clone)]
pub struct RsaKeyPair {
    /// Key identifier: base64url SHA-256 thumbprint of the public JWK (RFC 7638)
    pub kid: String,
    /// Private key for signing
    pub private_key: RsaPrivateKey,
    /// Public key for verification
    pub public_key: RsaPublicKey,
    /// Key creation timestamp
    pub created_at: DateTime<Utc>,
}

impl RsaKeyPair {
    /// Generate a new 2048-bit RSA key pair
    ///
    /// # Errors
    /// Returns an error if key generation fails
    pub fn generate() -> Result<Self> {
        use rand::rngs::OsRng;

        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_SIZE)
            .map_err(|e| anyhow!("Failed to generate RSA private key: {e}"))?;
        let public_key = RsaPublicKey::from(&private_key);

        let kid = Self::thumbprint(&public_key);

        Ok(Self {
            kid,
            private_key,
            public_key,
            created_at: Utc::now(),
        })
    }

    /// RFC 7638 thumbprint over the canonical `{"e","kty","n"}` JWK members
    fn thumbprint(public_key: &RsaPublicKey) -> String {
        use sha2::{Digest, Sha256};

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        // Canonical member order is alphabetical with no whitespace
        let canonical = format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Convert the public key to JWK format
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: "RS256".to_owned(),
            n: URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
        }
    }

    /// Export the private key as PKCS#8 PEM
    ///
    /// # Errors
    /// Returns an error if PEM encoding fails
    pub fn export_private_key_pem(&self) -> Result<String> {
        self.private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| anyhow!("Failed to export private key as PEM: {e}"))
    }

    /// Export the public key as SPKI PEM
    ///
    /// # Errors
    /// Returns an error if PEM encoding fails
    pub fn export_public_key_pem(&self) -> Result<String> {
        self.public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| anyhow!("Failed to export public key as PEM: {e}"))
    }

    /// Get the encoding key for JWT signing
    ///
    /// # Panics
    /// Panics if PEM export or encoding key creation fails (should never happen
    /// with a valid RSA key)
    #[must_use]
    pub fn encoding_key(&self) -> EncodingKey {
        let pem = self
            .export_private_key_pem()
            .expect("Failed to export private key");
        EncodingKey::from_rsa_pem(pem.as_bytes()).expect("Failed to create encoding key")
    }

    /// Get the decoding key for JWT verification
    ///
    /// # Panics
    /// Panics if PEM export or decoding key creation fails (should never happen
    /// with a valid RSA key)
    #[must_use]
    pub fn decoding_key(&self) -> DecodingKey {
        let pem = self
            .export_public_key_pem()
            .expect("Failed to export public key");
        DecodingKey::from_rsa_pem(pem.as_bytes()).expect("Failed to create decoding key")
    }
}

/// Holds the signing key and serves its public JWKS projection
pub struct JwksManager {
    key: RsaKeyPair,
}

impl JwksManager {
    /// Create a manager around a freshly generated key pair
    ///
    /// # Errors
    /// Returns an error if key generation fails
    pub fn new() -> Result<Self> {
        Ok(Self {
            key: RsaKeyPair::generate()?,
        })
    }

    /// The signing key
    #[must_use]
    pub const fn signing_key(&self) -> &RsaKeyPair {
        &self.key
    }

    /// Look up a key by id; the set holds exactly one key
    #[must_use]
    pub fn get_key(&self, kid: &str) -> Option<&RsaKeyPair> {
        (self.key.kid == kid).then_some(&self.key)
    }

    /// JWKS structure for public distribution
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.key.to_jwk()],
        }
    }
}

/// Process-wide signer slot
///
/// Written once at startup by [`init_shared_signer`]; reads go through the
/// read side of the lock. The late initializer covers first use before
/// explicit init (tests, tooling).
static SIGNER: OnceLock<RwLock<Option<Arc<JwksManager>>>> = OnceLock::new();

fn signer_slot() -> &'static RwLock<Option<Arc<JwksManager>>> {
    SIGNER.get_or_init(|| RwLock::new(None))
}

/// Get the process-wide signer, generating the key pair on first use
///
/// # Errors
/// Returns an error if key generation fails or the lock is poisoned
pub fn shared_signer() -> Result<Arc<JwksManager>> {
    {
        let guard = signer_slot()
            .read()
            .map_err(|_| anyhow!("Signer lock poisoned"))?;
        if let Some(manager) = guard.as_ref() {
            return Ok(Arc::clone(manager));
        }
    }

    let mut guard = signer_slot()
        .write()
        .map_err(|_| anyhow!("Signer lock poisoned"))?;
    // Another writer may have won the race between the read and write locks
    if let Some(manager) = guard.as_ref() {
        return Ok(Arc::clone(manager));
    }

    let manager = Arc::new(JwksManager::new()?);
    tracing::info!(kid = %manager.signing_key().kid, "Generated RSA signing key");
    *guard = Some(Arc::clone(&manager));
    Ok(manager)
}

/// Eagerly initialize the process-wide signer at startup
///
/// # Errors
/// Returns an error if key generation fails
pub fn init_shared_signer() -> Result<Arc<JwksManager>> {
    shared_signer()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_has_thumbprint_kid() {
        let key = RsaKeyPair::generate().expect("keygen");
        assert!(!key.kid.is_empty());
        // base64url SHA-256 is 43 chars without padding
        assert_eq!(key.kid.len(), 43);
        assert!(!key.kid.contains('='));
    }

    #[test]
    fn test_jwk_shape() {
        let key = RsaKeyPair::generate().expect("keygen");
        let jwk = key.to_jwk();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, key.kid);
        assert!(!jwk.n.is_empty());
        // 65537 in base64url
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn test_jwks_contains_single_key() {
        let manager = JwksManager::new().expect("keygen");
        let jwks = manager.jwks();
        assert_eq!(jwks.keys.len(), 1);
        assert!(manager.get_key(&jwks.keys[0].kid).is_some());
        assert!(manager.get_key("unknown").is_none());
    }

    #[test]
    fn test_shared_signer_is_stable() {
        let a = shared_signer().expect("signer");
        let b = shared_signer().expect("signer");
        assert_eq!(a.signing_key().kid, b.signing_key().kid);
    }
}
