// ABOUTME: Random identifier generation for applications, sessions, codes, and user codes
// ABOUTME: Samples thread-local CSPRNG output over fixed alphabets
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::constants::ids::{
    APP_ID_LEN, TOKEN_LEN, URL_SAFE_ALPHABET, USER_CODE_ALPHABET, USER_CODE_LEN,
};
use rand::{thread_rng, Rng};

/// Sample `len` symbols uniformly from `alphabet`
fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = thread_rng();
    (0..len)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

/// Generate a 21-char application identifier
#[must_use]
pub fn generate_id() -> String {
    random_string(URL_SAFE_ALPHABET, APP_ID_LEN)
}

/// Generate a 32-char opaque token (session ids, device codes, auth codes)
#[must_use]
pub fn generate_token() -> String {
    random_string(URL_SAFE_ALPHABET, TOKEN_LEN)
}

/// Generate an 8-char user code from the transcription-safe alphabet
#[must_use]
pub fn generate_user_code() -> String {
    random_string(USER_CODE_ALPHABET, USER_CODE_LEN)
}

/// Generate a 64-char client secret
#[must_use]
pub fn generate_secret() -> String {
    random_string(URL_SAFE_ALPHABET, 64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_lengths() {
        assert_eq!(generate_id().len(), 21);
        assert_eq!(generate_token().len(), 32);
        assert_eq!(generate_user_code().len(), 8);
    }

    #[test]
    fn test_user_code_alphabet_excludes_ambiguous_symbols() {
        for _ in 0..64 {
            let code = generate_user_code();
            for c in code.chars() {
                assert!(USER_CODE_ALPHABET.contains(&(c as u8)), "unexpected symbol {c}");
                assert!(!"IO10".contains(c), "ambiguous symbol {c}");
            }
        }
    }

    #[test]
    fn test_tokens_are_url_safe() {
        let token = generate_token();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn test_tokens_do_not_collide_cheaply() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }
}
