//! Short confirmation codes for registration and password reset emails.
//!
//! Codes are 6 alphanumeric characters. Only an HMAC of the code is persisted, keyed with the
//! server-side secret, so a database dump does not expose usable codes.

use mps_common::helpers::{hmac_sha256_hex, hmac_sha256_verify};
use rand::{distributions::Alphanumeric, Rng};

pub const CODE_LENGTH: usize = 6;

/// Generate a fresh confirmation code, uppercased for readability in emails.
pub fn new_confirmation_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LENGTH)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

/// The hash that gets persisted in place of the code.
pub fn hash_code(code: &str, hmac_key: &str) -> String {
    hmac_sha256_hex(hmac_key, code.trim().to_ascii_uppercase().as_bytes())
}

/// Constant-time comparison of a user-supplied code against the stored hash.
pub fn verify_code(code: &str, stored_hash: &str, hmac_key: &str) -> bool {
    let candidate = code.trim().to_ascii_uppercase();
    hmac_sha256_verify(hmac_key, candidate.as_bytes(), stored_hash)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_are_six_alphanumeric_chars() {
        for _ in 0..100 {
            let code = new_confirmation_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(!code.chars().any(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn verify_accepts_case_and_whitespace_variants() {
        let code = new_confirmation_code();
        let hash = hash_code(&code, "test-key");
        assert!(verify_code(&code, &hash, "test-key"));
        assert!(verify_code(&format!("  {} ", code.to_ascii_lowercase()), &hash, "test-key"));
    }

    #[test]
    fn verify_rejects_wrong_code_and_wrong_key() {
        let hash = hash_code("ABC123", "test-key");
        assert!(!verify_code("ABC124", &hash, "test-key"));
        assert!(!verify_code("ABC123", &hash, "other-key"));
    }
}
