use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the keyed HMAC-SHA256 of `data` and returns it as lowercase hex.
///
/// This is the deterministic hash used wherever an opaque secret must be
/// stored server-side without persisting the secret itself (refresh tokens,
/// registration and password-reset codes).
pub fn hmac_sha256_hex(key: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a hex digest against a freshly computed
/// HMAC-SHA256 of `data`.
pub fn hmac_sha256_verify(key: &str, data: &[u8], expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hmac_is_deterministic() {
        let a = hmac_sha256_hex("key", b"the quick brown fox");
        let b = hmac_sha256_hex("key", b"the quick brown fox");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hmac_sha256_hex("other key", b"the quick brown fox"));
    }

    #[test]
    fn hmac_verify_matches_encode() {
        let digest = hmac_sha256_hex("key", b"payload");
        assert!(hmac_sha256_verify("key", b"payload", &digest));
        assert!(!hmac_sha256_verify("key", b"payload2", &digest));
        assert!(!hmac_sha256_verify("key", b"payload", "not-hex"));
    }

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("1".into()), false));
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(parse_boolean_flag(None, true));
    }
}
