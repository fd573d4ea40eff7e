//! PAM request signing (HMAC-SHA256 + base64), used by administrative
//! endpoints — grant-token, revoke-token, and other secret-key-signed
//! requests (§6, "grant-token / revoke-token ... signed with the
//! secret key").

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `string_to_sign` with `secret_key`, returning a URL-safe-ish
/// base64 signature (PubNub's `v2.` prefix scheme replaces `+`/`/`
/// with `-`/`_` and strips trailing `=`, which callers apply after
/// this returns the raw base64).
pub fn sign(secret_key: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Apply PubNub's `v2.` signature transform: base64 standard encoding
/// with `+`/`/` swapped for URL-safe `-`/`_` and the `=` padding
/// stripped.
pub fn to_v2_signature(raw_base64: &str) -> String {
    raw_base64
        .replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_is_deterministic() {
        let a = sign("secret", "GET\npub\nsub\n/publish\n");
        let b = sign("secret", "GET\npub\nsub\n/publish\n");
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_differ() {
        let a = sign("secret-a", "same string");
        let b = sign("secret-b", "same string");
        assert_ne!(a, b);
    }

    #[test]
    fn v2_signature_is_url_safe() {
        let sig = to_v2_signature("a+b/c==");
        assert!(!sig.contains('+'));
        assert!(!sig.contains('/'));
        assert!(!sig.contains('='));
    }
}
