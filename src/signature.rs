use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify the `X-Hub-Signature-256` header Meta attaches to webhook deliveries.
///
/// The header carries `sha256=<hex digest>` where the digest is HMAC-SHA256
/// over the raw request body keyed with the app secret. The comparison is
/// constant-time via `Mac::verify_slice`.
pub fn verify_signature(app_secret: &str, header: Option<&str>, body: &[u8]) -> bool {
    let Some(header) = header else {
        return false;
    };
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub(crate) fn sign(app_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // HMAC-SHA256 known-answer test, RFC 4231 case 2.
    const RFC4231_KEY: &str = "Jefe";
    const RFC4231_DATA: &[u8] = b"what do ya want for nothing?";
    const RFC4231_DIGEST: &str =
        "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";

    #[test]
    fn accepts_known_good_signature() {
        let header = format!("sha256={}", RFC4231_DIGEST);
        assert!(verify_signature(RFC4231_KEY, Some(&header), RFC4231_DATA));
    }

    #[test]
    fn accepts_self_signed_body() {
        let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let header = sign("app-secret", body);
        assert!(verify_signature("app-secret", Some(&header), body));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(!verify_signature(RFC4231_KEY, None, RFC4231_DATA));
    }

    #[test]
    fn rejects_wrong_prefix() {
        let header = format!("sha1={}", RFC4231_DIGEST);
        assert!(!verify_signature(RFC4231_KEY, Some(&header), RFC4231_DATA));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(!verify_signature(RFC4231_KEY, Some("sha256=zz-not-hex"), RFC4231_DATA));
    }

    #[test]
    fn rejects_tampered_body() {
        let header = format!("sha256={}", RFC4231_DIGEST);
        assert!(!verify_signature(
            RFC4231_KEY,
            Some(&header),
            b"what do ya want for something?"
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = format!("sha256={}", RFC4231_DIGEST);
        assert!(!verify_signature("not-jefe", Some(&header), RFC4231_DATA));
    }
}
