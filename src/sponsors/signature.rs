// HMAC-SHA256 webhook authenticity check

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::models::RejectReason;

/// Header carrying `sha256=<hex HMAC of the raw body>`.
pub const SIGNATURE_HEADER: &str = "x-signature-256";

pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    signature_header: Option<&str>,
) -> Result<(), RejectReason> {
    let secret = secret.ok_or(RejectReason::SecretNotConfigured)?;
    let header = signature_header.ok_or(RejectReason::MissingSignature)?;

    let Some(hex_sig) = header.trim().strip_prefix("sha256=") else {
        return Err(RejectReason::InvalidSignature);
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return Err(RejectReason::InvalidSignature);
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return Err(RejectReason::InvalidSignature);
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| RejectReason::InvalidSignature)
}

#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"id":"evt_1"}"#;

    #[test]
    fn test_valid_signature() {
        let header = sign("whsec", BODY);
        assert_eq!(verify_signature(Some("whsec"), BODY, Some(&header)), Ok(()));
    }

    #[test]
    fn test_signature_failures_are_named() {
        let header = sign("whsec", BODY);

        assert_eq!(
            verify_signature(None, BODY, Some(&header)),
            Err(RejectReason::SecretNotConfigured)
        );
        assert_eq!(
            verify_signature(Some("whsec"), BODY, None),
            Err(RejectReason::MissingSignature)
        );
        assert_eq!(
            verify_signature(Some("other"), BODY, Some(&header)),
            Err(RejectReason::InvalidSignature)
        );
        assert_eq!(
            verify_signature(Some("whsec"), br#"{"id":"evt_2"}"#, Some(&header)),
            Err(RejectReason::InvalidSignature)
        );
        assert_eq!(
            verify_signature(Some("whsec"), BODY, Some("sha256=zz")),
            Err(RejectReason::InvalidSignature)
        );
    }
}
