//! Request signatures for user key-value storage.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signature method sent as `sig_method` alongside [`user_storage_signature`].
pub const HMAC_SHA256: &str = "hmac_sha256";

/// Hex HMAC-SHA256 of `body`, keyed by the user's session key.
///
/// `body` must be the exact bytes sent on the wire; any re-serialization
/// between signing and sending invalidates the signature.
pub fn user_storage_signature(session_key: &str, body: &str) -> Result<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(session_key.as_bytes())
        .map_err(|e| Error::invalid_argument(format!("Invalid session key: {e}")))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check that `sig_method` is one this crate can produce.
pub(crate) fn ensure_supported(sig_method: &str) -> Result<()> {
    if sig_method == HMAC_SHA256 {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "unsupported sig_method {sig_method:?}, only {HMAC_SHA256} is supported"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2.
        let signature = user_storage_signature("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signature_depends_on_exact_body() {
        let compact = user_storage_signature("k", r#"{"kv_list":[{"key":"a","value":"1"}]}"#);
        let spaced = user_storage_signature("k", r#"{"kv_list": [{"key": "a", "value": "1"}]}"#);
        assert_ne!(compact.unwrap(), spaced.unwrap());
    }

    #[test]
    fn test_sig_method() {
        assert!(ensure_supported("hmac_sha256").is_ok());
        assert!(matches!(ensure_supported("md5"), Err(Error::InvalidArgument(_))));
    }
}
