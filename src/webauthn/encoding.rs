//! Base64URL helpers
//!
//! Browsers emit unpadded base64url, some client libraries pad it. Both are
//! accepted; anything outside the URL-safe alphabet is rejected.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use super::errors::WebAuthnError;

/// URL-safe engine that accepts padded and unpadded input
pub const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64url field of a credential response
///
/// # Errors
/// Returns `WebAuthnError::InvalidEncoding` naming the field if decoding fails
pub fn decode_base64url(field: &str, value: &str) -> Result<Vec<u8>, WebAuthnError> {
    URL_SAFE_LENIENT
        .decode(value)
        .map_err(|e| WebAuthnError::InvalidEncoding(format!("{field}: {e}")))
}

/// Encode bytes as unpadded base64url
#[must_use]
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_accepts_padded_and_unpadded() {
        assert_eq!(decode_base64url("f", "AQI").unwrap(), vec![1, 2]);
        assert_eq!(decode_base64url("f", "AQI=").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        let err = decode_base64url("clientDataJSON", "a+b/").unwrap_err();
        assert!(matches!(err, WebAuthnError::InvalidEncoding(msg) if msg.starts_with("clientDataJSON")));
    }

    #[test]
    fn test_encode_is_unpadded() {
        assert_eq!(encode_base64url(&[1, 2]), "AQI");
    }
}
