//! `WebAuthn` cryptography helpers
//!
//! SHA-256 and the signature-base construction shared by the ceremony
//! verifiers and the attestation formats.

use ring::digest;

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}

/// Concatenate authenticator data and the client data hash.
///
/// This is the message signed for assertions and for the `packed`,
/// `tpm` and `android-key` attestation formats.
#[must_use]
pub fn signature_base(raw_authenticator_data: &[u8], client_data_hash: &[u8]) -> Vec<u8> {
    let mut verify_data =
        Vec::with_capacity(raw_authenticator_data.len() + client_data_hash.len());
    verify_data.extend_from_slice(raw_authenticator_data);
    verify_data.extend_from_slice(client_data_hash);
    verify_data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let hash = sha256(b"abc");
        assert_eq!(
            hash[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "SHA-256(\"abc\") prefix"
        );
    }

    #[test]
    fn test_signature_base_order() {
        let base = signature_base(&[1, 2], &[3, 4]);
        assert_eq!(base, vec![1, 2, 3, 4]);
    }
}
