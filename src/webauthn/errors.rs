//! `WebAuthn` error types
//!
//! Every verification step fails with its own variant so callers can record
//! the exact rejection reason in audit logs. None of these should be shown to
//! end users verbatim; map them to a generic rejection at the HTTP layer.

use thiserror::Error;

/// `WebAuthn` errors that can occur during ceremony verification
#[derive(Debug, Error)]
pub enum WebAuthnError {
    /// Authenticator data is truncated, over-length, or its flags disagree
    /// with its content
    #[error("Malformed authenticator data: {0}")]
    MalformedAuthenticatorData(String),

    /// The attestation object is not valid CBOR
    #[error("Invalid CBOR: {0}")]
    InvalidCbor(String),

    /// `authData` is missing from the attestation object or is not a byte string
    #[error("Attestation object has no authData byte string")]
    InvalidAuthData,

    /// `fmt` is missing from the attestation object or is not a text string
    #[error("Attestation object has no fmt text string")]
    InvalidFmt,

    /// `attStmt` is missing from the attestation object
    #[error("Attestation object has no attStmt")]
    MissingAttestationStatement,

    /// `fmt` names an attestation format we do not know
    #[error("Unknown attestation format: {0}")]
    UnknownAttestationFormat(String),

    /// The rpIdHash in authenticator data is not SHA-256 of the relying party ID
    #[error("Relying party ID hash does not match")]
    RelyingPartyIdMismatch,

    /// The user present flag is not set
    #[error("User present flag not set")]
    UserPresentNotSet,

    /// User verification was required but the user verified flag is not set
    #[error("User verified flag not set")]
    UserVerifiedNotSet,

    /// Registration authenticator data carries no attested credential data
    #[error("Attested credential data missing")]
    AttestedCredentialDataMissing,

    /// Signature counter did not advance; the authenticator may be cloned
    #[error("Potential replay or cloned authenticator: stored counter {stored}, reported {reported}")]
    PotentialReplayOrClone { stored: u32, reported: u32 },

    /// Client data `type` is not the one expected for this ceremony
    #[error("Ceremony type mismatch: expected {expected}, got {actual}")]
    CeremonyTypeMismatch { expected: String, actual: String },

    /// Client data challenge does not equal the expected challenge
    #[error("Challenge mismatch")]
    ChallengeMismatch,

    /// Client data origin does not equal the relying party origin
    #[error("Origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    /// Client data JSON could not be decoded
    #[error("Invalid client data: {0}")]
    InvalidClientData(String),

    /// A base64url field of a credential response could not be decoded
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The credential `type` is not `public-key`
    #[error("Invalid credential type: {0}")]
    InvalidCredentialType(String),

    /// COSE algorithm identifier outside the supported set
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    /// COSE key is structurally invalid
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Cryptographic signature verification failed
    #[error("Invalid signature")]
    InvalidSignature,

    /// The assertion names a credential other than the stored one
    #[error("Credential ID does not match the stored credential")]
    CredentialMismatch,

    /// Credential ID exceeds 1023 bytes
    #[error("Credential ID too long: {0} bytes")]
    CredentialIdTooLong(usize),

    /// A format specific attestation check failed
    #[error("Attestation verification failed ({format}): {reason}")]
    AttestationVerificationFailed { format: String, reason: String },

    /// The attestation certificate chain does not lead to a trusted root
    #[error("Attestation chain untrusted ({format}): {reason}")]
    AttestationChainUntrusted { format: String, reason: String },

    /// Configuration error (e.g., invalid settings)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl WebAuthnError {
    /// Stable label for audit logs and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedAuthenticatorData(_) => "malformed_binary_layout",
            Self::InvalidCbor(_) => "invalid_cbor",
            Self::InvalidAuthData => "invalid_auth_data",
            Self::InvalidFmt => "invalid_fmt",
            Self::MissingAttestationStatement => "missing_attestation_statement",
            Self::UnknownAttestationFormat(_) => "unknown_attestation_format",
            Self::RelyingPartyIdMismatch => "relying_party_id_mismatch",
            Self::UserPresentNotSet => "user_present_not_set",
            Self::UserVerifiedNotSet => "user_verified_not_set",
            Self::AttestedCredentialDataMissing => "attested_credential_data_missing",
            Self::PotentialReplayOrClone { .. } => "potential_replay_or_clone",
            Self::CeremonyTypeMismatch { .. } => "ceremony_type_mismatch",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::OriginMismatch { .. } => "origin_mismatch",
            Self::InvalidClientData(_) => "invalid_client_data",
            Self::InvalidEncoding(_) => "invalid_encoding",
            Self::InvalidCredentialType(_) => "invalid_credential_type",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::InvalidPublicKey(_) => "invalid_public_key",
            Self::InvalidSignature => "invalid_signature",
            Self::CredentialMismatch => "credential_mismatch",
            Self::CredentialIdTooLong(_) => "credential_id_too_long",
            Self::AttestationVerificationFailed { .. } => "attestation_verification_failed",
            Self::AttestationChainUntrusted { .. } => "attestation_chain_untrusted",
            Self::ConfigurationError(_) => "configuration_error",
        }
    }

    pub(crate) fn attestation(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AttestationVerificationFailed {
            format: format.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_format() {
        let err = WebAuthnError::attestation("packed", "sig missing");
        assert_eq!(
            err.to_string(),
            "Attestation verification failed (packed): sig missing"
        );
        assert_eq!(err.kind(), "attestation_verification_failed");
    }

    #[test]
    fn test_replay_error_reports_counters() {
        let err = WebAuthnError::PotentialReplayOrClone {
            stored: 5,
            reported: 5,
        };
        assert!(err.to_string().contains("stored counter 5"));
        assert_eq!(err.kind(), "potential_replay_or_clone");
    }
}
