//! Collected client data verification
//!
//! The browser serialises the ceremony context into `clientDataJSON`. The
//! relying party checks it byte-for-byte against what it issued: ceremony
//! type, challenge and origin.

use serde::{Deserialize, Serialize};

use super::encoding::URL_SAFE_LENIENT;
use super::errors::WebAuthnError;
use base64::Engine;

/// Which ceremony the client data belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyType {
    /// Registration, `webauthn.create`
    Create,
    /// Authentication, `webauthn.get`
    Get,
}

impl CeremonyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }
}

/// Client data collected by the browser during a ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// Base64URL-encoded challenge
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
    #[serde(rename = "topOrigin", default, skip_serializing_if = "Option::is_none")]
    pub top_origin: Option<String>,
}

impl CollectedClientData {
    /// Parse raw `clientDataJSON` bytes
    ///
    /// # Errors
    /// Returns `WebAuthnError::InvalidClientData` if the JSON is malformed or
    /// required members are missing
    pub fn from_json(raw: &[u8]) -> Result<Self, WebAuthnError> {
        serde_json::from_slice(raw).map_err(|e| WebAuthnError::InvalidClientData(e.to_string()))
    }

    /// Verify ceremony type, challenge and origin
    ///
    /// # Arguments
    /// * `expected_challenge` - The raw challenge bytes issued for this ceremony
    /// * `ceremony` - The ceremony being completed
    /// * `relying_party_origin` - The exact origin the relying party is served from
    ///
    /// # Errors
    /// Returns `CeremonyTypeMismatch`, `ChallengeMismatch` or `OriginMismatch`
    /// for the first check that fails
    pub fn verify(
        &self,
        expected_challenge: &[u8],
        ceremony: CeremonyType,
        relying_party_origin: &str,
    ) -> Result<(), WebAuthnError> {
        if self.ceremony_type != ceremony.as_str() {
            return Err(WebAuthnError::CeremonyTypeMismatch {
                expected: ceremony.as_str().to_string(),
                actual: self.ceremony_type.clone(),
            });
        }

        // An undecodable challenge cannot equal the expected one.
        let challenge = URL_SAFE_LENIENT
            .decode(&self.challenge)
            .map_err(|_| WebAuthnError::ChallengeMismatch)?;
        if challenge != expected_challenge {
            return Err(WebAuthnError::ChallengeMismatch);
        }

        if self.origin != relying_party_origin {
            return Err(WebAuthnError::OriginMismatch {
                expected: relying_party_origin.to_string(),
                actual: self.origin.clone(),
            });
        }

        Ok(())
    }
}
