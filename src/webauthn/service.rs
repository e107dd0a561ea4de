//! `WebAuthn` service implementation
//!
//! This module provides the main `WebAuthn` service, finishing registration
//! and authentication ceremonies against the configured relying party.
//! Challenge issuance and credential storage belong to the caller.

use log::{info, warn};

use super::attestation::TrustAnchors;
use super::authentication::ParsedAuthenticatorAssertionResponse;
use super::authenticator_data::AttestedCredentialData;
use super::cose::{COSEAlgorithmIdentifier, CredentialPublicKey};
use super::encoding::encode_base64url;
use super::errors::WebAuthnError;
use super::registration::ParsedCredentialCreationResponse;
use super::settings::WebAuthnSettings;
use super::types::{
    AuthenticationCredential, AuthenticationResult, RegistrationCredential, StoredCredential,
};

/// Core `WebAuthn` service
#[derive(Debug, Clone)]
pub struct WebAuthnService {
    settings: WebAuthnSettings,
    algorithms: Vec<COSEAlgorithmIdentifier>,
    trust_anchors: TrustAnchors,
}

impl WebAuthnService {
    /// Create a new `WebAuthnService` with the given settings
    ///
    /// # Errors
    /// Returns `WebAuthnError::ConfigurationError` if the settings are invalid
    pub fn new(
        settings: WebAuthnSettings,
        trust_anchors: TrustAnchors,
    ) -> Result<Self, WebAuthnError> {
        settings.validate()?;
        let algorithms = settings.algorithms()?;
        info!(
            "WebAuthn relying party {} ready at {} (user verification {})",
            settings.rp_id, settings.rp_origin, settings.user_verification
        );
        Ok(Self {
            settings,
            algorithms,
            trust_anchors,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &WebAuthnSettings {
        &self.settings
    }

    /// Complete registration with client response
    ///
    /// # Arguments
    /// * `credential` - Registration response from client
    /// * `challenge` - Raw challenge bytes issued for this ceremony
    ///
    /// # Returns
    /// * `Ok(AttestedCredentialData)` - The credential to store
    /// * `Err(WebAuthnError)` - If any verification step fails
    ///
    /// # Errors
    /// Returns a `WebAuthnError` naming the first failed check
    pub async fn finish_registration(
        &self,
        credential: &RegistrationCredential,
        challenge: &[u8],
    ) -> Result<AttestedCredentialData, WebAuthnError> {
        let result = self.verify_registration(credential, challenge).await;
        match &result {
            Ok(attested) => info!(
                "Registered credential {} from authenticator {}",
                encode_base64url(&attested.credential_id),
                attested.aaguid_uuid()
            ),
            Err(err) => warn!(
                "Registration of credential {} rejected ({}): {err}",
                credential.id,
                err.kind()
            ),
        }
        result
    }

    async fn verify_registration(
        &self,
        credential: &RegistrationCredential,
        challenge: &[u8],
    ) -> Result<AttestedCredentialData, WebAuthnError> {
        ParsedCredentialCreationResponse::try_from(credential)?
            .verify(
                challenge,
                self.settings.require_user_verification(),
                &self.settings.rp_id,
                &self.settings.rp_origin,
                &self.algorithms,
                &self.trust_anchors,
            )
            .await
    }

    /// Complete authentication with client response
    ///
    /// Before the ceremony checks run, the response's `rawId` must equal the
    /// stored credential ID (`CredentialMismatch`) and the stored key's
    /// algorithm must be one the relying party supports
    /// (`UnsupportedAlgorithm`). These two checks fail ahead of any client
    /// data or authenticator data error.
    ///
    /// # Arguments
    /// * `credential` - Authentication response from client
    /// * `challenge` - Raw challenge bytes issued for this ceremony
    /// * `stored` - The credential record saved at registration
    ///
    /// # Returns
    /// * `Ok(AuthenticationResult)` - Result with the updated counter, which
    ///   the caller must persist
    /// * `Err(WebAuthnError)` - If authentication fails
    ///
    /// # Errors
    /// Returns a `WebAuthnError` naming the first failed check
    pub fn finish_authentication(
        &self,
        credential: &AuthenticationCredential,
        challenge: &[u8],
        stored: &StoredCredential,
    ) -> Result<AuthenticationResult, WebAuthnError> {
        let result = self.verify_authentication(credential, challenge, stored);
        match &result {
            Ok(outcome) => info!(
                "Authenticated credential {} (counter {}, user verified {})",
                encode_base64url(&outcome.credential_id),
                outcome.counter,
                outcome.user_verified
            ),
            Err(err) => warn!(
                "Authentication with credential {} rejected ({}): {err}",
                credential.id,
                err.kind()
            ),
        }
        result
    }

    fn verify_authentication(
        &self,
        credential: &AuthenticationCredential,
        challenge: &[u8],
        stored: &StoredCredential,
    ) -> Result<AuthenticationResult, WebAuthnError> {
        let response = ParsedAuthenticatorAssertionResponse::try_from(credential)?;
        if response.raw_id != stored.credential_id {
            return Err(WebAuthnError::CredentialMismatch);
        }

        CredentialPublicKey::from_cose(&stored.public_key)?.ensure_supported(&self.algorithms)?;

        let verified = response.verify(
            challenge,
            &self.settings.rp_origin,
            &self.settings.rp_id,
            self.settings.require_user_verification(),
            &stored.public_key,
            stored.counter,
        )?;

        Ok(AuthenticationResult {
            credential_id: stored.credential_id.clone(),
            counter: verified.sign_count,
            user_verified: verified.user_verified,
            backup_state: verified.backup_state,
            user_handle: response.user_handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::settings::UserVerificationPolicy;

    #[test]
    fn test_new_validates_settings() {
        let settings = WebAuthnSettings {
            rp_origin: "http://example.com".to_string(),
            rp_id: "example.com".to_string(),
            ..WebAuthnSettings::default()
        };
        assert!(matches!(
            WebAuthnService::new(settings, TrustAnchors::default()),
            Err(WebAuthnError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_new_resolves_algorithms() {
        let settings = WebAuthnSettings {
            user_verification: UserVerificationPolicy::Required,
            supported_algorithms: vec![-7],
            ..WebAuthnSettings::default()
        };
        let service = WebAuthnService::new(settings, TrustAnchors::default()).unwrap();
        assert_eq!(service.algorithms, vec![COSEAlgorithmIdentifier::ES256]);
        assert!(service.settings().require_user_verification());
    }
}
