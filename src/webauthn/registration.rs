//! Registration ceremony verification

use log::debug;

use super::attestation::{AttestationObject, TrustAnchors};
use super::authenticator_data::AttestedCredentialData;
use super::client_data::{CeremonyType, CollectedClientData};
use super::cose::{COSEAlgorithmIdentifier, CredentialPublicKey};
use super::crypto;
use super::encoding::decode_base64url;
use super::errors::WebAuthnError;
use super::types::RegistrationCredential;

/// Longest credential ID a relying party accepts
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

const PUBLIC_KEY_CREDENTIAL_TYPE: &str = "public-key";

/// A registration response with every binary member decoded
#[derive(Debug, Clone)]
pub struct ParsedCredentialCreationResponse {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub raw_client_data_json: Vec<u8>,
    pub client_data: CollectedClientData,
    pub attestation_object: AttestationObject,
}

impl TryFrom<&RegistrationCredential> for ParsedCredentialCreationResponse {
    type Error = WebAuthnError;

    fn try_from(credential: &RegistrationCredential) -> Result<Self, Self::Error> {
        if credential.r#type != PUBLIC_KEY_CREDENTIAL_TYPE {
            return Err(WebAuthnError::InvalidCredentialType(
                credential.r#type.clone(),
            ));
        }

        let raw_id = decode_base64url("rawId", &credential.raw_id)?;
        let raw_client_data_json =
            decode_base64url("clientDataJSON", &credential.response.client_data_json)?;
        let client_data = CollectedClientData::from_json(&raw_client_data_json)?;
        let attestation_object_bytes =
            decode_base64url("attestationObject", &credential.response.attestation_object)?;
        let attestation_object = AttestationObject::from_bytes(&attestation_object_bytes)?;

        Ok(Self {
            id: credential.id.clone(),
            raw_id,
            raw_client_data_json,
            client_data,
            attestation_object,
        })
    }
}

impl ParsedCredentialCreationResponse {
    /// Verify the registration ceremony
    ///
    /// # Arguments
    /// * `expected_challenge` - Raw challenge bytes issued for this ceremony
    /// * `verify_user` - Whether the user verified flag is required
    /// * `relying_party_id` - The RP ID the credential is scoped to
    /// * `relying_party_origin` - The exact origin the RP is served from
    /// * `supported_algorithms` - Algorithms the RP advertised
    /// * `trust_anchors` - Attestation roots and chain verifier
    ///
    /// # Returns
    /// The attested credential data to store for later authentication
    ///
    /// # Errors
    /// Returns the first failed check as a `WebAuthnError`; no partially
    /// verified credential is ever returned
    pub async fn verify(
        &self,
        expected_challenge: &[u8],
        verify_user: bool,
        relying_party_id: &str,
        relying_party_origin: &str,
        supported_algorithms: &[COSEAlgorithmIdentifier],
        trust_anchors: &TrustAnchors,
    ) -> Result<AttestedCredentialData, WebAuthnError> {
        self.client_data
            .verify(expected_challenge, CeremonyType::Create, relying_party_origin)?;

        let client_data_hash = crypto::sha256(&self.raw_client_data_json);
        let credential = self
            .verify_attestation(
                &client_data_hash,
                verify_user,
                relying_party_id,
                supported_algorithms,
                trust_anchors,
            )
            .await?;

        if self.raw_id.len() > MAX_CREDENTIAL_ID_LEN {
            return Err(WebAuthnError::CredentialIdTooLong(self.raw_id.len()));
        }

        Ok(credential)
    }

    async fn verify_attestation(
        &self,
        client_data_hash: &[u8; 32],
        verify_user: bool,
        relying_party_id: &str,
        supported_algorithms: &[COSEAlgorithmIdentifier],
        trust_anchors: &TrustAnchors,
    ) -> Result<AttestedCredentialData, WebAuthnError> {
        let object = &self.attestation_object;
        let authenticator_data = &object.authenticator_data;

        if authenticator_data.relying_party_id_hash != crypto::sha256(relying_party_id.as_bytes())
        {
            return Err(WebAuthnError::RelyingPartyIdMismatch);
        }
        if !authenticator_data.flags.user_present() {
            return Err(WebAuthnError::UserPresentNotSet);
        }
        if verify_user && !authenticator_data.flags.user_verified() {
            return Err(WebAuthnError::UserVerifiedNotSet);
        }

        let credential = authenticator_data
            .attested_credential_data
            .as_ref()
            .ok_or(WebAuthnError::AttestedCredentialDataMissing)?;

        let credential_key = CredentialPublicKey::from_cose(&credential.credential_public_key)?;
        credential_key.ensure_supported(supported_algorithms)?;

        object
            .verify_statement(credential, &credential_key, client_data_hash, trust_anchors)
            .await?;

        debug!(
            "Attestation {} verified for authenticator {}",
            object.format,
            credential.aaguid_uuid()
        );
        Ok(credential.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::builders::{
        build_authenticator_data, client_data_json, encode_attestation_object,
        AttestedCredentialOptions, AuthenticatorDataOptions,
    };
    use crate::testing::TestCredential;
    use crate::webauthn::authenticator_data::AuthenticatorFlags;
    use crate::webauthn::encoding::encode_base64url;
    use crate::webauthn::types::AuthenticatorAttestationResponse;
    use ciborium::value::Value;

    const RP_ID: &str = "example.com";
    const ORIGIN: &str = "https://example.com";
    const CHALLENGE: &[u8] = b"registration-challenge";

    fn credential_with(flags: u8, credential_id: Vec<u8>) -> RegistrationCredential {
        let key = TestCredential::generate();
        let auth_data = build_authenticator_data(&AuthenticatorDataOptions {
            flags,
            attested_credential_data: Some(AttestedCredentialOptions {
                aaguid: [0; 16],
                credential_id: credential_id.clone(),
                credential_public_key: key.cose_public_key(),
            }),
            ..AuthenticatorDataOptions::for_rp_id(RP_ID)
        });
        RegistrationCredential {
            id: encode_base64url(&credential_id),
            raw_id: encode_base64url(&credential_id),
            response: AuthenticatorAttestationResponse {
                client_data_json: encode_base64url(&client_data_json(
                    "webauthn.create",
                    CHALLENGE,
                    ORIGIN,
                )),
                attestation_object: encode_base64url(&encode_attestation_object(
                    "none",
                    &auth_data,
                    Value::Map(vec![]),
                )),
            },
            client_extension_results: None,
            r#type: "public-key".to_string(),
        }
    }

    const UP_UV_AT: u8 = AuthenticatorFlags::USER_PRESENT
        | AuthenticatorFlags::USER_VERIFIED
        | AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA;

    async fn verify(credential: &RegistrationCredential) -> Result<AttestedCredentialData, WebAuthnError> {
        ParsedCredentialCreationResponse::try_from(credential)?
            .verify(
                CHALLENGE,
                true,
                RP_ID,
                ORIGIN,
                &[COSEAlgorithmIdentifier::ES256],
                &TrustAnchors::default(),
            )
            .await
    }

    #[tokio::test]
    async fn test_none_attestation_succeeds() {
        let credential = credential_with(UP_UV_AT, vec![0x01]);
        let attested = verify(&credential).await.unwrap();
        assert_eq!(attested.credential_id, vec![0x01]);
        assert_eq!(attested.aaguid, [0; 16]);
    }

    #[tokio::test]
    async fn test_wrong_credential_type() {
        let mut credential = credential_with(UP_UV_AT, vec![0x01]);
        credential.r#type = "password".to_string();
        assert!(matches!(
            ParsedCredentialCreationResponse::try_from(&credential),
            Err(WebAuthnError::InvalidCredentialType(_))
        ));
    }

    #[tokio::test]
    async fn test_user_not_verified() {
        let credential = credential_with(
            AuthenticatorFlags::USER_PRESENT | AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA,
            vec![0x01],
        );
        assert!(matches!(
            verify(&credential).await,
            Err(WebAuthnError::UserVerifiedNotSet)
        ));
    }

    #[tokio::test]
    async fn test_user_not_present() {
        let credential = credential_with(
            AuthenticatorFlags::USER_VERIFIED | AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA,
            vec![0x01],
        );
        assert!(matches!(
            verify(&credential).await,
            Err(WebAuthnError::UserPresentNotSet)
        ));
    }

    #[tokio::test]
    async fn test_credential_id_too_long() {
        let credential = credential_with(UP_UV_AT, vec![0xaa; MAX_CREDENTIAL_ID_LEN + 1]);
        assert!(matches!(
            verify(&credential).await,
            Err(WebAuthnError::CredentialIdTooLong(1024))
        ));
    }

    #[tokio::test]
    async fn test_credential_id_at_limit() {
        let credential = credential_with(UP_UV_AT, vec![0xaa; MAX_CREDENTIAL_ID_LEN]);
        assert!(verify(&credential).await.is_ok());
    }

    #[tokio::test]
    async fn test_algorithm_outside_supported_set() {
        let credential = credential_with(UP_UV_AT, vec![0x01]);
        let result = ParsedCredentialCreationResponse::try_from(&credential)
            .unwrap()
            .verify(
                CHALLENGE,
                true,
                RP_ID,
                ORIGIN,
                &[COSEAlgorithmIdentifier::RS256],
                &TrustAnchors::default(),
            )
            .await;
        assert!(matches!(result, Err(WebAuthnError::UnsupportedAlgorithm(-7))));
    }

    #[tokio::test]
    async fn test_invalid_base64_field() {
        let mut credential = credential_with(UP_UV_AT, vec![0x01]);
        credential.response.attestation_object = "***".to_string();
        assert!(matches!(
            ParsedCredentialCreationResponse::try_from(&credential),
            Err(WebAuthnError::InvalidEncoding(_))
        ));
    }
}
