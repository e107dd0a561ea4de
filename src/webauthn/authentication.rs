//! Authentication ceremony verification

use log::debug;

use super::authenticator_data::AuthenticatorData;
use super::client_data::{CeremonyType, CollectedClientData};
use super::cose::CredentialPublicKey;
use super::crypto;
use super::encoding::decode_base64url;
use super::errors::WebAuthnError;
use super::types::{AuthenticationCredential, VerifiedAssertion};

/// An assertion response with every binary member decoded
#[derive(Debug, Clone)]
pub struct ParsedAuthenticatorAssertionResponse {
    pub raw_id: Vec<u8>,
    pub raw_client_data_json: Vec<u8>,
    pub client_data: CollectedClientData,
    pub raw_authenticator_data: Vec<u8>,
    pub authenticator_data: AuthenticatorData,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

impl TryFrom<&AuthenticationCredential> for ParsedAuthenticatorAssertionResponse {
    type Error = WebAuthnError;

    fn try_from(credential: &AuthenticationCredential) -> Result<Self, Self::Error> {
        if credential.r#type != "public-key" {
            return Err(WebAuthnError::InvalidCredentialType(
                credential.r#type.clone(),
            ));
        }
        let response = &credential.response;

        let raw_id = decode_base64url("rawId", &credential.raw_id)?;
        let raw_client_data_json = decode_base64url("clientDataJSON", &response.client_data_json)?;
        let client_data = CollectedClientData::from_json(&raw_client_data_json)?;
        let raw_authenticator_data =
            decode_base64url("authenticatorData", &response.authenticator_data)?;
        let authenticator_data = AuthenticatorData::parse(&raw_authenticator_data)?;
        let signature = decode_base64url("signature", &response.signature)?;
        let user_handle = response
            .user_handle
            .as_deref()
            .filter(|handle| !handle.is_empty())
            .map(|handle| decode_base64url("userHandle", handle))
            .transpose()?;

        Ok(Self {
            raw_id,
            raw_client_data_json,
            client_data,
            raw_authenticator_data,
            authenticator_data,
            signature,
            user_handle,
        })
    }
}

impl ParsedAuthenticatorAssertionResponse {
    /// Verify the authentication ceremony
    ///
    /// # Arguments
    /// * `expected_challenge` - Raw challenge bytes issued for this ceremony
    /// * `relying_party_origin` - The exact origin the RP is served from
    /// * `relying_party_id` - The RP ID the credential is scoped to
    /// * `require_user_verification` - Whether the user verified flag is required
    /// * `credential_public_key` - COSE key stored at registration
    /// * `stored_counter` - Last accepted signature counter
    ///
    /// # Returns
    /// The new counter and flag state; the caller must persist the counter
    ///
    /// # Errors
    /// Returns the first failed check as a `WebAuthnError`
    pub fn verify(
        &self,
        expected_challenge: &[u8],
        relying_party_origin: &str,
        relying_party_id: &str,
        require_user_verification: bool,
        credential_public_key: &[u8],
        stored_counter: u32,
    ) -> Result<VerifiedAssertion, WebAuthnError> {
        self.client_data
            .verify(expected_challenge, CeremonyType::Get, relying_party_origin)?;

        let data = &self.authenticator_data;
        if data.relying_party_id_hash != crypto::sha256(relying_party_id.as_bytes()) {
            return Err(WebAuthnError::RelyingPartyIdMismatch);
        }
        if !data.flags.user_present() {
            return Err(WebAuthnError::UserPresentNotSet);
        }
        if require_user_verification && !data.flags.user_verified() {
            return Err(WebAuthnError::UserVerifiedNotSet);
        }

        check_counter(stored_counter, data.counter)?;

        let key = CredentialPublicKey::from_cose(credential_public_key)?;
        let client_data_hash = crypto::sha256(&self.raw_client_data_json);
        let signed = crypto::signature_base(&self.raw_authenticator_data, &client_data_hash);
        key.verify(&self.signature, &signed)?;

        Ok(VerifiedAssertion {
            sign_count: data.counter,
            user_verified: data.flags.user_verified(),
            backup_eligible: data.flags.backup_eligible(),
            backup_state: data.flags.backup_state(),
        })
    }
}

/// Signature counters must strictly increase unless the authenticator does
/// not implement one (both zero)
fn check_counter(stored: u32, reported: u32) -> Result<(), WebAuthnError> {
    if stored == 0 && reported == 0 {
        debug!("Authenticator reports no signature counter");
        return Ok(());
    }
    if reported > stored {
        Ok(())
    } else {
        Err(WebAuthnError::PotentialReplayOrClone { stored, reported })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_rules() {
        assert!(check_counter(0, 0).is_ok());
        assert!(check_counter(0, 1).is_ok());
        assert!(check_counter(5, 6).is_ok());
        assert!(check_counter(5, u32::MAX).is_ok());
    }

    #[test]
    fn test_counter_not_advancing_is_replay() {
        for stored in [1u32, 2, 100, u32::MAX] {
            for reported in [0, stored / 2, stored.saturating_sub(1), stored] {
                assert!(
                    matches!(
                        check_counter(stored, reported),
                        Err(WebAuthnError::PotentialReplayOrClone { .. })
                    ),
                    "stored {stored} reported {reported}"
                );
            }
        }
    }
}
