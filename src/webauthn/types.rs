//! `WebAuthn` core types
//!
//! Wire shapes of the credentials a browser returns, plus the records the
//! caller stores between ceremonies. Binary members travel as base64url.

use serde::{Deserialize, Serialize};

/// Registration response from client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCredential {
    pub id: String,     // Base64URL-encoded credential ID
    pub raw_id: String, // Base64URL-encoded raw credential ID
    pub response: AuthenticatorAttestationResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
}

/// Authentication response from client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationCredential {
    pub id: String,     // Base64URL-encoded credential ID
    pub raw_id: String, // Base64URL-encoded raw credential ID
    pub response: AuthenticatorAssertionResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub r#type: String, // Always "public-key"
}

/// Authenticator attestation response during registration
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String, // Base64URL-encoded client data JSON
    #[serde(rename = "attestationObject")]
    pub attestation_object: String, // Base64URL-encoded attestation object
}

/// Authenticator assertion response during authentication
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String, // Base64URL-encoded client data JSON
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String, // Base64URL-encoded authenticator data
    pub signature: String, // Base64URL-encoded signature
    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>, // Base64URL-encoded user handle
}

/// Credential record kept by the relying party after registration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredCredential {
    pub credential_id: Vec<u8>,
    /// COSE-encoded public key
    pub public_key: Vec<u8>,
    /// Last accepted signature counter
    pub counter: u32,
}

/// Outcome of a verified assertion
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifiedAssertion {
    /// Counter reported by the authenticator; store it for the next ceremony
    pub sign_count: u32,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backup_state: bool,
}

/// Authentication result
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub credential_id: Vec<u8>,
    /// Updated signature counter
    pub counter: u32,
    pub user_verified: bool,
    pub backup_state: bool,
    /// User handle returned by the authenticator, if any
    pub user_handle: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_credential_wire_names() {
        let json = r#"{
            "id": "AQ",
            "rawId": "AQ",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "attestationObject": "oA"
            }
        }"#;
        let credential: RegistrationCredential = serde_json::from_str(json).unwrap();
        assert_eq!(credential.raw_id, "AQ");
        assert_eq!(credential.response.client_data_json, "e30");
        assert!(credential.client_extension_results.is_none());
    }

    #[test]
    fn test_authentication_credential_without_user_handle() {
        let json = r#"{
            "id": "AQ",
            "rawId": "AQ",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AA",
                "signature": "AA"
            }
        }"#;
        let credential: AuthenticationCredential = serde_json::from_str(json).unwrap();
        assert!(credential.response.user_handle.is_none());
    }
}
