//! `WebAuthn` attestation processing
//!
//! Decodes the attestation object returned at registration and verifies its
//! attestation statement. Each format has its own module. Format checks are
//! synchronous and yield a trust path; certificate trust paths are then
//! handed to the injected [`CertificateChainVerifier`].

mod android_key;
mod android_safetynet;
mod apple;
mod certificate;
mod fido_u2f;
mod packed;
mod tpm;
mod trust;

use std::fmt;
use std::str::FromStr;

use ciborium::value::Value;
use log::debug;
use openssl::x509::X509;
use serde::{Deserialize, Serialize};

use super::authenticator_data::{AttestedCredentialData, AuthenticatorData};
use super::cbor;
use super::cose::{COSEAlgorithmIdentifier, CredentialPublicKey};
use super::errors::WebAuthnError;

pub use android_key::AndroidKeyStatement;
pub use android_safetynet::SafetyNetStatement;
pub use apple::AppleStatement;
pub use fido_u2f::FidoU2fStatement;
pub use packed::PackedStatement;
pub use tpm::TpmStatement;
pub use trust::{CertificateChainVerifier, OpenSslChainVerifier, TrustAnchors};

/// Attestation statement formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationFormat {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "packed")]
    Packed,
    #[serde(rename = "fido-u2f")]
    FidoU2f,
    #[serde(rename = "tpm")]
    Tpm,
    #[serde(rename = "android-key")]
    AndroidKey,
    #[serde(rename = "android-safetynet")]
    AndroidSafetyNet,
    #[serde(rename = "apple")]
    Apple,
}

impl AttestationFormat {
    /// The `fmt` identifier used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Packed => "packed",
            Self::FidoU2f => "fido-u2f",
            Self::Tpm => "tpm",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::Apple => "apple",
        }
    }
}

impl FromStr for AttestationFormat {
    type Err = WebAuthnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "packed" => Ok(Self::Packed),
            "fido-u2f" => Ok(Self::FidoU2f),
            "tpm" => Ok(Self::Tpm),
            "android-key" => Ok(Self::AndroidKey),
            "android-safetynet" => Ok(Self::AndroidSafetyNet),
            "apple" => Ok(Self::Apple),
            other => Err(WebAuthnError::UnknownAttestationFormat(other.to_string())),
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded attestation object
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub authenticator_data: AuthenticatorData,
    /// Authenticator data exactly as signed
    pub raw_authenticator_data: Vec<u8>,
    pub format: AttestationFormat,
    /// Format specific statement, left undecoded until verification
    pub attestation_statement: Value,
}

impl AttestationObject {
    /// Decode a CBOR attestation object and parse its authenticator data
    ///
    /// # Errors
    /// Returns `InvalidCbor`, `InvalidAuthData`, `InvalidFmt`,
    /// `UnknownAttestationFormat`, `MissingAttestationStatement` or
    /// `MalformedAuthenticatorData`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        let value = cbor::decode(bytes).map_err(WebAuthnError::InvalidCbor)?;
        let Value::Map(map) = value else {
            return Err(WebAuthnError::InvalidCbor(
                "attestation object is not a map".to_string(),
            ));
        };

        let raw_authenticator_data = cbor::map_get(&map, "authData")
            .and_then(Value::as_bytes)
            .cloned()
            .ok_or(WebAuthnError::InvalidAuthData)?;

        let format = cbor::map_get(&map, "fmt")
            .and_then(Value::as_text)
            .ok_or(WebAuthnError::InvalidFmt)?
            .parse::<AttestationFormat>()?;

        let attestation_statement = cbor::map_get(&map, "attStmt")
            .cloned()
            .ok_or(WebAuthnError::MissingAttestationStatement)?;

        let authenticator_data = AuthenticatorData::parse(&raw_authenticator_data)?;

        Ok(Self {
            authenticator_data,
            raw_authenticator_data,
            format,
            attestation_statement,
        })
    }

    /// Verify the attestation statement and, when it carries certificates,
    /// their chain against the trust anchors for this format
    ///
    /// # Errors
    /// Returns `AttestationVerificationFailed` when a format check fails and
    /// `AttestationChainUntrusted` when the chain does not lead to a root
    pub(crate) async fn verify_statement(
        &self,
        credential: &AttestedCredentialData,
        credential_key: &CredentialPublicKey,
        client_data_hash: &[u8; 32],
        trust_anchors: &TrustAnchors,
    ) -> Result<(), WebAuthnError> {
        let statement = AttestationStatement::from_cbor(self.format, &self.attestation_statement)?;
        let context = AttestationContext {
            authenticator_data: &self.authenticator_data,
            raw_authenticator_data: &self.raw_authenticator_data,
            client_data_hash,
            credential,
            credential_key,
        };

        match statement.verify(&context)? {
            TrustPath::Empty => debug!("Attestation format {} carries no trust path", self.format),
            TrustPath::SelfAttestation => debug!("Self attestation accepted"),
            TrustPath::Certificates(chain) => {
                trust_anchors.verify_chain(self.format, &chain).await?;
            }
        }
        Ok(())
    }
}

/// Everything a statement is verified against
pub(crate) struct AttestationContext<'a> {
    pub authenticator_data: &'a AuthenticatorData,
    pub raw_authenticator_data: &'a [u8],
    pub client_data_hash: &'a [u8; 32],
    pub credential: &'a AttestedCredentialData,
    pub credential_key: &'a CredentialPublicKey,
}

/// What a format check established
pub(crate) enum TrustPath {
    /// `none` attestation
    Empty,
    /// Signed by the credential key itself
    SelfAttestation,
    /// Certificate chain, leaf first, still to be checked against roots
    Certificates(Vec<X509>),
}

/// A decoded attestation statement
#[derive(Debug)]
pub enum AttestationStatement {
    None,
    Packed(PackedStatement),
    FidoU2f(FidoU2fStatement),
    Tpm(TpmStatement),
    AndroidKey(AndroidKeyStatement),
    AndroidSafetyNet(SafetyNetStatement),
    Apple(AppleStatement),
}

impl AttestationStatement {
    /// Decode `attStmt` for the given format
    ///
    /// # Errors
    /// Returns `AttestationVerificationFailed` if required members are
    /// missing or have the wrong type
    pub fn from_cbor(format: AttestationFormat, value: &Value) -> Result<Self, WebAuthnError> {
        let fields = StatementFields::new(format, value)?;
        let statement = match format {
            AttestationFormat::None => {
                if !fields.is_empty() {
                    return Err(WebAuthnError::attestation(
                        format.as_str(),
                        "statement must be empty",
                    ));
                }
                Self::None
            }
            AttestationFormat::Packed => Self::Packed(PackedStatement::from_fields(&fields)?),
            AttestationFormat::FidoU2f => Self::FidoU2f(FidoU2fStatement::from_fields(&fields)?),
            AttestationFormat::Tpm => Self::Tpm(TpmStatement::from_fields(&fields)?),
            AttestationFormat::AndroidKey => {
                Self::AndroidKey(AndroidKeyStatement::from_fields(&fields)?)
            }
            AttestationFormat::AndroidSafetyNet => {
                Self::AndroidSafetyNet(SafetyNetStatement::from_fields(&fields)?)
            }
            AttestationFormat::Apple => Self::Apple(AppleStatement::from_fields(&fields)?),
        };
        Ok(statement)
    }

    pub(crate) fn verify(
        &self,
        context: &AttestationContext<'_>,
    ) -> Result<TrustPath, WebAuthnError> {
        match self {
            Self::None => Ok(TrustPath::Empty),
            Self::Packed(statement) => statement.verify(context),
            Self::FidoU2f(statement) => statement.verify(context),
            Self::Tpm(statement) => statement.verify(context),
            Self::AndroidKey(statement) => statement.verify(context),
            Self::AndroidSafetyNet(statement) => statement.verify(context),
            Self::Apple(statement) => statement.verify(context),
        }
    }
}

/// Typed access to the members of an `attStmt` map
pub(crate) struct StatementFields<'a> {
    format: AttestationFormat,
    map: &'a [(Value, Value)],
}

impl<'a> StatementFields<'a> {
    fn new(format: AttestationFormat, value: &'a Value) -> Result<Self, WebAuthnError> {
        let map = value
            .as_map()
            .ok_or_else(|| WebAuthnError::attestation(format.as_str(), "attStmt is not a map"))?;
        Ok(Self { format, map })
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        cbor::map_get(self.map, key).is_some()
    }

    pub fn fail(&self, reason: impl Into<String>) -> WebAuthnError {
        WebAuthnError::attestation(self.format.as_str(), reason)
    }

    pub fn bytes(&self, key: &str) -> Result<Vec<u8>, WebAuthnError> {
        cbor::map_get(self.map, key)
            .and_then(Value::as_bytes)
            .cloned()
            .ok_or_else(|| self.fail(format!("{key} missing or not a byte string")))
    }

    pub fn text(&self, key: &str) -> Result<&'a str, WebAuthnError> {
        cbor::map_get(self.map, key)
            .and_then(Value::as_text)
            .ok_or_else(|| self.fail(format!("{key} missing or not a text string")))
    }

    /// `alg`, which must be an algorithm we can verify
    pub fn alg(&self) -> Result<COSEAlgorithmIdentifier, WebAuthnError> {
        let id = cbor::map_get(self.map, "alg")
            .and_then(cbor::as_i64)
            .ok_or_else(|| self.fail("alg missing or not an integer"))?;
        COSEAlgorithmIdentifier::try_from(id)
    }

    /// `x5c`, decoded as DER certificates, leaf first
    pub fn x5c(&self) -> Result<Vec<X509>, WebAuthnError> {
        let value = cbor::map_get(self.map, "x5c").ok_or_else(|| self.fail("x5c missing"))?;
        certificate::parse_x5c(self.format, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::builders::{
        build_authenticator_data, encode_attestation_object, encode_cbor, AuthenticatorDataOptions,
    };
    use crate::webauthn::authenticator_data::AuthenticatorFlags;

    fn auth_data() -> Vec<u8> {
        build_authenticator_data(&AuthenticatorDataOptions {
            flags: AuthenticatorFlags::USER_PRESENT,
            ..AuthenticatorDataOptions::for_rp_id("example.com")
        })
    }

    fn encode(entries: Vec<(&str, Value)>) -> Vec<u8> {
        let map = entries
            .into_iter()
            .map(|(k, v)| (Value::Text(k.to_string()), v))
            .collect();
        encode_cbor(&Value::Map(map))
    }

    #[test]
    fn test_format_parsing() {
        for format in [
            AttestationFormat::None,
            AttestationFormat::Packed,
            AttestationFormat::FidoU2f,
            AttestationFormat::Tpm,
            AttestationFormat::AndroidKey,
            AttestationFormat::AndroidSafetyNet,
            AttestationFormat::Apple,
        ] {
            assert_eq!(format.as_str().parse::<AttestationFormat>().unwrap(), format);
        }
        assert!(matches!(
            "compound".parse::<AttestationFormat>(),
            Err(WebAuthnError::UnknownAttestationFormat(f)) if f == "compound"
        ));
    }

    #[test]
    fn test_decode_none_attestation_object() {
        let bytes = encode_attestation_object("none", &auth_data(), Value::Map(vec![]));
        let object = AttestationObject::from_bytes(&bytes).unwrap();
        assert_eq!(object.format, AttestationFormat::None);
        assert_eq!(object.raw_authenticator_data, auth_data());
        assert!(object.authenticator_data.flags.user_present());
    }

    #[test]
    fn test_trailing_bytes_after_attestation_object() {
        let mut bytes = encode_attestation_object("none", &auth_data(), Value::Map(vec![]));
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);
        assert!(matches!(
            AttestationObject::from_bytes(&bytes),
            Err(WebAuthnError::InvalidCbor(_))
        ));
    }

    #[test]
    fn test_not_cbor() {
        assert!(matches!(
            AttestationObject::from_bytes(&[0xff, 0x00]),
            Err(WebAuthnError::InvalidCbor(_))
        ));
    }

    #[test]
    fn test_missing_auth_data() {
        let bytes = encode(vec![
            ("fmt", Value::Text("none".into())),
            ("attStmt", Value::Map(vec![])),
        ]);
        assert!(matches!(
            AttestationObject::from_bytes(&bytes),
            Err(WebAuthnError::InvalidAuthData)
        ));
    }

    #[test]
    fn test_auth_data_wrong_type() {
        let bytes = encode(vec![
            ("authData", Value::Text("nope".into())),
            ("fmt", Value::Text("none".into())),
            ("attStmt", Value::Map(vec![])),
        ]);
        assert!(matches!(
            AttestationObject::from_bytes(&bytes),
            Err(WebAuthnError::InvalidAuthData)
        ));
    }

    #[test]
    fn test_missing_fmt() {
        let bytes = encode(vec![
            ("authData", Value::Bytes(auth_data())),
            ("attStmt", Value::Map(vec![])),
        ]);
        assert!(matches!(
            AttestationObject::from_bytes(&bytes),
            Err(WebAuthnError::InvalidFmt)
        ));
    }

    #[test]
    fn test_unknown_fmt_is_rejected_before_statement() {
        let bytes = encode(vec![
            ("authData", Value::Bytes(auth_data())),
            ("fmt", Value::Text("made-up".into())),
        ]);
        assert!(matches!(
            AttestationObject::from_bytes(&bytes),
            Err(WebAuthnError::UnknownAttestationFormat(_))
        ));
    }

    #[test]
    fn test_missing_att_stmt() {
        let bytes = encode(vec![
            ("authData", Value::Bytes(auth_data())),
            ("fmt", Value::Text("none".into())),
        ]);
        assert!(matches!(
            AttestationObject::from_bytes(&bytes),
            Err(WebAuthnError::MissingAttestationStatement)
        ));
    }

    #[test]
    fn test_malformed_auth_data_inside_object() {
        let bytes = encode_attestation_object("none", &[0u8; 20], Value::Map(vec![]));
        assert!(matches!(
            AttestationObject::from_bytes(&bytes),
            Err(WebAuthnError::MalformedAuthenticatorData(_))
        ));
    }

    #[test]
    fn test_none_statement_must_be_empty() {
        let statement = Value::Map(vec![(Value::Text("sig".into()), Value::Bytes(vec![1]))]);
        assert!(matches!(
            AttestationStatement::from_cbor(AttestationFormat::None, &statement),
            Err(WebAuthnError::AttestationVerificationFailed { ref format, .. }) if format == "none"
        ));
    }

    #[test]
    fn test_statement_must_be_map() {
        assert!(matches!(
            AttestationStatement::from_cbor(AttestationFormat::Packed, &Value::Bytes(vec![])),
            Err(WebAuthnError::AttestationVerificationFailed { .. })
        ));
    }
}
