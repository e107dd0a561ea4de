//! `android-key` attestation
//!
//! The credential key is attested by Android Keystore. Its certificate
//! carries a key description extension binding the client data hash.

use der_parser::ber::BerObject;
use der_parser::der::{parse_der, Tag};
use openssl::x509::X509;

use super::certificate;
use super::{AttestationContext, AttestationFormat, StatementFields, TrustPath};
use crate::webauthn::cose::COSEAlgorithmIdentifier;
use crate::webauthn::crypto;
use crate::webauthn::errors::WebAuthnError;

const FORMAT: AttestationFormat = AttestationFormat::AndroidKey;

/// Android key attestation key description
pub(crate) const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";

// KeyDescription sequence positions
const ATTESTATION_CHALLENGE_INDEX: usize = 4;
const SOFTWARE_ENFORCED_INDEX: usize = 6;
const TEE_ENFORCED_INDEX: usize = 7;

/// AuthorizationList tag marking a key usable by every application
const TAG_ALL_APPLICATIONS: u32 = 600;

#[derive(Debug)]
pub struct AndroidKeyStatement {
    pub alg: COSEAlgorithmIdentifier,
    pub sig: Vec<u8>,
    pub x5c: Vec<X509>,
}

impl AndroidKeyStatement {
    pub(crate) fn from_fields(fields: &StatementFields<'_>) -> Result<Self, WebAuthnError> {
        Ok(Self {
            alg: fields.alg()?,
            sig: fields.bytes("sig")?,
            x5c: fields.x5c()?,
        })
    }

    pub(crate) fn verify(
        &self,
        context: &AttestationContext<'_>,
    ) -> Result<TrustPath, WebAuthnError> {
        let leaf = &self.x5c[0];
        let signed =
            crypto::signature_base(context.raw_authenticator_data, context.client_data_hash);
        certificate::verify_signature(FORMAT, leaf, self.alg, &self.sig, &signed)?;

        let leaf_key = certificate::public_key(FORMAT, leaf)?;
        if !context.credential_key.matches_pkey(&leaf_key) {
            return Err(fail("certificate key does not match the credential public key"));
        }

        certificate::inspect(FORMAT, leaf, |parsed| {
            let value = certificate::extension_value(parsed, OID_ANDROID_KEY_DESCRIPTION)
                .ok_or_else(|| fail("key description extension missing"))?;
            check_key_description(value, context.client_data_hash)
        })?;

        Ok(TrustPath::Certificates(self.x5c.clone()))
    }
}

fn check_key_description(value: &[u8], client_data_hash: &[u8; 32]) -> Result<(), WebAuthnError> {
    let (_, description) = parse_der(value)
        .map_err(|e| fail(&format!("key description is not DER: {e}")))?;
    let fields = description
        .as_sequence()
        .map_err(|_| fail("key description is not a sequence"))?;

    let challenge = fields
        .get(ATTESTATION_CHALLENGE_INDEX)
        .and_then(|field| field.as_slice().ok())
        .ok_or_else(|| fail("attestationChallenge missing"))?;
    if challenge != client_data_hash {
        return Err(fail("attestationChallenge does not match client data hash"));
    }

    for index in [SOFTWARE_ENFORCED_INDEX, TEE_ENFORCED_INDEX] {
        let list = fields
            .get(index)
            .ok_or_else(|| fail("authorization list missing"))?;
        if grants_all_applications(list)? {
            return Err(fail("key is scoped to all applications"));
        }
    }
    Ok(())
}

fn grants_all_applications(list: &BerObject<'_>) -> Result<bool, WebAuthnError> {
    let entries = list
        .as_sequence()
        .map_err(|_| fail("authorization list is not a sequence"))?;
    Ok(entries
        .iter()
        .any(|entry| entry.tag() == Tag(TAG_ALL_APPLICATIONS)))
}

fn fail(reason: &str) -> WebAuthnError {
    WebAuthnError::attestation(FORMAT.as_str(), reason)
}
