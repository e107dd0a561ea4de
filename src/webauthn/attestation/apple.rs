//! `apple` anonymous attestation

use der_parser::ber::BerObjectContent;
use der_parser::der::parse_der;
use openssl::x509::X509;

use super::certificate;
use super::{AttestationContext, AttestationFormat, StatementFields, TrustPath};
use crate::webauthn::crypto;
use crate::webauthn::errors::WebAuthnError;

const FORMAT: AttestationFormat = AttestationFormat::Apple;

/// Apple anonymous attestation nonce extension
pub(crate) const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";

#[derive(Debug)]
pub struct AppleStatement {
    pub x5c: Vec<X509>,
}

impl AppleStatement {
    pub(crate) fn from_fields(fields: &StatementFields<'_>) -> Result<Self, WebAuthnError> {
        Ok(Self { x5c: fields.x5c()? })
    }

    pub(crate) fn verify(
        &self,
        context: &AttestationContext<'_>,
    ) -> Result<TrustPath, WebAuthnError> {
        let leaf = &self.x5c[0];
        let expected_nonce = crypto::sha256(&crypto::signature_base(
            context.raw_authenticator_data,
            context.client_data_hash,
        ));

        let nonce = certificate::inspect(FORMAT, leaf, |parsed| {
            let value = certificate::extension_value(parsed, OID_APPLE_NONCE)
                .ok_or_else(|| fail("nonce extension missing"))?;
            extract_nonce(value)
        })?;
        if nonce != expected_nonce {
            return Err(fail("nonce does not match authenticator and client data"));
        }

        let leaf_key = certificate::public_key(FORMAT, leaf)?;
        if !context.credential_key.matches_pkey(&leaf_key) {
            return Err(fail("certificate key does not match the credential public key"));
        }

        Ok(TrustPath::Certificates(self.x5c.clone()))
    }
}

/// `SEQUENCE { [1] EXPLICIT OCTET STRING }`
fn extract_nonce(value: &[u8]) -> Result<Vec<u8>, WebAuthnError> {
    let (_, outer) = parse_der(value).map_err(|e| fail(&format!("nonce is not DER: {e}")))?;
    let tagged = outer
        .as_sequence()
        .ok()
        .and_then(|items| items.first())
        .ok_or_else(|| fail("nonce extension is not a sequence"))?;

    let nonce = match &tagged.content {
        BerObjectContent::Tagged(_, _, inner) => inner.as_slice().map(<[u8]>::to_vec).ok(),
        BerObjectContent::Unknown(any) => parse_der(any.data)
            .ok()
            .and_then(|(_, inner)| inner.as_slice().ok().map(<[u8]>::to_vec)),
        _ => None,
    };
    nonce.ok_or_else(|| fail("nonce extension has no octet string"))
}

fn fail(reason: &str) -> WebAuthnError {
    WebAuthnError::attestation(FORMAT.as_str(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::builders::apple_nonce_extension;

    #[test]
    fn test_extract_nonce() {
        let nonce = [3u8; 32];
        assert_eq!(extract_nonce(&apple_nonce_extension(&nonce)).unwrap(), nonce);
    }

    #[test]
    fn test_extract_nonce_rejects_bare_octet_string() {
        assert!(extract_nonce(&[0x04, 0x02, 0x01, 0x02]).is_err());
    }
}
