//! `packed` attestation
//!
//! Either full attestation with an `x5c` certificate chain or self
//! attestation signed by the credential key. ECDAA is not supported.

use openssl::x509::X509;

use super::certificate;
use super::{AttestationContext, AttestationFormat, StatementFields, TrustPath};
use crate::webauthn::cose::COSEAlgorithmIdentifier;
use crate::webauthn::crypto;
use crate::webauthn::errors::WebAuthnError;

const FORMAT: AttestationFormat = AttestationFormat::Packed;

#[derive(Debug)]
pub struct PackedStatement {
    pub alg: COSEAlgorithmIdentifier,
    pub sig: Vec<u8>,
    pub x5c: Option<Vec<X509>>,
}

impl PackedStatement {
    pub(crate) fn from_fields(fields: &StatementFields<'_>) -> Result<Self, WebAuthnError> {
        if fields.contains("ecdaaKeyId") {
            return Err(fields.fail("ECDAA attestation is not supported"));
        }
        let alg = fields.alg()?;
        let sig = fields.bytes("sig")?;
        let x5c = if fields.contains("x5c") {
            Some(fields.x5c()?)
        } else {
            None
        };
        Ok(Self { alg, sig, x5c })
    }

    pub(crate) fn verify(
        &self,
        context: &AttestationContext<'_>,
    ) -> Result<TrustPath, WebAuthnError> {
        let signed =
            crypto::signature_base(context.raw_authenticator_data, context.client_data_hash);

        match &self.x5c {
            Some(chain) => {
                let leaf = &chain[0];
                certificate::verify_signature(FORMAT, leaf, self.alg, &self.sig, &signed)?;
                certificate::inspect(FORMAT, leaf, |parsed| {
                    certificate::check_packed_requirements(FORMAT, parsed)?;
                    certificate::check_aaguid_extension(FORMAT, parsed, &context.credential.aaguid)
                })?;
                Ok(TrustPath::Certificates(chain.clone()))
            }
            None => {
                if self.alg != context.credential_key.algorithm() {
                    return Err(WebAuthnError::attestation(
                        FORMAT.as_str(),
                        format!(
                            "self attestation alg {} does not match credential key {}",
                            self.alg,
                            context.credential_key.algorithm()
                        ),
                    ));
                }
                context
                    .credential_key
                    .verify(&self.sig, &signed)
                    .map_err(|_| {
                        WebAuthnError::attestation(
                            FORMAT.as_str(),
                            "self attestation signature does not verify",
                        )
                    })?;
                Ok(TrustPath::SelfAttestation)
            }
        }
    }
}
