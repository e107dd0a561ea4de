//! `fido-u2f` attestation for legacy U2F authenticators

use openssl::nid::Nid;
use openssl::x509::X509;

use super::certificate;
use super::{AttestationContext, AttestationFormat, StatementFields, TrustPath};
use crate::webauthn::cose::{COSEAlgorithmIdentifier, CredentialPublicKey, EcCurve};
use crate::webauthn::errors::WebAuthnError;

const FORMAT: AttestationFormat = AttestationFormat::FidoU2f;

#[derive(Debug)]
pub struct FidoU2fStatement {
    pub sig: Vec<u8>,
    pub certificate: X509,
}

impl FidoU2fStatement {
    pub(crate) fn from_fields(fields: &StatementFields<'_>) -> Result<Self, WebAuthnError> {
        let sig = fields.bytes("sig")?;
        let mut x5c = fields.x5c()?;
        if x5c.len() != 1 {
            return Err(fields.fail(format!(
                "x5c must hold exactly one certificate, got {}",
                x5c.len()
            )));
        }
        let certificate = x5c.remove(0);
        Ok(Self { sig, certificate })
    }

    pub(crate) fn verify(
        &self,
        context: &AttestationContext<'_>,
    ) -> Result<TrustPath, WebAuthnError> {
        let certificate_key = certificate::public_key(FORMAT, &self.certificate)?;
        let on_p256 = certificate_key
            .ec_key()
            .ok()
            .and_then(|ec| ec.group().curve_name())
            == Some(Nid::X9_62_PRIME256V1);
        if !on_p256 {
            return Err(fail("certificate key is not an EC P-256 key"));
        }

        let CredentialPublicKey::Ec2 {
            curve: EcCurve::P256,
            x,
            y,
            ..
        } = context.credential_key
        else {
            return Err(fail("credential key is not an EC P-256 key"));
        };

        // 0x00 || rpIdHash || clientDataHash || credentialId || 0x04 || x || y
        let mut signed = Vec::with_capacity(1 + 32 + 32 + context.credential.credential_id.len() + 65);
        signed.push(0x00);
        signed.extend_from_slice(&context.authenticator_data.relying_party_id_hash);
        signed.extend_from_slice(context.client_data_hash);
        signed.extend_from_slice(&context.credential.credential_id);
        signed.push(0x04);
        signed.extend_from_slice(x);
        signed.extend_from_slice(y);

        certificate::verify_signature(
            FORMAT,
            &self.certificate,
            COSEAlgorithmIdentifier::ES256,
            &self.sig,
            &signed,
        )?;

        Ok(TrustPath::Certificates(vec![self.certificate.clone()]))
    }
}

fn fail(reason: &str) -> WebAuthnError {
    WebAuthnError::attestation(FORMAT.as_str(), reason)
}
