//! Attestation certificate checks shared by the formats
//!
//! OpenSSL holds the certificates and verifies signatures with them;
//! `x509-parser` reads the extensions attestation formats define.

use ciborium::value::Value;
use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::x509::X509Version;

use super::AttestationFormat;
use crate::webauthn::cose::{self, COSEAlgorithmIdentifier};
use crate::webauthn::errors::WebAuthnError;

/// id-fido-gen-ce-aaguid
pub(super) const OID_FIDO_GEN_CE_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";
/// tcg-kp-AIKCertificate
const OID_TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// Decode an `x5c` array of DER certificates, leaf first
pub(super) fn parse_x5c(
    format: AttestationFormat,
    value: &Value,
) -> Result<Vec<X509>, WebAuthnError> {
    let items = value
        .as_array()
        .ok_or_else(|| fail(format, "x5c is not an array"))?;
    if items.is_empty() {
        return Err(fail(format, "x5c is empty"));
    }
    items
        .iter()
        .map(|item| {
            let der = item
                .as_bytes()
                .ok_or_else(|| fail(format, "x5c entry is not a byte string"))?;
            X509::from_der(der).map_err(|e| fail(format, format!("invalid certificate: {e}")))
        })
        .collect()
}

/// Public key of a certificate
pub(super) fn public_key(
    format: AttestationFormat,
    certificate: &X509,
) -> Result<PKey<Public>, WebAuthnError> {
    certificate
        .public_key()
        .map_err(|e| fail(format, format!("unusable certificate key: {e}")))
}

/// Verify `signature` over `message` with a certificate's key
pub(super) fn verify_signature(
    format: AttestationFormat,
    certificate: &X509,
    algorithm: COSEAlgorithmIdentifier,
    signature: &[u8],
    message: &[u8],
) -> Result<(), WebAuthnError> {
    let key = public_key(format, certificate)?;
    cose::verify_with_pkey(algorithm, &key, signature, message)
        .map_err(|_| fail(format, "signature does not verify with attestation certificate"))
}

/// Run `check` against the parsed form of a certificate
pub(super) fn inspect<T>(
    format: AttestationFormat,
    certificate: &X509,
    check: impl FnOnce(&X509Certificate<'_>) -> Result<T, WebAuthnError>,
) -> Result<T, WebAuthnError> {
    let der = certificate
        .to_der()
        .map_err(|e| fail(format, format!("certificate encoding: {e}")))?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der)
        .map_err(|e| fail(format, format!("certificate parsing: {e}")))?;
    check(&parsed)
}

/// Raw DER value of the extension with the given dotted OID
pub(super) fn extension_value<'a>(
    certificate: &'a X509Certificate<'_>,
    oid: &str,
) -> Option<&'a [u8]> {
    certificate
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == oid)
        .map(|ext| ext.value)
}

fn is_ca(certificate: &X509Certificate<'_>) -> bool {
    certificate.extensions().iter().any(|ext| {
        matches!(ext.parsed_extension(), ParsedExtension::BasicConstraints(bc) if bc.ca)
    })
}

/// If the certificate carries `id-fido-gen-ce-aaguid`, it must equal the
/// AAGUID in authenticator data
pub(super) fn check_aaguid_extension(
    format: AttestationFormat,
    certificate: &X509Certificate<'_>,
    aaguid: &[u8; 16],
) -> Result<(), WebAuthnError> {
    let Some(value) = extension_value(certificate, OID_FIDO_GEN_CE_AAGUID) else {
        return Ok(());
    };
    let (_, object) = der_parser::der::parse_der(value)
        .map_err(|e| fail(format, format!("AAGUID extension: {e}")))?;
    let certificate_aaguid = object
        .as_slice()
        .map_err(|e| fail(format, format!("AAGUID extension: {e}")))?;
    if certificate_aaguid == aaguid {
        Ok(())
    } else {
        Err(fail(
            format,
            "certificate AAGUID does not match authenticator data",
        ))
    }
}

/// Packed attestation certificate requirements: version 3,
/// `OU=Authenticator Attestation`, not a CA
pub(super) fn check_packed_requirements(
    format: AttestationFormat,
    certificate: &X509Certificate<'_>,
) -> Result<(), WebAuthnError> {
    if certificate.version() != X509Version::V3 {
        return Err(fail(format, "attestation certificate must be version 3"));
    }
    let organizational_unit = certificate
        .subject()
        .iter_organizational_unit()
        .next()
        .and_then(|ou| ou.as_str().ok());
    if organizational_unit != Some("Authenticator Attestation") {
        return Err(fail(
            format,
            "attestation certificate subject OU must be \"Authenticator Attestation\"",
        ));
    }
    if is_ca(certificate) {
        return Err(fail(format, "attestation certificate must not be a CA"));
    }
    Ok(())
}

/// TPM attestation identity key certificate requirements: version 3,
/// empty subject, `tcg-kp-AIKCertificate` EKU, not a CA
pub(super) fn check_aik_requirements(
    format: AttestationFormat,
    certificate: &X509Certificate<'_>,
) -> Result<(), WebAuthnError> {
    if certificate.version() != X509Version::V3 {
        return Err(fail(format, "AIK certificate must be version 3"));
    }
    if certificate.subject().iter().next().is_some() {
        return Err(fail(format, "AIK certificate subject must be empty"));
    }
    let has_aik_usage = certificate.extensions().iter().any(|ext| {
        matches!(
            ext.parsed_extension(),
            ParsedExtension::ExtendedKeyUsage(eku)
                if eku.other.iter().any(|oid| oid.to_id_string() == OID_TCG_KP_AIK_CERTIFICATE)
        )
    });
    if !has_aik_usage {
        return Err(fail(
            format,
            "AIK certificate lacks the tcg-kp-AIKCertificate extended key usage",
        ));
    }
    if is_ca(certificate) {
        return Err(fail(format, "AIK certificate must not be a CA"));
    }
    Ok(())
}

fn fail(format: AttestationFormat, reason: impl Into<String>) -> WebAuthnError {
    WebAuthnError::attestation(format.as_str(), reason)
}
