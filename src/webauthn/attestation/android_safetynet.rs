//! `android-safetynet` attestation
//!
//! The statement wraps a SafetyNet attestation JWS. Its signing certificate
//! comes from the JWS header and must belong to `attest.android.com`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use openssl::x509::{X509Ref, X509};
use serde::Deserialize;

use super::certificate;
use super::{AttestationContext, AttestationFormat, StatementFields, TrustPath};
use crate::webauthn::cose::COSEAlgorithmIdentifier;
use crate::webauthn::crypto;
use crate::webauthn::encoding::URL_SAFE_LENIENT;
use crate::webauthn::errors::WebAuthnError;

const FORMAT: AttestationFormat = AttestationFormat::AndroidSafetyNet;
const EXPECTED_HOSTNAME: &str = "attest.android.com";
const ALLOWED_CLOCK_SKEW_MS: i64 = 60_000;

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    x5c: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    #[serde(default)]
    cts_profile_match: bool,
}

#[derive(Debug)]
pub struct SafetyNetStatement {
    pub ver: String,
    /// Compact JWS as sent by the authenticator
    pub response: String,
}

impl SafetyNetStatement {
    pub(crate) fn from_fields(fields: &StatementFields<'_>) -> Result<Self, WebAuthnError> {
        let ver = fields.text("ver")?.to_string();
        if ver.is_empty() {
            return Err(fields.fail("ver is empty"));
        }
        let response = String::from_utf8(fields.bytes("response")?)
            .map_err(|_| fields.fail("response is not UTF-8"))?;
        Ok(Self { ver, response })
    }

    pub(crate) fn verify(
        &self,
        context: &AttestationContext<'_>,
    ) -> Result<TrustPath, WebAuthnError> {
        let mut parts = self.response.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(fail("response is not a compact JWS"));
        };

        let header: JwsHeader = decode_json(header_b64, "JWS header")?;
        let payload: SafetyNetPayload = decode_json(payload_b64, "JWS payload")?;
        let signature = URL_SAFE_LENIENT
            .decode(signature_b64)
            .map_err(|_| fail("JWS signature is not base64url"))?;

        let chain = header
            .x5c
            .iter()
            .map(|cert| {
                let der = STANDARD
                    .decode(cert)
                    .map_err(|_| fail("x5c entry is not base64"))?;
                X509::from_der(&der).map_err(|e| fail(&format!("invalid certificate: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let leaf = chain.first().ok_or_else(|| fail("JWS header x5c is empty"))?;

        let (algorithm, signature) = jws_signature(&header.alg, signature)?;
        let signing_input = format!("{header_b64}.{payload_b64}");
        certificate::verify_signature(
            FORMAT,
            leaf,
            algorithm,
            &signature,
            signing_input.as_bytes(),
        )?;

        let expected_nonce = STANDARD.encode(crypto::sha256(&crypto::signature_base(
            context.raw_authenticator_data,
            context.client_data_hash,
        )));
        if payload.nonce != expected_nonce {
            return Err(fail("nonce does not match authenticator and client data"));
        }

        if !issued_to_expected_host(leaf) {
            return Err(fail("signing certificate is not issued to attest.android.com"));
        }

        if !payload.cts_profile_match {
            return Err(fail("ctsProfileMatch is false"));
        }

        let now = Utc::now().timestamp_millis();
        if payload.timestamp_ms > now + ALLOWED_CLOCK_SKEW_MS {
            return Err(fail("timestampMs is in the future"));
        }

        Ok(TrustPath::Certificates(chain))
    }
}

/// The leaf's first common name is exactly `attest.android.com`, compared
/// byte for byte so an embedded NUL cannot shorten it
fn issued_to_expected_host(leaf: &X509Ref) -> bool {
    leaf.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .is_some_and(|entry| entry.data().as_slice() == EXPECTED_HOSTNAME.as_bytes())
}

fn decode_json<T: for<'de> Deserialize<'de>>(
    segment: &str,
    what: &str,
) -> Result<T, WebAuthnError> {
    let bytes = URL_SAFE_LENIENT
        .decode(segment)
        .map_err(|_| fail(&format!("{what} is not base64url")))?;
    serde_json::from_slice(&bytes).map_err(|e| fail(&format!("{what}: {e}")))
}

/// Map a JWS `alg` to a COSE algorithm, converting raw ECDSA signatures
/// (`r || s`) to DER
fn jws_signature(
    alg: &str,
    signature: Vec<u8>,
) -> Result<(COSEAlgorithmIdentifier, Vec<u8>), WebAuthnError> {
    let algorithm = match alg {
        "RS256" => COSEAlgorithmIdentifier::RS256,
        "RS384" => COSEAlgorithmIdentifier::RS384,
        "RS512" => COSEAlgorithmIdentifier::RS512,
        "PS256" => COSEAlgorithmIdentifier::PS256,
        "ES256" => COSEAlgorithmIdentifier::ES256,
        "ES384" => COSEAlgorithmIdentifier::ES384,
        other => return Err(fail(&format!("unsupported JWS alg {other}"))),
    };
    if !matches!(
        algorithm,
        COSEAlgorithmIdentifier::ES256 | COSEAlgorithmIdentifier::ES384
    ) {
        return Ok((algorithm, signature));
    }

    if signature.is_empty() || signature.len() % 2 != 0 {
        return Err(fail("JWS ECDSA signature has odd length"));
    }
    let (r, s) = signature.split_at(signature.len() / 2);
    let der = BigNum::from_slice(r)
        .and_then(|r| Ok((r, BigNum::from_slice(s)?)))
        .and_then(|(r, s)| EcdsaSig::from_private_components(r, s))
        .and_then(|sig| sig.to_der())
        .map_err(|e| fail(&format!("JWS ECDSA signature: {e}")))?;
    Ok((algorithm, der))
}

fn fail(reason: &str) -> WebAuthnError {
    WebAuthnError::attestation(FORMAT.as_str(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::CertificateAuthority;

    #[test]
    fn test_hostname_must_match_exactly() {
        let ca = CertificateAuthority::new("SafetyNet Root");
        assert!(issued_to_expected_host(
            &ca.issue_leaf("attest.android.com").certificate
        ));
        for cn in [
            "attest.android.com\0.evil.example",
            "attest.android.com.evil.example",
            "evil.attest.android.com",
        ] {
            assert!(!issued_to_expected_host(&ca.issue_leaf(cn).certificate), "{cn:?}");
        }
    }

    #[test]
    fn test_jws_rsa_signature_passes_through() {
        let (alg, sig) = jws_signature("RS256", vec![1, 2, 3]).unwrap();
        assert_eq!(alg, COSEAlgorithmIdentifier::RS256);
        assert_eq!(sig, vec![1, 2, 3]);
    }

    #[test]
    fn test_jws_ecdsa_signature_is_converted_to_der() {
        let (alg, sig) = jws_signature("ES256", vec![1; 64]).unwrap();
        assert_eq!(alg, COSEAlgorithmIdentifier::ES256);
        assert_eq!(sig[0], 0x30);
    }

    #[test]
    fn test_jws_unknown_alg() {
        assert!(jws_signature("HS256", vec![]).is_err());
    }
}
