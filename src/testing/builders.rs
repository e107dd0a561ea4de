//! Byte-level builders for authenticator responses
//!
//! These produce the exact binary layouts an authenticator emits, so tests
//! can start from a valid response and change one field at a time.

use ciborium::value::Value;
use serde_json::json;

use crate::webauthn::{encode_base64url, sha256, AuthenticatorFlags};

/// Inputs for [`build_authenticator_data`]
#[derive(Debug, Clone)]
pub struct AuthenticatorDataOptions {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    pub attested_credential_data: Option<AttestedCredentialOptions>,
    /// Written verbatim after the attested credential data
    pub extensions: Option<Vec<u8>>,
}

impl AuthenticatorDataOptions {
    /// User present, counter zero, scoped to `rp_id`
    #[must_use]
    pub fn for_rp_id(rp_id: &str) -> Self {
        Self {
            rp_id_hash: sha256(rp_id.as_bytes()),
            flags: AuthenticatorFlags::USER_PRESENT,
            counter: 0,
            attested_credential_data: None,
            extensions: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttestedCredentialOptions {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE key bytes, written without validation
    pub credential_public_key: Vec<u8>,
}

/// Serialize authenticator data. Flags are written as given, whether or not
/// they agree with the optional sections.
///
/// # Panics
/// Panics if the credential ID is longer than `u16::MAX`
#[must_use]
pub fn build_authenticator_data(options: &AuthenticatorDataOptions) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(37);
    bytes.extend_from_slice(&options.rp_id_hash);
    bytes.push(options.flags);
    bytes.extend_from_slice(&options.counter.to_be_bytes());

    if let Some(attested) = &options.attested_credential_data {
        let id_len = u16::try_from(attested.credential_id.len()).expect("credential ID too long");
        bytes.extend_from_slice(&attested.aaguid);
        bytes.extend_from_slice(&id_len.to_be_bytes());
        bytes.extend_from_slice(&attested.credential_id);
        bytes.extend_from_slice(&attested.credential_public_key);
    }
    if let Some(extensions) = &options.extensions {
        bytes.extend_from_slice(extensions);
    }
    bytes
}

/// Encode a CBOR value
///
/// # Panics
/// Panics if serialization fails
#[must_use]
pub fn encode_cbor(value: &Value) -> Vec<u8> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).expect("CBOR encoding failed");
    bytes
}

/// A COSE key with `kty`, `alg` and any further labelled parameters
#[must_use]
pub fn cose_key(kty: i64, alg: i64, extra: Vec<(i64, Value)>) -> Vec<u8> {
    let mut entries = vec![
        (Value::Integer(1.into()), Value::Integer(kty.into())),
        (Value::Integer(3.into()), Value::Integer(alg.into())),
    ];
    entries.extend(
        extra
            .into_iter()
            .map(|(label, value)| (Value::Integer(label.into()), value)),
    );
    encode_cbor(&Value::Map(entries))
}

/// ES256 key on P-256
#[must_use]
pub fn cose_ec2_key(x: &[u8], y: &[u8]) -> Vec<u8> {
    cose_key(
        2,
        -7,
        vec![
            (-1, Value::Integer(1.into())),
            (-2, Value::Bytes(x.to_vec())),
            (-3, Value::Bytes(y.to_vec())),
        ],
    )
}

/// RSA key with modulus `n` and exponent `e`
#[must_use]
pub fn cose_rsa_key(alg: i64, n: &[u8], e: &[u8]) -> Vec<u8> {
    cose_key(
        3,
        alg,
        vec![(-1, Value::Bytes(n.to_vec())), (-2, Value::Bytes(e.to_vec()))],
    )
}

/// Attestation object map with `fmt`, `attStmt` and `authData`
#[must_use]
pub fn encode_attestation_object(fmt: &str, auth_data: &[u8], statement: Value) -> Vec<u8> {
    encode_cbor(&Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text(fmt.into())),
        (Value::Text("attStmt".into()), statement),
        (Value::Text("authData".into()), Value::Bytes(auth_data.to_vec())),
    ]))
}

/// Attestation statement map from text keys
#[must_use]
pub fn statement(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (Value::Text(key.to_string()), value))
            .collect(),
    )
}

/// Client data JSON as a browser serializes it
#[must_use]
pub fn client_data_json(ceremony_type: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    json!({
        "type": ceremony_type,
        "challenge": encode_base64url(challenge),
        "origin": origin,
        "crossOrigin": false,
    })
    .to_string()
    .into_bytes()
}

/// `TPMT_PUBLIC` for a P-256 key, nameAlg SHA-256
#[must_use]
pub fn tpm_ecc_pub_area(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x0023u16.to_be_bytes()); // TPM_ALG_ECC
    bytes.extend_from_slice(&0x000Bu16.to_be_bytes()); // nameAlg SHA-256
    bytes.extend_from_slice(&0x0006_0472u32.to_be_bytes()); // objectAttributes
    push_tpm2b(&mut bytes, &[]); // authPolicy
    bytes.extend_from_slice(&0x0010u16.to_be_bytes()); // symmetric: TPM_ALG_NULL
    bytes.extend_from_slice(&0x0010u16.to_be_bytes()); // scheme: TPM_ALG_NULL
    bytes.extend_from_slice(&0x0003u16.to_be_bytes()); // TPM_ECC_NIST_P256
    bytes.extend_from_slice(&0x0010u16.to_be_bytes()); // kdf: TPM_ALG_NULL
    push_tpm2b(&mut bytes, x);
    push_tpm2b(&mut bytes, y);
    bytes
}

/// `TPMS_ATTEST` of type `TPM_ST_ATTEST_CERTIFY`
#[must_use]
pub fn tpm_cert_info(extra_data: &[u8], attested_name: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xff54_4347u32.to_be_bytes()); // TPM_GENERATED_VALUE
    bytes.extend_from_slice(&0x8017u16.to_be_bytes()); // TPM_ST_ATTEST_CERTIFY
    push_tpm2b(&mut bytes, &[0x00, 0x0b, 0xaa, 0xbb]); // qualifiedSigner
    push_tpm2b(&mut bytes, extra_data);
    bytes.extend_from_slice(&[0u8; 17]); // clockInfo
    bytes.extend_from_slice(&[0u8; 8]); // firmwareVersion
    push_tpm2b(&mut bytes, attested_name);
    push_tpm2b(&mut bytes, &[0x00, 0x0b]); // qualifiedName
    bytes
}

fn push_tpm2b(bytes: &mut Vec<u8>, data: &[u8]) {
    let len = u16::try_from(data.len()).expect("TPM2B buffer too long");
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(data);
}

/// Android Keystore `KeyDescription` with the given attestation challenge.
/// With `all_applications` the TEE authorization list carries tag 600.
#[must_use]
pub fn android_key_description(challenge: &[u8], all_applications: bool) -> Vec<u8> {
    const INTEGER: u8 = 0x02;
    const OCTET_STRING: u8 = 0x04;
    const ENUMERATED: u8 = 0x0a;
    const SEQUENCE: u8 = 0x30;

    let tee_enforced = if all_applications {
        // [600] EXPLICIT NULL
        vec![0xbf, 0x84, 0x58, 0x02, 0x05, 0x00]
    } else {
        Vec::new()
    };

    let fields = [
        der(INTEGER, &[3]),        // attestationVersion
        der(ENUMERATED, &[1]),     // attestationSecurityLevel
        der(INTEGER, &[4]),        // keymasterVersion
        der(ENUMERATED, &[1]),     // keymasterSecurityLevel
        der(OCTET_STRING, challenge),
        der(OCTET_STRING, &[]),    // uniqueId
        der(SEQUENCE, &[]),        // softwareEnforced
        der(SEQUENCE, &tee_enforced),
    ]
    .concat();
    der(SEQUENCE, &fields)
}

/// Apple anonymous attestation nonce: `SEQUENCE { [1] EXPLICIT OCTET STRING }`
#[must_use]
pub fn apple_nonce_extension(nonce: &[u8]) -> Vec<u8> {
    der(0x30, &der(0xa1, &der(0x04, nonce)))
}

/// `id-fido-gen-ce-aaguid` extension value
#[must_use]
pub fn aaguid_extension(aaguid: &[u8; 16]) -> Vec<u8> {
    der(0x04, aaguid)
}

/// A DER TLV with a single-byte tag
#[must_use]
pub fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut bytes = vec![tag];
    let len = content.len();
    if len < 0x80 {
        bytes.push(u8::try_from(len).unwrap_or_default());
    } else {
        let len_bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        bytes.push(0x80 | u8::try_from(len_bytes.len()).unwrap_or_default());
        bytes.extend_from_slice(&len_bytes);
    }
    bytes.extend_from_slice(content);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticator_data_layout() {
        let bytes = build_authenticator_data(&AuthenticatorDataOptions {
            counter: 0x0102_0304,
            attested_credential_data: Some(AttestedCredentialOptions {
                aaguid: [9; 16],
                credential_id: vec![7, 7, 7],
                credential_public_key: vec![0xa0],
            }),
            ..AuthenticatorDataOptions::for_rp_id("example.com")
        });
        assert_eq!(bytes.len(), 37 + 16 + 2 + 3 + 1);
        assert_eq!(&bytes[33..37], &[1, 2, 3, 4]);
        assert_eq!(&bytes[53..55], &[0, 3]);
    }

    #[test]
    fn test_der_long_length() {
        let encoded = der(0x04, &[0u8; 300]);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2c]);
        assert_eq!(encoded.len(), 304);
    }
}
