//! COSE credential public keys
//!
//! Rebuilds a usable public key from the COSE_Key map an authenticator emits
//! and verifies signatures with it. `ring` handles every algorithm it can;
//! P-521 and certificate keys go through `openssl`.

use std::fmt;

use ciborium::value::Value;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Verifier};
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use super::cbor;
use super::errors::WebAuthnError;

// COSE_Key labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV_OR_N: i64 = -1;
const LABEL_X_OR_E: i64 = -2;
const LABEL_Y: i64 = -3;

// COSE key types
const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// COSE algorithm identifiers a relying party may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum COSEAlgorithmIdentifier {
    ES256,
    ES384,
    ES512,
    EdDSA,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
}

impl COSEAlgorithmIdentifier {
    /// Every algorithm this crate can verify
    pub const ALL: [Self; 10] = [
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::EdDSA,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::PS256,
        Self::PS384,
        Self::PS512,
    ];

    /// Numeric identifier from the IANA COSE registry
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::ES256 => -7,
            Self::ES384 => -35,
            Self::ES512 => -36,
            Self::EdDSA => -8,
            Self::RS256 => -257,
            Self::RS384 => -258,
            Self::RS512 => -259,
            Self::PS256 => -37,
            Self::PS384 => -38,
            Self::PS512 => -39,
        }
    }

    /// Message digest paired with this algorithm, `None` for `EdDSA`
    pub(crate) fn message_digest(self) -> Option<MessageDigest> {
        match self {
            Self::ES256 | Self::RS256 | Self::PS256 => Some(MessageDigest::sha256()),
            Self::ES384 | Self::RS384 | Self::PS384 => Some(MessageDigest::sha384()),
            Self::ES512 | Self::RS512 | Self::PS512 => Some(MessageDigest::sha512()),
            Self::EdDSA => None,
        }
    }

    const fn is_ecdsa(self) -> bool {
        matches!(self, Self::ES256 | Self::ES384 | Self::ES512)
    }

    const fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::RS256 | Self::RS384 | Self::RS512 | Self::PS256 | Self::PS384 | Self::PS512
        )
    }

    const fn is_pss(self) -> bool {
        matches!(self, Self::PS256 | Self::PS384 | Self::PS512)
    }
}

impl TryFrom<i64> for COSEAlgorithmIdentifier {
    type Error = WebAuthnError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.id() == id)
            .ok_or(WebAuthnError::UnsupportedAlgorithm(id))
    }
}

impl fmt::Display for COSEAlgorithmIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.id())
    }
}

/// Elliptic curves for EC2 keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    fn from_cose(id: i64) -> Result<Self, WebAuthnError> {
        match id {
            1 => Ok(Self::P256),
            2 => Ok(Self::P384),
            3 => Ok(Self::P521),
            other => Err(WebAuthnError::InvalidPublicKey(format!(
                "unsupported EC2 curve {other}"
            ))),
        }
    }

    /// Byte length of one affine coordinate
    #[must_use]
    pub const fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    fn nid(self) -> Nid {
        match self {
            Self::P256 => Nid::X9_62_PRIME256V1,
            Self::P384 => Nid::SECP384R1,
            Self::P521 => Nid::SECP521R1,
        }
    }

    const fn algorithm(self) -> COSEAlgorithmIdentifier {
        match self {
            Self::P256 => COSEAlgorithmIdentifier::ES256,
            Self::P384 => COSEAlgorithmIdentifier::ES384,
            Self::P521 => COSEAlgorithmIdentifier::ES512,
        }
    }
}

/// Edwards curves for OKP keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkpCurve {
    Ed25519,
}

/// A credential public key decoded from COSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPublicKey {
    Ec2 {
        algorithm: COSEAlgorithmIdentifier,
        curve: EcCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Rsa {
        algorithm: COSEAlgorithmIdentifier,
        n: Vec<u8>,
        e: Vec<u8>,
    },
    Okp {
        algorithm: COSEAlgorithmIdentifier,
        curve: OkpCurve,
        x: Vec<u8>,
    },
}

impl CredentialPublicKey {
    /// Decode COSE_Key bytes
    ///
    /// # Errors
    /// Returns `UnsupportedAlgorithm` for an unknown `alg` and
    /// `InvalidPublicKey` for anything structurally wrong
    pub fn from_cose(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        let value = cbor::decode(bytes)
            .map_err(|e| WebAuthnError::InvalidPublicKey(format!("COSE key is not CBOR: {e}")))?;
        Self::from_cose_value(&value)
    }

    fn from_cose_value(value: &Value) -> Result<Self, WebAuthnError> {
        let map = value
            .as_map()
            .ok_or_else(|| invalid("COSE key is not a map"))?;

        let kty = cbor::map_get_label(map, LABEL_KTY)
            .and_then(cbor::as_i64)
            .ok_or_else(|| invalid("missing kty"))?;
        let alg_id = cbor::map_get_label(map, LABEL_ALG)
            .and_then(cbor::as_i64)
            .ok_or_else(|| invalid("missing alg"))?;
        let algorithm = COSEAlgorithmIdentifier::try_from(alg_id)?;

        match kty {
            KTY_EC2 => {
                if !algorithm.is_ecdsa() {
                    return Err(invalid(format!("{algorithm} is not an EC2 algorithm")));
                }
                let crv = cbor::map_get_label(map, LABEL_CRV_OR_N)
                    .and_then(cbor::as_i64)
                    .ok_or_else(|| invalid("missing crv"))?;
                let curve = EcCurve::from_cose(crv)?;
                if curve.algorithm() != algorithm {
                    return Err(invalid(format!(
                        "curve {curve:?} does not match {algorithm}"
                    )));
                }
                let x = bytes_label(map, LABEL_X_OR_E, "x")?;
                let y = bytes_label(map, LABEL_Y, "y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(invalid(format!(
                        "{curve:?} coordinates must be {} bytes",
                        curve.coordinate_len()
                    )));
                }
                Ok(Self::Ec2 {
                    algorithm,
                    curve,
                    x,
                    y,
                })
            }
            KTY_RSA => {
                if !algorithm.is_rsa() {
                    return Err(invalid(format!("{algorithm} is not an RSA algorithm")));
                }
                let n = bytes_label(map, LABEL_CRV_OR_N, "n")?;
                let e = bytes_label(map, LABEL_X_OR_E, "e")?;
                if n.is_empty() || e.is_empty() {
                    return Err(invalid("empty RSA component"));
                }
                Ok(Self::Rsa { algorithm, n, e })
            }
            KTY_OKP => {
                if algorithm != COSEAlgorithmIdentifier::EdDSA {
                    return Err(invalid(format!("{algorithm} is not an OKP algorithm")));
                }
                let crv = cbor::map_get_label(map, LABEL_CRV_OR_N)
                    .and_then(cbor::as_i64)
                    .ok_or_else(|| invalid("missing crv"))?;
                if crv != 6 {
                    return Err(invalid(format!("unsupported OKP curve {crv}")));
                }
                let x = bytes_label(map, LABEL_X_OR_E, "x")?;
                if x.len() != 32 {
                    return Err(invalid("Ed25519 key must be 32 bytes"));
                }
                Ok(Self::Okp {
                    algorithm,
                    curve: OkpCurve::Ed25519,
                    x,
                })
            }
            other => Err(invalid(format!("unsupported kty {other}"))),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> COSEAlgorithmIdentifier {
        match self {
            Self::Ec2 { algorithm, .. } | Self::Rsa { algorithm, .. } | Self::Okp { algorithm, .. } => {
                *algorithm
            }
        }
    }

    /// Reject keys whose algorithm the relying party does not advertise
    ///
    /// # Errors
    /// Returns `WebAuthnError::UnsupportedAlgorithm` if the key's algorithm
    /// is not in `supported`
    pub fn ensure_supported(
        &self,
        supported: &[COSEAlgorithmIdentifier],
    ) -> Result<(), WebAuthnError> {
        let algorithm = self.algorithm();
        if supported.contains(&algorithm) {
            Ok(())
        } else {
            Err(WebAuthnError::UnsupportedAlgorithm(algorithm.id()))
        }
    }

    /// Verify `signature` over `message`
    ///
    /// # Errors
    /// Returns `WebAuthnError::InvalidSignature` if verification fails and
    /// `WebAuthnError::InvalidPublicKey` if the key and algorithm disagree
    pub fn verify(&self, signature: &[u8], message: &[u8]) -> Result<(), WebAuthnError> {
        match self {
            Self::Ec2 {
                algorithm,
                curve,
                x,
                y,
            } => {
                let ring_alg: &'static signature::EcdsaVerificationAlgorithm = match curve {
                    EcCurve::P256 => &signature::ECDSA_P256_SHA256_ASN1,
                    EcCurve::P384 => &signature::ECDSA_P384_SHA384_ASN1,
                    // ring has no P-521
                    EcCurve::P521 => {
                        return verify_with_pkey(*algorithm, &*self.to_pkey()?, signature, message)
                    }
                };
                // SEC1 uncompressed point
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                UnparsedPublicKey::new(ring_alg, point)
                    .verify(message, signature)
                    .map_err(|_| WebAuthnError::InvalidSignature)
            }
            Self::Rsa { algorithm, n, e } => {
                let components = RsaPublicKeyComponents {
                    n: strip_leading_zeros(n),
                    e: strip_leading_zeros(e),
                };
                components
                    .verify(rsa_parameters(*algorithm)?, message, signature)
                    .map_err(|_| WebAuthnError::InvalidSignature)
            }
            Self::Okp { x, .. } => UnparsedPublicKey::new(&signature::ED25519, x)
                .verify(message, signature)
                .map_err(|_| WebAuthnError::InvalidSignature),
        }
    }

    /// Convert to an OpenSSL public key, for comparison against
    /// certificate keys and for curves `ring` lacks
    ///
    /// # Errors
    /// Returns `WebAuthnError::InvalidPublicKey` if OpenSSL rejects the
    /// components (for example a point not on the curve)
    pub fn to_pkey(&self) -> Result<PKey<Public>, WebAuthnError> {
        let pkey = match self {
            Self::Ec2 { curve, x, y, .. } => {
                let group = EcGroup::from_curve_name(curve.nid()).map_err(openssl_invalid)?;
                let x = BigNum::from_slice(x).map_err(openssl_invalid)?;
                let y = BigNum::from_slice(y).map_err(openssl_invalid)?;
                let key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)
                    .map_err(openssl_invalid)?;
                PKey::from_ec_key(key).map_err(openssl_invalid)?
            }
            Self::Rsa { n, e, .. } => {
                let rsa = Rsa::from_public_components(
                    BigNum::from_slice(n).map_err(openssl_invalid)?,
                    BigNum::from_slice(e).map_err(openssl_invalid)?,
                )
                .map_err(openssl_invalid)?;
                PKey::from_rsa(rsa).map_err(openssl_invalid)?
            }
            Self::Okp { x, .. } => {
                PKey::public_key_from_raw_bytes(x, Id::ED25519).map_err(openssl_invalid)?
            }
        };
        Ok(pkey)
    }

    /// Whether this key and an OpenSSL key are the same public key
    #[must_use]
    pub fn matches_pkey<T: HasPublic>(&self, other: &PKeyRef<T>) -> bool {
        self.to_pkey().is_ok_and(|own| own.public_eq(other))
    }
}

/// Verify a signature with an OpenSSL key under a COSE algorithm
///
/// Used for certificate keys in attestation statements and for ES512.
///
/// # Errors
/// Returns `WebAuthnError::InvalidSignature` on any failure
pub(crate) fn verify_with_pkey<T: HasPublic>(
    algorithm: COSEAlgorithmIdentifier,
    pkey: &PKeyRef<T>,
    signature: &[u8],
    message: &[u8],
) -> Result<(), WebAuthnError> {
    let verified = match algorithm.message_digest() {
        Some(digest) => {
            let mut verifier =
                Verifier::new(digest, pkey).map_err(|_| WebAuthnError::InvalidSignature)?;
            if algorithm.is_pss() {
                verifier
                    .set_rsa_padding(Padding::PKCS1_PSS)
                    .map_err(|_| WebAuthnError::InvalidSignature)?;
                verifier
                    .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                    .map_err(|_| WebAuthnError::InvalidSignature)?;
                verifier
                    .set_rsa_mgf1_md(digest)
                    .map_err(|_| WebAuthnError::InvalidSignature)?;
            }
            verifier.verify_oneshot(signature, message)
        }
        None => Verifier::new_without_digest(pkey)
            .and_then(|mut verifier| verifier.verify_oneshot(signature, message)),
    };

    match verified {
        Ok(true) => Ok(()),
        _ => Err(WebAuthnError::InvalidSignature),
    }
}

/// `ring` parameters for an RSA algorithm
fn rsa_parameters(
    algorithm: COSEAlgorithmIdentifier,
) -> Result<&'static signature::RsaParameters, WebAuthnError> {
    match algorithm {
        COSEAlgorithmIdentifier::RS256 => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
        COSEAlgorithmIdentifier::RS384 => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
        COSEAlgorithmIdentifier::RS512 => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
        COSEAlgorithmIdentifier::PS256 => Ok(&signature::RSA_PSS_2048_8192_SHA256),
        COSEAlgorithmIdentifier::PS384 => Ok(&signature::RSA_PSS_2048_8192_SHA384),
        COSEAlgorithmIdentifier::PS512 => Ok(&signature::RSA_PSS_2048_8192_SHA512),
        COSEAlgorithmIdentifier::ES256
        | COSEAlgorithmIdentifier::ES384
        | COSEAlgorithmIdentifier::ES512
        | COSEAlgorithmIdentifier::EdDSA => {
            Err(invalid(format!("{algorithm} is not an RSA algorithm")))
        }
    }
}

fn bytes_label(
    map: &[(Value, Value)],
    label: i64,
    name: &str,
) -> Result<Vec<u8>, WebAuthnError> {
    cbor::map_get_label(map, label)
        .and_then(Value::as_bytes)
        .cloned()
        .ok_or_else(|| invalid(format!("missing {name}")))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    &bytes[start..]
}

fn invalid(reason: impl Into<String>) -> WebAuthnError {
    WebAuthnError::InvalidPublicKey(reason.into())
}

#[allow(clippy::needless_pass_by_value)]
fn openssl_invalid(e: openssl::error::ErrorStack) -> WebAuthnError {
    WebAuthnError::InvalidPublicKey(e.to_string())
}
