//! `tpm` attestation
//!
//! The TPM certifies the credential key (`pubArea`) in a `TPMS_ATTEST`
//! structure (`certInfo`) signed by its attestation identity key (AIK).

use openssl::hash::{hash, MessageDigest};
use openssl::x509::X509;

use super::certificate;
use super::{AttestationContext, AttestationFormat, StatementFields, TrustPath};
use crate::webauthn::cose::{COSEAlgorithmIdentifier, CredentialPublicKey, EcCurve};
use crate::webauthn::crypto;
use crate::webauthn::errors::WebAuthnError;

const FORMAT: AttestationFormat = AttestationFormat::Tpm;

const TPM_GENERATED_VALUE: u32 = 0xff54_4347; // 0xFF + "TCG"
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_SHA384: u16 = 0x000C;
const TPM_ALG_SHA512: u16 = 0x000D;
const TPM_ALG_ECC: u16 = 0x0023;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

const CLOCK_INFO_LEN: usize = 17;
const FIRMWARE_VERSION_LEN: usize = 8;

#[derive(Debug)]
pub struct TpmStatement {
    pub alg: COSEAlgorithmIdentifier,
    pub sig: Vec<u8>,
    pub x5c: Vec<X509>,
    pub cert_info: Vec<u8>,
    pub pub_area: Vec<u8>,
}

impl TpmStatement {
    pub(crate) fn from_fields(fields: &StatementFields<'_>) -> Result<Self, WebAuthnError> {
        let ver = fields.text("ver")?;
        if ver != "2.0" {
            return Err(fields.fail(format!("unsupported TPM version {ver}")));
        }
        Ok(Self {
            alg: fields.alg()?,
            sig: fields.bytes("sig")?,
            x5c: fields.x5c()?,
            cert_info: fields.bytes("certInfo")?,
            pub_area: fields.bytes("pubArea")?,
        })
    }

    pub(crate) fn verify(
        &self,
        context: &AttestationContext<'_>,
    ) -> Result<TrustPath, WebAuthnError> {
        let pub_area = PubArea::parse(&self.pub_area)?;
        if !pub_area.key.matches(context.credential_key) {
            return Err(fail("pubArea key does not match the credential public key"));
        }

        let cert_info = CertInfo::parse(&self.cert_info)?;
        if cert_info.magic != TPM_GENERATED_VALUE {
            return Err(fail("certInfo magic is not TPM_GENERATED_VALUE"));
        }
        if cert_info.attest_type != TPM_ST_ATTEST_CERTIFY {
            return Err(fail("certInfo type is not TPM_ST_ATTEST_CERTIFY"));
        }

        let digest = self
            .alg
            .message_digest()
            .ok_or_else(|| fail("alg has no digest for extraData"))?;
        let signed =
            crypto::signature_base(context.raw_authenticator_data, context.client_data_hash);
        let expected_extra_data = openssl_hash(digest, &signed)?;
        if cert_info.extra_data != expected_extra_data {
            return Err(fail("certInfo extraData does not match attToBeSigned hash"));
        }

        let name_digest = name_alg_digest(pub_area.name_alg)?;
        let mut expected_name = pub_area.name_alg.to_be_bytes().to_vec();
        expected_name.extend_from_slice(&openssl_hash(name_digest, &self.pub_area)?);
        if cert_info.attested_name != expected_name {
            return Err(fail("certInfo attested name does not match pubArea"));
        }

        let aik = &self.x5c[0];
        certificate::verify_signature(FORMAT, aik, self.alg, &self.sig, &self.cert_info)?;
        certificate::inspect(FORMAT, aik, |parsed| {
            certificate::check_aik_requirements(FORMAT, parsed)?;
            certificate::check_aaguid_extension(FORMAT, parsed, &context.credential.aaguid)
        })?;

        Ok(TrustPath::Certificates(self.x5c.clone()))
    }
}

/// Key carried in the `unique` field of a `TPMT_PUBLIC`
#[derive(Debug, PartialEq, Eq)]
enum TpmKey {
    Rsa { modulus: Vec<u8>, exponent: u32 },
    Ecc { curve: u16, x: Vec<u8>, y: Vec<u8> },
}

impl TpmKey {
    fn matches(&self, key: &CredentialPublicKey) -> bool {
        match (self, key) {
            (Self::Rsa { modulus, exponent }, CredentialPublicKey::Rsa { n, e, .. }) => {
                trim(modulus) == trim(n) && be_to_u64(e) == Some(u64::from(*exponent))
            }
            (Self::Ecc { curve, x, y }, CredentialPublicKey::Ec2 { curve: cose_curve, x: cx, y: cy, .. }) => {
                let tpm_curve = match cose_curve {
                    EcCurve::P256 => TPM_ECC_NIST_P256,
                    EcCurve::P384 => TPM_ECC_NIST_P384,
                    EcCurve::P521 => TPM_ECC_NIST_P521,
                };
                *curve == tpm_curve && x == cx && y == cy
            }
            _ => false,
        }
    }
}

/// The parts of `TPMT_PUBLIC` attestation needs
#[derive(Debug)]
struct PubArea {
    name_alg: u16,
    key: TpmKey,
}

impl PubArea {
    fn parse(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        let mut reader = Reader::new(bytes, "pubArea");
        let key_type = reader.u16()?;
        let name_alg = reader.u16()?;
        let _object_attributes = reader.u32()?;
        let _auth_policy = reader.sized()?;

        let key = match key_type {
            TPM_ALG_RSA => {
                let _symmetric = reader.u16()?;
                let _scheme = reader.u16()?;
                let _key_bits = reader.u16()?;
                let exponent = match reader.u32()? {
                    0 => 65_537,
                    e => e,
                };
                let modulus = reader.sized()?.to_vec();
                TpmKey::Rsa { modulus, exponent }
            }
            TPM_ALG_ECC => {
                let _symmetric = reader.u16()?;
                let _scheme = reader.u16()?;
                let curve = reader.u16()?;
                let _kdf = reader.u16()?;
                let x = reader.sized()?.to_vec();
                let y = reader.sized()?.to_vec();
                TpmKey::Ecc { curve, x, y }
            }
            other => return Err(fail(&format!("unsupported pubArea type {other:#06x}"))),
        };
        reader.finish()?;

        Ok(Self { name_alg, key })
    }
}

/// The parts of `TPMS_ATTEST` attestation needs
#[derive(Debug)]
struct CertInfo {
    magic: u32,
    attest_type: u16,
    extra_data: Vec<u8>,
    attested_name: Vec<u8>,
}

impl CertInfo {
    fn parse(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        let mut reader = Reader::new(bytes, "certInfo");
        let magic = reader.u32()?;
        let attest_type = reader.u16()?;
        let _qualified_signer = reader.sized()?;
        let extra_data = reader.sized()?.to_vec();
        reader.skip(CLOCK_INFO_LEN)?;
        reader.skip(FIRMWARE_VERSION_LEN)?;
        let attested_name = reader.sized()?.to_vec();
        let _qualified_name = reader.sized()?;
        reader.finish()?;

        Ok(Self {
            magic,
            attest_type,
            extra_data,
            attested_name,
        })
    }
}

/// Big-endian reader over TPM structures
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            what,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WebAuthnError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| fail(&format!("{} truncated", self.what)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), WebAuthnError> {
        self.take(len).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16, WebAuthnError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, WebAuthnError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// A `TPM2B` buffer: 2-byte size then that many bytes
    fn sized(&mut self) -> Result<&'a [u8], WebAuthnError> {
        let len = usize::from(self.u16()?);
        self.take(len)
    }

    fn finish(&self) -> Result<(), WebAuthnError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(fail(&format!(
                "{} has {} trailing bytes",
                self.what,
                self.bytes.len() - self.pos
            )))
        }
    }
}

fn name_alg_digest(name_alg: u16) -> Result<MessageDigest, WebAuthnError> {
    match name_alg {
        TPM_ALG_SHA1 => Ok(MessageDigest::sha1()),
        TPM_ALG_SHA256 => Ok(MessageDigest::sha256()),
        TPM_ALG_SHA384 => Ok(MessageDigest::sha384()),
        TPM_ALG_SHA512 => Ok(MessageDigest::sha512()),
        other => Err(fail(&format!("unsupported nameAlg {other:#06x}"))),
    }
}

fn openssl_hash(digest: MessageDigest, data: &[u8]) -> Result<Vec<u8>, WebAuthnError> {
    hash(digest, data)
        .map(|bytes| bytes.to_vec())
        .map_err(|e| fail(&format!("hashing failed: {e}")))
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn be_to_u64(bytes: &[u8]) -> Option<u64> {
    let bytes = trim(bytes);
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn fail(reason: &str) -> WebAuthnError {
    WebAuthnError::attestation(FORMAT.as_str(), reason)
}
