//! Test fixtures providing attestation certificates
//!
//! Every fixture generates fresh keys, so certificates from different
//! authorities never chain to each other.

use openssl::asn1::{Asn1Integer, Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509Builder, X509Extension, X509Name, X509NameBuilder, X509};

/// A freshly generated P-256 key
///
/// # Panics
/// Panics if key generation fails
#[must_use]
pub fn p256_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("P-256 group");
    PKey::from_ec_key(EcKey::generate(&group).expect("EC key generation"))
        .expect("EC key conversion")
}

/// DER ECDSA or PKCS#1 signature over `message` with SHA-256
///
/// # Panics
/// Panics if signing fails
#[must_use]
pub fn sign_sha256(key: &PKey<Private>, message: &[u8]) -> Vec<u8> {
    let mut signer = Signer::new(MessageDigest::sha256(), key).expect("signer");
    signer.sign_oneshot_to_vec(message).expect("signing")
}

/// What to put into an issued certificate
#[derive(Clone)]
pub struct CertificateRequest {
    pub subject: Vec<(Nid, String)>,
    pub key: PKey<Private>,
    /// Extensions given as dotted OID and DER value
    pub custom_extensions: Vec<(String, Vec<u8>)>,
    /// Dotted OID of an extended key usage
    pub extended_key_usage: Option<String>,
    pub ca: bool,
}

impl CertificateRequest {
    /// A leaf meeting the `packed` attestation certificate requirements
    #[must_use]
    pub fn packed_attestation() -> Self {
        Self {
            subject: vec![
                (Nid::COUNTRYNAME, "US".to_string()),
                (Nid::ORGANIZATIONNAME, "Test Authenticator Vendor".to_string()),
                (
                    Nid::ORGANIZATIONALUNITNAME,
                    "Authenticator Attestation".to_string(),
                ),
                (Nid::COMMONNAME, "Test Batch 1".to_string()),
            ],
            key: p256_key(),
            custom_extensions: Vec::new(),
            extended_key_usage: None,
            ca: false,
        }
    }

    /// A TPM attestation identity key certificate: empty subject and the
    /// `tcg-kp-AIKCertificate` extended key usage
    #[must_use]
    pub fn tpm_aik() -> Self {
        Self {
            subject: Vec::new(),
            key: p256_key(),
            custom_extensions: Vec::new(),
            extended_key_usage: Some("2.23.133.8.3".to_string()),
            ca: false,
        }
    }

    /// A leaf with only a common name
    #[must_use]
    pub fn leaf(common_name: &str) -> Self {
        Self {
            subject: vec![(Nid::COMMONNAME, common_name.to_string())],
            key: p256_key(),
            custom_extensions: Vec::new(),
            extended_key_usage: None,
            ca: false,
        }
    }
}

/// A certificate together with its private key
pub struct IssuedCertificate {
    pub certificate: X509,
    pub key: PKey<Private>,
}

/// Self-signed root that issues test certificates
pub struct CertificateAuthority {
    pub certificate: X509,
    key: PKey<Private>,
    name: X509Name,
}

impl CertificateAuthority {
    /// Create a root with the given common name
    ///
    /// # Panics
    /// Panics if certificate generation fails
    #[must_use]
    pub fn new(common_name: &str) -> Self {
        let key = p256_key();
        let name = build_name(&[(Nid::COMMONNAME, common_name.to_string())]);

        let mut builder = certificate_builder(&name, &key);
        builder.set_issuer_name(&name).expect("issuer");
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().expect("bc"))
            .expect("append bc");
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .expect("ku"),
            )
            .expect("append ku");
        builder.sign(&key, MessageDigest::sha256()).expect("sign root");

        Self {
            certificate: builder.build(),
            key,
            name,
        }
    }

    /// Issue a certificate for a request
    ///
    /// # Panics
    /// Panics if certificate generation fails
    #[must_use]
    pub fn issue(&self, request: &CertificateRequest) -> X509 {
        let subject = build_name(&request.subject);
        let mut builder = certificate_builder(&subject, &request.key);
        builder.set_issuer_name(&self.name).expect("issuer");

        let mut constraints = BasicConstraints::new();
        if request.ca {
            constraints.ca();
        }
        builder
            .append_extension(constraints.build().expect("bc"))
            .expect("append bc");

        if let Some(oid) = &request.extended_key_usage {
            builder
                .append_extension(ExtendedKeyUsage::new().other(oid).build().expect("eku"))
                .expect("append eku");
        }

        for (oid, der) in &request.custom_extensions {
            let object = Asn1Object::from_str(oid).expect("extension OID");
            let contents = Asn1OctetString::new_from_bytes(der).expect("extension value");
            builder
                .append_extension(
                    X509Extension::new_from_der(&object, false, &contents).expect("extension"),
                )
                .expect("append extension");
        }

        builder
            .sign(&self.key, MessageDigest::sha256())
            .expect("sign certificate");
        builder.build()
    }

    /// Issue a plain leaf with a fresh key
    #[must_use]
    pub fn issue_leaf(&self, common_name: &str) -> IssuedCertificate {
        self.issue_with_key(CertificateRequest::leaf(common_name))
    }

    /// Issue a certificate and keep its private key
    #[must_use]
    pub fn issue_with_key(&self, request: CertificateRequest) -> IssuedCertificate {
        IssuedCertificate {
            certificate: self.issue(&request),
            key: request.key,
        }
    }
}

fn build_name(entries: &[(Nid, String)]) -> X509Name {
    let mut name = X509NameBuilder::new().expect("name builder");
    for (nid, value) in entries {
        name.append_entry_by_nid(*nid, value).expect("name entry");
    }
    name.build()
}

fn certificate_builder(subject: &X509Name, key: &PKey<Private>) -> X509Builder {
    let mut builder = X509Builder::new().expect("x509 builder");
    builder.set_version(2).expect("version 3");
    let serial = BigNum::from_u32(rand_serial()).expect("serial");
    builder
        .set_serial_number(&Asn1Integer::from_bn(&serial).expect("serial"))
        .expect("set serial");
    builder.set_subject_name(subject).expect("subject");
    builder.set_pubkey(key).expect("public key");
    builder
        .set_not_before(&Asn1Time::days_from_now(0).expect("not before"))
        .expect("set not before");
    builder
        .set_not_after(&Asn1Time::days_from_now(365).expect("not after"))
        .expect("set not after");
    builder
}

fn rand_serial() -> u32 {
    let mut bytes = [0u8; 4];
    openssl::rand::rand_bytes(&mut bytes).expect("random serial");
    u32::from_be_bytes(bytes) | 1
}

/// COSE ES256 encoding of a P-256 key's public half
///
/// # Panics
/// Panics if the key is not an EC key
#[must_use]
pub fn cose_ec2_key_from(key: &PKey<Private>) -> Vec<u8> {
    let ec = key.ec_key().expect("EC key");
    let mut ctx = BigNumContext::new().expect("bn context");
    let mut x = BigNum::new().expect("bn");
    let mut y = BigNum::new().expect("bn");
    ec.public_key()
        .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)
        .expect("affine coordinates");
    super::builders::cose_ec2_key(
        &x.to_vec_padded(32).expect("x coordinate"),
        &y.to_vec_padded(32).expect("y coordinate"),
    )
}
