//! Unified testing utilities for passkey-verifier
//!
//! This module gathers the helpers the unit and integration tests share, so
//! every test builds authenticator responses the same way.
//!
//! ## Organization
//!
//! - [`builders`] - Byte-level builders for authenticator data, COSE keys,
//!   attestation objects, client data and attestation extensions
//! - [`fixtures`] - Throwaway certificate authorities and attestation
//!   certificates built with OpenSSL
//! - [`TestCredential`] - An ES256 authenticator key pair
//! - [`AcceptAllChains`] / [`RejectAllChains`] - Chain verifier stand-ins
//!
//! ## Usage
//!
//! ```rust,ignore
//! use passkey_verifier::testing::{builders, TestCredential};
//!
//! let credential = TestCredential::generate();
//! let auth_data = builders::build_authenticator_data(&builders::AuthenticatorDataOptions {
//!     counter: 1,
//!     ..builders::AuthenticatorDataOptions::for_rp_id("example.com")
//! });
//! let signature = credential.sign(&auth_data);
//! ```

pub mod builders;
pub mod fixtures;

use async_trait::async_trait;
use openssl::x509::X509;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

use crate::webauthn::CertificateChainVerifier;

/// Common test constants
pub mod constants {
    /// Default relying party ID
    pub const TEST_RP_ID: &str = "example.com";

    /// Origin matching [`TEST_RP_ID`]
    pub const TEST_ORIGIN: &str = "https://example.com";

    /// Challenge used when a test does not care about its value
    pub const TEST_CHALLENGE: &[u8] = b"test-challenge-0123456789abcdef";

    /// AAGUID reported by test authenticators
    pub const TEST_AAGUID: [u8; 16] = [
        0xad, 0xce, 0x00, 0x02, 0x35, 0xbc, 0xc6, 0x0a, 0x64, 0x8b, 0x0b, 0x25, 0xf1, 0xf0,
        0x55, 0x03,
    ];
}

/// An ES256 credential key pair standing in for an authenticator
pub struct TestCredential {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl TestCredential {
    /// Generate a fresh P-256 key pair
    ///
    /// # Panics
    /// Panics if the system random source fails
    #[must_use]
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("failed to generate test key");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .expect("failed to load test key");
        Self { key_pair, rng }
    }

    /// Uncompressed SEC1 point: `0x04 || x || y`
    #[must_use]
    pub fn public_point(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }

    /// The x and y coordinates of the public key
    #[must_use]
    pub fn coordinates(&self) -> (&[u8], &[u8]) {
        let point = self.public_point();
        (&point[1..33], &point[33..65])
    }

    /// The public key as a COSE EC2 ES256 key
    #[must_use]
    pub fn cose_public_key(&self) -> Vec<u8> {
        let (x, y) = self.coordinates();
        builders::cose_ec2_key(x, y)
    }

    /// DER-encoded ECDSA signature over `message`
    ///
    /// # Panics
    /// Panics if signing fails
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key_pair
            .sign(&self.rng, message)
            .expect("failed to sign")
            .as_ref()
            .to_vec()
    }
}

/// Chain verifier that trusts every chain
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllChains;

#[async_trait]
impl CertificateChainVerifier for AcceptAllChains {
    async fn verify(&self, _chain: &[X509], _roots: &[X509]) -> Result<(), String> {
        Ok(())
    }
}

/// Chain verifier that trusts nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAllChains;

#[async_trait]
impl CertificateChainVerifier for RejectAllChains {
    async fn verify(&self, _chain: &[X509], _roots: &[X509]) -> Result<(), String> {
        Err("chain rejected by test verifier".to_string())
    }
}
