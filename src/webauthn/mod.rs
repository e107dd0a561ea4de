//! `WebAuthn` implementation
//!
//! This module verifies `WebAuthn` registration and authentication ceremonies
//! for a relying party. It implements the W3C `WebAuthn` Level 2 checks and
//! the FIDO attestation statement formats using `ring` and `openssl`.
//! Challenge generation, session handling and credential storage are left to
//! the caller.

mod attestation;
mod authentication;
mod authenticator_data;
mod cbor;
mod client_data;
mod cose;
mod crypto;
mod encoding;
mod errors;
mod registration;
mod service;
mod settings;
mod types;

// Re-exports for public use
pub use attestation::{
    AndroidKeyStatement, AppleStatement, AttestationFormat, AttestationObject,
    AttestationStatement, CertificateChainVerifier, FidoU2fStatement, OpenSslChainVerifier,
    PackedStatement, SafetyNetStatement, TpmStatement, TrustAnchors,
};
pub use authentication::ParsedAuthenticatorAssertionResponse;
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use client_data::{CeremonyType, CollectedClientData};
pub use cose::{COSEAlgorithmIdentifier, CredentialPublicKey, EcCurve, OkpCurve};
pub use crypto::sha256;
pub use encoding::{decode_base64url, encode_base64url};
pub use errors::WebAuthnError;
pub use registration::{ParsedCredentialCreationResponse, MAX_CREDENTIAL_ID_LEN};
pub use service::WebAuthnService;
pub use settings::{UserVerificationPolicy, WebAuthnSettings};
pub use types::*;
