#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passkey-verifier library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod settings;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use settings::VerifierSettings;
pub use webauthn::{
    AttestedCredentialData, AuthenticationCredential, AuthenticationResult,
    RegistrationCredential, StoredCredential, TrustAnchors, WebAuthnError, WebAuthnService,
    WebAuthnSettings,
};
