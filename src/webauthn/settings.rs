//! `WebAuthn` settings implementation
//!
//! This module defines the relying party configuration used by
//! [`WebAuthnService`](super::WebAuthnService), independent of
//! application-specific settings.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use url::Url;

use super::attestation::{AttestationFormat, CertificateChainVerifier, TrustAnchors};
use super::cose::COSEAlgorithmIdentifier;
use super::errors::WebAuthnError;

/// User verification requirement ("required", "preferred", "discouraged")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationPolicy {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl FromStr for UserVerificationPolicy {
    type Err = WebAuthnError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(WebAuthnError::ConfigurationError(format!(
                "unknown user verification policy: {other}"
            ))),
        }
    }
}

impl fmt::Display for UserVerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        })
    }
}

/// `WebAuthn` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebAuthnSettings {
    /// Relying Party ID (usually the domain)
    pub rp_id: String,
    /// Relying Party origin (e.g., <https://example.com>)
    pub rp_origin: String,
    /// User verification requirement
    pub user_verification: UserVerificationPolicy,
    /// COSE algorithm identifiers accepted for credential keys
    pub supported_algorithms: Vec<i64>,
    /// PEM bundles of attestation root certificates, keyed by format name
    pub attestation_roots: HashMap<String, Vec<PathBuf>>,
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_origin: "https://localhost".to_string(),
            user_verification: UserVerificationPolicy::default(),
            supported_algorithms: vec![-7, -35, -36, -8, -257, -37],
            attestation_roots: HashMap::new(),
        }
    }
}

impl WebAuthnSettings {
    /// Check the relying party identity and algorithm list
    ///
    /// # Errors
    /// Returns `WebAuthnError::ConfigurationError` describing the first
    /// invalid setting, or `WebAuthnError::UnknownAttestationFormat` for an
    /// unrecognised `attestation_roots` key
    pub fn validate(&self) -> Result<(), WebAuthnError> {
        if self.rp_id.is_empty() {
            return Err(config_error("rp_id must not be empty"));
        }
        if self.rp_id.contains([':', '/']) {
            return Err(config_error(format!(
                "rp_id must be a bare domain, got {}",
                self.rp_id
            )));
        }

        let host = validate_origin(&self.rp_origin)?;
        if host != self.rp_id && !host.ends_with(&format!(".{}", self.rp_id)) {
            return Err(config_error(format!(
                "rp_id {} is not a registrable suffix of origin host {host}",
                self.rp_id
            )));
        }

        self.algorithms()?;
        for format in self.attestation_roots.keys() {
            if format.parse::<AttestationFormat>()? == AttestationFormat::None {
                return Err(config_error("none attestation has no trust anchors"));
            }
        }
        Ok(())
    }

    /// Whether assertions and registrations must carry the user verified flag
    #[must_use]
    pub fn require_user_verification(&self) -> bool {
        self.user_verification == UserVerificationPolicy::Required
    }

    /// Resolve the configured algorithm identifiers
    ///
    /// # Errors
    /// Returns `WebAuthnError::ConfigurationError` if the list is empty or
    /// names an algorithm this crate cannot verify
    pub fn algorithms(&self) -> Result<Vec<COSEAlgorithmIdentifier>, WebAuthnError> {
        if self.supported_algorithms.is_empty() {
            return Err(config_error("supported_algorithms must not be empty"));
        }
        self.supported_algorithms
            .iter()
            .map(|&id| {
                COSEAlgorithmIdentifier::try_from(id)
                    .map_err(|_| config_error(format!("unsupported COSE algorithm {id}")))
            })
            .collect()
    }

    /// Read every configured PEM bundle into trust anchors
    ///
    /// # Errors
    /// Returns `WebAuthnError::UnknownAttestationFormat` for an unknown
    /// format name and `WebAuthnError::ConfigurationError` if a bundle cannot
    /// be read or parsed
    pub fn load_trust_anchors(
        &self,
        verifier: Arc<dyn CertificateChainVerifier>,
    ) -> Result<TrustAnchors, WebAuthnError> {
        let mut anchors = TrustAnchors::new(verifier);
        for (name, paths) in &self.attestation_roots {
            let format: AttestationFormat = name.parse()?;
            for path in paths {
                let pem = fs::read(path).map_err(|e| {
                    config_error(format!("cannot read {}: {e}", path.display()))
                })?;
                let count = anchors.add_pem_roots(format, &pem)?;
                info!(
                    "Loaded {count} {format} attestation root(s) from {}",
                    path.display()
                );
            }
        }
        Ok(anchors)
    }
}

/// Origins are `https://host[:port]`, or `http://localhost[:port]` for local
/// development; returns the host
fn validate_origin(origin: &str) -> Result<String, WebAuthnError> {
    let parsed =
        Url::parse(origin).map_err(|e| config_error(format!("invalid rp_origin {origin}: {e}")))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| config_error(format!("rp_origin {origin} has no host")))?;
    match parsed.scheme() {
        "https" => {}
        "http" if host == "localhost" => {}
        scheme => {
            return Err(config_error(format!(
                "rp_origin scheme {scheme} is not allowed for host {host}"
            )))
        }
    }

    if origin.ends_with('/')
        || parsed.path() != "/"
        || parsed.query().is_some()
        || parsed.fragment().is_some()
    {
        return Err(config_error(format!(
            "rp_origin {origin} must not carry a path, query or fragment"
        )));
    }
    Ok(host.to_string())
}

fn config_error(reason: impl Into<String>) -> WebAuthnError {
    WebAuthnError::ConfigurationError(reason.into())
}
