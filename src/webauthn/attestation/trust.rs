//! Attestation trust anchors and certificate chain verification

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509VerifyResult, X509};

use super::AttestationFormat;
use crate::webauthn::errors::WebAuthnError;

/// Certificate chain verification capability
///
/// Implementations decide whether `chain` (leaf first, intermediates after)
/// leads to one of `roots`. The default is [`OpenSslChainVerifier`]; inject
/// another implementation to consult revocation data or pin time.
#[async_trait]
pub trait CertificateChainVerifier: Send + Sync {
    /// Verify the chain against the given roots
    ///
    /// # Errors
    /// Returns a human readable reason when the chain is not trusted
    async fn verify(&self, chain: &[X509], roots: &[X509]) -> Result<(), String>;
}

/// Chain verification with an OpenSSL `X509Store`
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSslChainVerifier;

#[async_trait]
impl CertificateChainVerifier for OpenSslChainVerifier {
    async fn verify(&self, chain: &[X509], roots: &[X509]) -> Result<(), String> {
        let (leaf, intermediates) = chain.split_first().ok_or("empty certificate chain")?;

        let mut untrusted = Stack::new().map_err(|e| e.to_string())?;
        for cert in intermediates {
            untrusted.push(cert.clone()).map_err(|e| e.to_string())?;
        }

        let mut store = X509StoreBuilder::new().map_err(|e| e.to_string())?;
        for root in roots {
            store.add_cert(root.clone()).map_err(|e| e.to_string())?;
        }
        let store = store.build();

        let mut context = X509StoreContext::new().map_err(|e| e.to_string())?;
        let result = context
            .init(&store, leaf, &untrusted, |ctx| {
                ctx.verify_cert().map(|_| ctx.error())
            })
            .map_err(|e| e.to_string())?;

        if result == X509VerifyResult::OK {
            Ok(())
        } else {
            Err(result.error_string().to_string())
        }
    }
}

/// Root certificates per attestation format plus the chain verifier
#[derive(Clone)]
pub struct TrustAnchors {
    roots_by_format: HashMap<AttestationFormat, Vec<X509>>,
    verifier: Arc<dyn CertificateChainVerifier>,
}

impl TrustAnchors {
    /// Create trust anchors with no roots using the given verifier
    #[must_use]
    pub fn new(verifier: Arc<dyn CertificateChainVerifier>) -> Self {
        Self {
            roots_by_format: HashMap::new(),
            verifier,
        }
    }

    /// Add root certificates for a format
    #[must_use]
    pub fn with_roots(mut self, format: AttestationFormat, roots: Vec<X509>) -> Self {
        self.add_roots(format, roots);
        self
    }

    pub fn add_roots(&mut self, format: AttestationFormat, roots: Vec<X509>) {
        self.roots_by_format.entry(format).or_default().extend(roots);
    }

    /// Add every certificate in a PEM bundle as a root for a format
    ///
    /// # Errors
    /// Returns `WebAuthnError::ConfigurationError` if the bundle cannot be
    /// parsed or holds no certificates
    pub fn add_pem_roots(
        &mut self,
        format: AttestationFormat,
        pem: &[u8],
    ) -> Result<usize, WebAuthnError> {
        let roots = X509::stack_from_pem(pem).map_err(|e| {
            WebAuthnError::ConfigurationError(format!("invalid {format} root certificates: {e}"))
        })?;
        let count = roots.len();
        if count == 0 {
            return Err(WebAuthnError::ConfigurationError(format!(
                "no {format} root certificates found in PEM bundle"
            )));
        }
        self.add_roots(format, roots);
        Ok(count)
    }

    #[must_use]
    pub fn roots_for(&self, format: AttestationFormat) -> &[X509] {
        self.roots_by_format
            .get(&format)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) async fn verify_chain(
        &self,
        format: AttestationFormat,
        chain: &[X509],
    ) -> Result<(), WebAuthnError> {
        let roots = self.roots_for(format);
        if roots.is_empty() {
            warn!("No trust anchors configured for {format} attestation");
            return Err(WebAuthnError::AttestationChainUntrusted {
                format: format.to_string(),
                reason: "no trust anchors configured".to_string(),
            });
        }

        debug!(
            "Verifying {format} chain of {} certificate(s) against {} root(s)",
            chain.len(),
            roots.len()
        );
        self.verifier
            .verify(chain, roots)
            .await
            .map_err(|reason| WebAuthnError::AttestationChainUntrusted {
                format: format.to_string(),
                reason,
            })
    }
}

impl Default for TrustAnchors {
    fn default() -> Self {
        Self::new(Arc::new(OpenSslChainVerifier))
    }
}

impl fmt::Debug for TrustAnchors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .roots_by_format
            .iter()
            .map(|(format, roots)| (format.as_str(), roots.len()))
            .collect();
        f.debug_struct("TrustAnchors")
            .field("roots_by_format", &counts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::CertificateAuthority;

    #[tokio::test]
    async fn test_openssl_verifier_accepts_issued_leaf() {
        let ca = CertificateAuthority::new("Test Root");
        let leaf = ca.issue_leaf("Leaf");
        assert!(OpenSslChainVerifier
            .verify(&[leaf.certificate], &[ca.certificate.clone()])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_openssl_verifier_rejects_foreign_root() {
        let ca = CertificateAuthority::new("Test Root");
        let other = CertificateAuthority::new("Other Root");
        let leaf = ca.issue_leaf("Leaf");
        assert!(OpenSslChainVerifier
            .verify(&[leaf.certificate], &[other.certificate])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_roots_are_untrusted() {
        let ca = CertificateAuthority::new("Test Root");
        let anchors = TrustAnchors::default();
        let err = anchors
            .verify_chain(AttestationFormat::Packed, &[ca.certificate])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebAuthnError::AttestationChainUntrusted { ref format, .. } if format == "packed"
        ));
    }

    #[test]
    fn test_add_pem_roots() {
        let ca = CertificateAuthority::new("Test Root");
        let pem = ca.certificate.to_pem().unwrap();
        let mut anchors = TrustAnchors::default();
        assert_eq!(anchors.add_pem_roots(AttestationFormat::Tpm, &pem).unwrap(), 1);
        assert_eq!(anchors.roots_for(AttestationFormat::Tpm).len(), 1);
        assert!(anchors.roots_for(AttestationFormat::Apple).is_empty());
        assert!(anchors
            .add_pem_roots(AttestationFormat::Tpm, b"not pem")
            .is_err());
    }
}
