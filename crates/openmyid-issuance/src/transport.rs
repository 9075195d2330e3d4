//! The contract of the network collaborator the orchestrator drives.
//!
//! Implementations own everything HTTP: endpoints, the
//! [audit headers](crate::decoration::AuditHeaders), bearer authentication
//! and redirect handling. The orchestrator only sees the typed bodies of
//! [`crate::protocol`].
use async_trait::async_trait;

use crate::protocol::{CertificateResponse, CertificateSigningRequestBody, CertificateSigningTask};

/// Errors of a transport are opaque and passed through as-is.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What fetching the issued certificate resulted in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The certificate was issued.
    Issued(CertificateResponse),

    /// The issuer is still processing the request. The task carries a
    /// refreshed ETA.
    NotReady(CertificateSigningTask),
}

/// Capabilities a transport declares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportCapabilities {
    /// Whether redirects are followed transparently. Fetching the issued
    /// certificate redirects to the issue statement, so this is required.
    pub follows_redirects: bool,
}

#[async_trait]
pub trait IssuanceTransport: Send + Sync {
    fn capabilities(&self) -> TransportCapabilities;

    /// Submits the signing request as part of the proof of identity process
    /// started with the accepted `terms_version`.
    async fn submit_signing_request(
        &self,
        terms_version: &str,
        request: &CertificateSigningRequestBody,
    ) -> Result<CertificateSigningTask, TransportError>;

    /// Fetches the result of the signing task `task_id`.
    async fn fetch_issued_certificate(&self, task_id: u64) -> Result<FetchOutcome, TransportError>;
}

#[async_trait]
impl<T> IssuanceTransport for &T
where
    T: IssuanceTransport + ?Sized,
{
    fn capabilities(&self) -> TransportCapabilities {
        (**self).capabilities()
    }

    async fn submit_signing_request(
        &self,
        terms_version: &str,
        request: &CertificateSigningRequestBody,
    ) -> Result<CertificateSigningTask, TransportError> {
        (**self).submit_signing_request(terms_version, request).await
    }

    async fn fetch_issued_certificate(&self, task_id: u64) -> Result<FetchOutcome, TransportError> {
        (**self).fetch_issued_certificate(task_id).await
    }
}
