//! This crate drives the issuance of a myID identity certificate on top of
//! the building blocks provided by [`openmyid_certs`].
//!
//! The [`IssuanceOrchestrator`] builds the signing request, hands it to an
//! [`IssuanceTransport`], waits for the issuer and decodes the issued chain.
//! The transport is supplied by the caller and owns all HTTP concerns. This
//! crate only provides the typed bodies in [`protocol`] and the
//! [audit headers](decoration::AuditHeaders) transports have to attach.
//!
//! ```no_run
//! # async fn issue(transport: impl openmyid_issuance::IssuanceTransport) {
//! use openmyid_certs::keys::KeyManager;
//! use openmyid_issuance::{IssuanceOptions, IssuanceOrchestrator};
//!
//! let identity = KeyManager::default().generate().expect("key generation failed");
//! let orchestrator = IssuanceOrchestrator::new(transport, IssuanceOptions::default());
//!
//! let issued = orchestrator
//!     .issue(identity, "2.0")
//!     .await
//!     .expect("issuance failed");
//! println!("issued {}", issued.chain.leaf().serial_number());
//! # }
//! ```
pub mod constants;
pub mod decoration;
pub mod options;
pub mod orchestrator;
pub mod protocol;
pub mod store;
pub mod transport;

pub use options::*;
pub use orchestrator::{
    IssuanceAttempt, IssuanceOrchestrator, IssuanceStage, IssuanceState, IssuedIdentity,
};
pub use transport::{FetchOutcome, IssuanceTransport, TransportCapabilities, TransportError};
