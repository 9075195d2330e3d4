//! This crate provides the cryptographic building blocks of a myID (formerly
//! myGovID) client identity. It covers the full lifetime of the identity key
//! material:
//!
//! - [`keys`]: RSA identity generation and password-protected PKCS #8 export
//!   and import.
//! - [`csr`]: The PKCS #10 certificate signing request the issuer expects,
//!   including the mandatory subject and application identifier extension.
//! - [`chain`]: Decoding of the PKCS #7 `SignedData` envelope the issuer
//!   returns into an ordered certificate chain.
//! - [`assertion`]: RFC 7523 JWT assertions used as authorization grants and
//!   for client authentication.
//!
//! Every module exposes its own error type. All of them can be classified
//! using [`ErrorKind`], which callers should use instead of matching on the
//! individual variants.
//!
//! ## References
//!
//! - <https://datatracker.ietf.org/doc/html/rfc2986>
//! - <https://datatracker.ietf.org/doc/html/rfc5652>
//! - <https://datatracker.ietf.org/doc/html/rfc5958>
//! - <https://datatracker.ietf.org/doc/html/rfc7523>
use strum::Display;

pub mod assertion;
pub mod chain;
pub mod consts;
pub mod csr;
pub mod keys;
pub mod random;

/// Failure classification shared by every operation of this crate and the
/// issuance flow built on top of it.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The caller supplied an argument which can never succeed, like an empty
    /// password.
    InvalidArgument,

    /// The encrypted key blob is corrupted or the password is wrong.
    DecryptionFailed,

    /// The key blob decrypted fine, but doesn't contain a supported key.
    MalformedKeyMaterial,

    /// The certificate envelope could not be decoded.
    MalformedChain,

    /// The certificate envelope decoded fine, but contains no certificates.
    EmptyChain,

    /// Producing a signature failed.
    SigningFailed,

    /// The operation was cancelled by the caller.
    Cancelled,

    /// The remote collaborator reported an error.
    Transport,

    /// The operation didn't complete in time.
    Timeout,

    /// The issuer didn't produce the certificate within the allowed fetch
    /// attempts.
    NotReady,
}
