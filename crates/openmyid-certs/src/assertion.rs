//! Mints RFC 7523 JWT assertions which are signed with the identity key and
//! bound to the issued certificate.
//!
//! Both assertion kinds share the same shape: `iss` is
//! `https://<issuer-host>/<certificate serial>`, `aud` is the token endpoint,
//! every assertion gets a fresh random `jti` and is valid for one hour. The
//! header carries the uppercase SHA-1 fingerprint of the certificate as `kid`
//! and the certificate itself as single `x5c` entry.
//!
//! - <https://datatracker.ietf.org/doc/html/rfc7523#section-2.1>
//! - <https://datatracker.ietf.org/doc/html/rfc7523#section-2.2>
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::{Algorithm, Header};
use rsa::pkcs1v15::{Signature, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument, warn};

use crate::{
    ErrorKind,
    chain::IssuedCertificate,
    consts::{ASSERTION_LIFETIME_SECS, DEFAULT_AUDIENCE, DEFAULT_ISSUER_HOST},
    keys::Identity,
    random::{OsRandom, RandomSource},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the subject email must not be empty"))]
    EmptySubject,

    #[snafu(display("the clock returned a time before the UNIX epoch"))]
    ClockBeforeEpoch { source: SystemTimeError },

    #[snafu(display("failed to serialize the assertion {part}"))]
    SerializeAssertion {
        source: serde_json::Error,
        part: &'static str,
    },

    #[snafu(display("failed to sign the assertion"))]
    SignAssertion { source: signature::Error },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptySubject | Self::ClockBeforeEpoch { .. } => ErrorKind::InvalidArgument,
            Self::SerializeAssertion { .. } | Self::SignAssertion { .. } => ErrorKind::SigningFailed,
        }
    }
}

/// Source of the current time used for `nbf` and `exp`.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The default [`Clock`] reading [`SystemTime::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// The claims set of both assertion kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub jti: String,
    pub sub: String,
    pub nbf: u64,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

/// A signed compact JWS. Assertions are short-lived and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assertion {
    token: String,
    claims: AssertionClaims,
    key_id: String,
}

impl Assertion {
    /// The compact serialization (`header.payload.signature`).
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_token(self) -> String {
        self.token
    }

    pub fn claims(&self) -> &AssertionClaims {
        &self.claims
    }

    /// The `kid` header, which is the certificate's SHA-1 fingerprint.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Options used by the [`AssertionMinter`].
///
/// The [`Default`] implementation uses `ausidapp.gov.au` as issuer host and
/// `https://myGovId.gov.au/connect/token` as audience.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionOptions {
    /// The host used to build the `iss` claim.
    pub issuer_host: String,

    /// The `aud` claim, the token endpoint the assertion is presented to.
    pub audience: String,
}

impl Default for AssertionOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AssertionOptions {
    pub fn builder() -> AssertionOptionsBuilder {
        AssertionOptionsBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct AssertionOptionsBuilder {
    issuer_host: Option<String>,
    audience: Option<String>,
}

impl AssertionOptionsBuilder {
    pub fn issuer_host(mut self, issuer_host: impl Into<String>) -> Self {
        self.issuer_host = Some(issuer_host.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn build(self) -> AssertionOptions {
        AssertionOptions {
            issuer_host: self
                .issuer_host
                .unwrap_or_else(|| DEFAULT_ISSUER_HOST.to_owned()),
            audience: self.audience.unwrap_or_else(|| DEFAULT_AUDIENCE.to_owned()),
        }
    }
}

/// Mints assertions. Minting only reads the identity, so a single minter can
/// be shared between concurrent callers.
#[derive(Debug, Default)]
pub struct AssertionMinter<R = OsRandom, C = SystemClock> {
    options: AssertionOptions,
    random: R,
    clock: C,
}

impl AssertionMinter {
    pub fn new(options: AssertionOptions) -> Self {
        Self {
            options,
            random: OsRandom,
            clock: SystemClock,
        }
    }
}

impl<R, C> AssertionMinter<R, C>
where
    R: RandomSource,
    C: Clock,
{
    /// Replaces the source used to generate `jti` claims.
    pub fn with_random<T: RandomSource>(self, random: T) -> AssertionMinter<T, C> {
        AssertionMinter {
            options: self.options,
            random,
            clock: self.clock,
        }
    }

    /// Replaces the clock used for `nbf` and `exp`.
    pub fn with_clock<T: Clock>(self, clock: T) -> AssertionMinter<R, T> {
        AssertionMinter {
            options: self.options,
            random: self.random,
            clock,
        }
    }

    pub fn options(&self) -> &AssertionOptions {
        &self.options
    }

    /// Mints an authorization grant (RFC 7523, section 2.1) where `sub` is
    /// the email address the identity is registered with.
    #[instrument(name = "mint_authorization_grant", skip_all)]
    pub fn mint_authorization_grant(
        &self,
        identity: &Identity,
        certificate: &IssuedCertificate,
        subject_email: &str,
    ) -> Result<Assertion> {
        ensure!(!subject_email.is_empty(), EmptySubjectSnafu);
        self.mint(identity, certificate, Some(subject_email))
    }

    /// Mints a client authentication assertion (RFC 7523, section 2.2) where
    /// `sub` equals `iss`.
    #[instrument(name = "mint_client_authentication", skip_all)]
    pub fn mint_client_authentication(
        &self,
        identity: &Identity,
        certificate: &IssuedCertificate,
    ) -> Result<Assertion> {
        self.mint(identity, certificate, None)
    }

    fn mint(
        &self,
        identity: &Identity,
        certificate: &IssuedCertificate,
        subject: Option<&str>,
    ) -> Result<Assertion> {
        if !certificate.matches_identity(identity) {
            warn!("minting assertion with a certificate which doesn't certify the identity key");
        }

        let issuer = format!(
            "https://{host}/{serial}",
            host = self.options.issuer_host,
            serial = certificate.serial_number()
        );
        let not_before = self
            .clock
            .now()
            .duration_since(UNIX_EPOCH)
            .context(ClockBeforeEpochSnafu)?
            .as_secs();

        let claims = AssertionClaims {
            jti: self.random.uuid().to_string(),
            sub: subject.map_or_else(|| issuer.clone(), ToOwned::to_owned),
            nbf: not_before,
            exp: not_before + ASSERTION_LIFETIME_SECS,
            iss: issuer,
            aud: self.options.audience.clone(),
        };

        let key_id = certificate.sha1_fingerprint();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key_id.clone());
        header.x5c = Some(vec![STANDARD.encode(certificate.as_der())]);

        let token = sign(identity, &header, &claims)?;

        debug!(
            assertion.jti = %claims.jti,
            assertion.iss = %claims.iss,
            assertion.kid = %key_id,
            "minted assertion"
        );

        Ok(Assertion {
            token,
            claims,
            key_id,
        })
    }
}

/// Produces the compact JWS serialization with RS256 (RSASSA-PKCS1-v1_5 using
/// SHA-256, RFC 7518 section 3.3). Works for every key size the identity
/// supports.
fn sign(identity: &Identity, header: &Header, claims: &AssertionClaims) -> Result<String> {
    let header = serde_json::to_vec(header).context(SerializeAssertionSnafu { part: "header" })?;
    let claims = serde_json::to_vec(claims).context(SerializeAssertionSnafu { part: "claims" })?;
    let signing_input = format!(
        "{header}.{claims}",
        header = URL_SAFE_NO_PAD.encode(header),
        claims = URL_SAFE_NO_PAD.encode(claims)
    );

    let signing_key = SigningKey::<Sha256>::new(identity.private_key().clone());
    let signature: Signature = signing_key
        .try_sign(signing_input.as_bytes())
        .context(SignAssertionSnafu)?;

    Ok(format!(
        "{signing_input}.{signature}",
        signature = URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}
