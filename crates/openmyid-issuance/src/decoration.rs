//! Audit headers which every request to the identity provider has to carry.
//!
//! Two headers are static (calling app name and version), `X-AuditRequestId`
//! is fresh for every request. The `X-AuditSessionId` is fresh for every
//! request of unauthenticated clients, while authenticated clients use the
//! `jti` of their bearer token for all requests.
use std::collections::BTreeMap;

use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use openmyid_certs::{
    ErrorKind,
    random::{OsRandom, RandomSource},
};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::constants::{
    AUDIT_CALLING_APP_NAME, AUDIT_CALLING_APP_VERSION, HEADER_AUDIT_CALLING_APP_NAME,
    HEADER_AUDIT_CALLING_APP_VERSION, HEADER_AUDIT_REQUEST_ID, HEADER_AUDIT_SESSION_ID,
    HEADER_AUTHORIZATION,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read the token ID of the bearer token"))]
    ReadTokenId { source: jsonwebtoken::errors::Error },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// Header name to value, in a stable order.
pub type RequestHeaders = BTreeMap<&'static str, String>;

#[derive(Debug, Deserialize)]
struct TokenId {
    jti: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Session {
    Unauthenticated,
    Authenticated { bearer: String, session_id: String },
}

/// Produces the audit (and authorization) headers of each request.
#[derive(Clone, Debug)]
pub struct AuditHeaders<R = OsRandom> {
    session: Session,
    random: R,
}

impl AuditHeaders {
    /// Headers for the unauthenticated proof of identity endpoints.
    pub fn unauthenticated() -> Self {
        Self {
            session: Session::Unauthenticated,
            random: OsRandom,
        }
    }

    /// Headers for endpoints authenticated with the bearer `token`, like the
    /// assurance token used for certificate signing.
    pub fn authenticated(token: impl Into<String>) -> Result<Self, Error> {
        let bearer = token.into();
        let session_id = read_token_id(&bearer)?;

        Ok(Self {
            session: Session::Authenticated { bearer, session_id },
            random: OsRandom,
        })
    }
}

impl<R> AuditHeaders<R>
where
    R: RandomSource,
{
    /// Replaces the source used for request and session IDs.
    pub fn with_random<T: RandomSource>(self, random: T) -> AuditHeaders<T> {
        AuditHeaders {
            session: self.session,
            random,
        }
    }

    /// The session ID of authenticated clients, which is stable across
    /// requests.
    pub fn session_id(&self) -> Option<&str> {
        match &self.session {
            Session::Unauthenticated => None,
            Session::Authenticated { session_id, .. } => Some(session_id),
        }
    }

    /// Returns the headers of the next request.
    pub fn next_request(&self) -> RequestHeaders {
        let mut headers = RequestHeaders::from([
            (HEADER_AUDIT_CALLING_APP_NAME, AUDIT_CALLING_APP_NAME.to_owned()),
            (
                HEADER_AUDIT_CALLING_APP_VERSION,
                AUDIT_CALLING_APP_VERSION.to_owned(),
            ),
            (HEADER_AUDIT_REQUEST_ID, self.random.hex_id()),
        ]);

        match &self.session {
            Session::Unauthenticated => {
                headers.insert(HEADER_AUDIT_SESSION_ID, self.random.hex_id());
            }
            Session::Authenticated { bearer, session_id } => {
                headers.insert(HEADER_AUDIT_SESSION_ID, session_id.clone());
                headers.insert(HEADER_AUTHORIZATION, format!("Bearer {bearer}"));
            }
        }

        headers
    }
}

/// Reads the `jti` claim without verifying the signature. The token is
/// issued to us by the server, it is never trusted for anything else.
#[instrument(skip_all)]
fn read_token_id(token: &str) -> Result<String, Error> {
    let header = decode_header(token).context(ReadTokenIdSnafu)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_id = decode::<TokenId>(token, &DecodingKey::from_secret(&[]), &validation)
        .context(ReadTokenIdSnafu)?;

    Ok(token_id.claims.jti)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    fn token(claims: &serde_json::Value) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"server side secret"),
        )
        .expect("token must encode")
    }

    #[test]
    fn unauthenticated_headers() {
        let audit = AuditHeaders::unauthenticated();
        let first = audit.next_request();
        let second = audit.next_request();

        assert_eq!(first[HEADER_AUDIT_CALLING_APP_NAME], "myID");
        assert_eq!(first[HEADER_AUDIT_CALLING_APP_VERSION], "3.1.0.2");
        assert_eq!(first[HEADER_AUDIT_REQUEST_ID].len(), 32);
        assert!(!first.contains_key(HEADER_AUTHORIZATION));

        assert_ne!(
            first[HEADER_AUDIT_REQUEST_ID],
            second[HEADER_AUDIT_REQUEST_ID]
        );
        assert_ne!(
            first[HEADER_AUDIT_SESSION_ID],
            second[HEADER_AUDIT_SESSION_ID]
        );
    }

    #[test]
    fn authenticated_headers() {
        let token = token(&json!({"jti": "b1f0c0de", "exp": 1}));
        let audit = AuditHeaders::authenticated(token.clone()).expect("token must be readable");
        let first = audit.next_request();
        let second = audit.next_request();

        assert_eq!(audit.session_id(), Some("b1f0c0de"));
        assert_eq!(first[HEADER_AUDIT_SESSION_ID], "b1f0c0de");
        assert_eq!(second[HEADER_AUDIT_SESSION_ID], "b1f0c0de");
        assert_eq!(first[HEADER_AUTHORIZATION], format!("Bearer {token}"));
        assert_ne!(
            first[HEADER_AUDIT_REQUEST_ID],
            second[HEADER_AUDIT_REQUEST_ID]
        );
    }

    #[test]
    fn token_without_id() {
        let err = AuditHeaders::authenticated(token(&json!({"sub": "jane"})))
            .expect_err("tokens without jti must be rejected");

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn malformed_token() {
        assert!(AuditHeaders::authenticated("not.a.jwt").is_err());
    }
}
