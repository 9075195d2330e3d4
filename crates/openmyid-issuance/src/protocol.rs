//! Typed request and response bodies of the proof of identity and credential
//! issuance endpoints. All bodies use camelCase JSON field names.
//!
//! Request bodies which carry user input are only constructible through
//! validating constructors.
use std::collections::BTreeMap;

use openmyid_certs::{
    ErrorKind,
    chain::{self, CertificateChain},
    csr::SigningRequest,
};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use snafu::{ResultExt, Snafu, ensure};
use time::{Date, Month};

use crate::constants::EMAIL_VERIFIED;

/// Hypermedia links attached to most responses. Their content is not
/// interpreted.
pub type Links = Vec<BTreeMap<String, serde_json::Value>>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("{field:?} must not be empty"))]
    EmptyField { field: &'static str },

    #[snafu(display("{email:?} is not a valid email address"))]
    InvalidEmailAddress { email: String },

    #[snafu(display("{year:04}-{month:02}-{day:02} is not a valid date of birth"))]
    InvalidDateOfBirth {
        source: time::error::ComponentRange,
        year: u16,
        month: u8,
        day: u8,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// The current terms and conditions, which have to be accepted to start the
/// proof of identity process.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsAndConditions {
    pub url: String,
    pub version: String,
}

/// Starts the proof of identity process by accepting a version of the terms
/// and conditions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTermsBody {
    accepted_version: String,
}

impl AcceptTermsBody {
    pub fn new(accepted_version: impl Into<String>) -> Result<Self, Error> {
        let accepted_version = accepted_version.into();
        ensure!(!accepted_version.is_empty(), EmptyFieldSnafu {
            field: "acceptedVersion"
        });

        Ok(Self { accepted_version })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOfIdentityProcess {
    pub status: String,
    pub strength: String,
    pub accepted_terms_and_conditions_version: String,
    pub process_id: String,
    pub links: Links,
}

/// Starts the verification of an email address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddressBody {
    email_address: String,
}

impl EmailAddressBody {
    pub fn new(email_address: impl Into<String>) -> Result<Self, Error> {
        let email_address = email_address.into();
        validate_email(&email_address)?;

        Ok(Self { email_address })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationTask {
    pub id: u64,
    pub status: String,
    pub eta: u64,
    pub remaining_retry_count: u32,
    pub process_id: String,
    pub links: Links,
}

/// Completes the verification of an email address with the code the user
/// received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationBody {
    email_address: String,
    verification_code: String,
}

impl EmailVerificationBody {
    pub fn new(
        email_address: impl Into<String>,
        verification_code: impl Into<String>,
    ) -> Result<Self, Error> {
        let email_address = email_address.into();
        let verification_code = verification_code.into();
        validate_email(&email_address)?;
        ensure!(!verification_code.trim().is_empty(), EmptyFieldSnafu {
            field: "verificationCode"
        });

        Ok(Self {
            email_address,
            verification_code,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationResult {
    pub verification_code_result: String,

    /// The bearer token which authenticates the certificate signing calls.
    pub poi_assurance_token: String,
    pub process_id: String,
    pub links: Links,
}

impl EmailVerificationResult {
    pub fn is_verified(&self) -> bool {
        self.verification_code_result == EMAIL_VERIFIED
    }
}

/// Submits a certificate signing request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSigningRequestBody {
    /// Base64 encoded DER PKCS #10 request.
    pub p10: String,
}

impl From<&SigningRequest> for CertificateSigningRequestBody {
    fn from(request: &SigningRequest) -> Self {
        Self {
            p10: request.to_base64(),
        }
    }
}

/// The asynchronous certificate signing task created by the issuer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSigningTask {
    pub id: u64,
    pub status: String,

    /// Estimated seconds until the certificate is issued.
    pub eta: u64,
    pub links: Links,
}

/// The issued certificate.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    pub id: u64,

    /// Base64 encoded PKCS #7 envelope containing the certificate chain.
    pub p7: String,

    /// The submitted request, echoed back.
    pub p10: String,

    /// The bearer token which authenticates the credential calls.
    pub credential_token: String,
    pub links: Links,
}

impl CertificateResponse {
    /// Decodes the certificate chain contained in `p7`.
    pub fn decode_certificate_chain(&self) -> chain::Result<CertificateChain> {
        CertificateChain::decode_base64(&self.p7)
    }
}

/// A calendar date, serialized as `{"year": .., "month": .., "day": ..}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateOfBirth(Date);

impl DateOfBirth {
    pub fn new(year: u16, month: u8, day: u8) -> Result<Self, Error> {
        let context = InvalidDateOfBirthSnafu { year, month, day };
        let month = Month::try_from(month).context(context)?;
        let date = Date::from_calendar_date(i32::from(year), month, day).context(context)?;

        Ok(Self(date))
    }

    pub fn date(&self) -> Date {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u8 {
        self.0.month().into()
    }

    pub fn day(&self) -> u8 {
        self.0.day()
    }
}

impl Serialize for DateOfBirth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DateOfBirth", 3)?;
        state.serialize_field("year", &self.year())?;
        state.serialize_field("month", &self.month())?;
        state.serialize_field("day", &self.day())?;
        state.end()
    }
}

/// Personal details submitted with the credential token after issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetailsBody {
    given_name: String,
    family_name: String,
    date_of_birth: DateOfBirth,
}

impl PersonalDetailsBody {
    pub fn new(
        given_name: impl Into<String>,
        family_name: impl Into<String>,
        date_of_birth: DateOfBirth,
    ) -> Result<Self, Error> {
        let given_name = given_name.into();
        let family_name = family_name.into();
        ensure!(!given_name.trim().is_empty(), EmptyFieldSnafu {
            field: "givenName"
        });
        ensure!(!family_name.trim().is_empty(), EmptyFieldSnafu {
            field: "familyName"
        });

        Ok(Self {
            given_name,
            family_name,
            date_of_birth,
        })
    }
}

fn validate_email(email: &str) -> Result<(), Error> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    ensure!(valid, InvalidEmailAddressSnafu { email });

    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn certificate_signing_task_from_json() {
        let task: CertificateSigningTask = serde_json::from_value(json!({
            "id": 42,
            "status": "Pending",
            "eta": 2,
            "links": [{"rel": "self", "href": "/credentials/tasks/42"}]
        }))
        .expect("task must deserialize");

        assert_eq!(task.id, 42);
        assert_eq!(task.eta, 2);
        assert_eq!(task.links[0]["rel"], "self");
    }

    #[test]
    fn certificate_response_from_json() {
        let response: CertificateResponse = serde_json::from_value(json!({
            "id": 42,
            "p7": "MAA=",
            "p10": "MAA=",
            "credentialToken": "token",
            "links": []
        }))
        .expect("response must deserialize");

        assert_eq!(response.credential_token, "token");
    }

    #[rstest]
    #[case("Verified", true)]
    #[case("Invalid", false)]
    #[case("verified", false)]
    fn email_verification_result(#[case] result: &str, #[case] verified: bool) {
        let result: EmailVerificationResult = serde_json::from_value(json!({
            "verificationCodeResult": result,
            "poiAssuranceToken": "token",
            "processId": "process",
            "links": []
        }))
        .expect("result must deserialize");

        assert_eq!(result.is_verified(), verified);
    }

    #[test]
    fn email_verification_body_to_json() {
        let body = EmailVerificationBody::new("jane@example.com", "123456")
            .expect("body must be valid");

        assert_eq!(
            serde_json::to_value(body).expect("body must serialize"),
            json!({"emailAddress": "jane@example.com", "verificationCode": "123456"})
        );
    }

    #[rstest]
    #[case::no_at("jane.example.com")]
    #[case::no_local_part("@example.com")]
    #[case::no_domain("jane@localhost")]
    #[case::empty("")]
    fn invalid_email_addresses(#[case] email: &str) {
        let err = EmailAddressBody::new(email).expect_err("email must be rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_verification_code() {
        let err = EmailVerificationBody::new("jane@example.com", "  ")
            .expect_err("empty code must be rejected");
        assert_eq!(err, Error::EmptyField {
            field: "verificationCode"
        });
    }

    #[rstest]
    #[case(2000, 2, 29, true)]
    #[case(1900, 2, 29, false)]
    #[case(1990, 4, 31, false)]
    #[case(1990, 13, 1, false)]
    #[case(1990, 1, 0, false)]
    #[case(1990, 12, 31, true)]
    #[case(2024, 2, 30, false)]
    fn date_of_birth(#[case] year: u16, #[case] month: u8, #[case] day: u8, #[case] valid: bool) {
        assert_eq!(DateOfBirth::new(year, month, day).is_ok(), valid);
    }

    #[test]
    fn invalid_date_of_birth_keeps_input() {
        let err = DateOfBirth::new(1990, 13, 1).expect_err("month 13 must be rejected");

        assert!(matches!(err, Error::InvalidDateOfBirth {
            year: 1990,
            month: 13,
            day: 1,
            ..
        }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn personal_details_to_json() {
        let body = PersonalDetailsBody::new(
            "Jane",
            "Citizen",
            DateOfBirth::new(1990, 1, 31).expect("date must be valid"),
        )
        .expect("body must be valid");

        assert_eq!(
            serde_json::to_value(body).expect("body must serialize"),
            json!({
                "givenName": "Jane",
                "familyName": "Citizen",
                "dateOfBirth": {"year": 1990, "month": 1, "day": 31}
            })
        );
    }

    #[test]
    fn accept_terms_to_json() {
        let body = AcceptTermsBody::new("2.0").expect("body must be valid");
        assert_eq!(
            serde_json::to_value(body).expect("body must serialize"),
            json!({"acceptedVersion": "2.0"})
        );
    }
}
