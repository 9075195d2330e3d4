//! Builds the PKCS #10 certificate signing request which is submitted to the
//! issuer. The subject and extensions are fixed by the protocol, only the
//! `dnQualifier` is a fresh random UUID for every request.
use base64::{Engine, engine::general_purpose::STANDARD};
use const_oid::{
    AssociatedOid, ObjectIdentifier,
    db::rfc4519::{C, CN, DN_QUALIFIER, O},
};
use rsa::pkcs1v15::{Signature, SigningKey};
use sha2::Sha512;
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};
use uuid::Uuid;
use x509_cert::{
    attr::AttributeTypeAndValue,
    builder::Builder,
    der::{
        self, Encode, EncodeValue, FixedTag, Length, Tag, Writer,
        asn1::{Any, Ia5String, PrintableStringRef, SetOfVec, Utf8StringRef},
    },
    ext::{AsExtension, Extension},
    name::{Name, RdnSequence, RelativeDistinguishedName},
};

use crate::{
    ErrorKind,
    consts::{
        APPLICATION_IDENTIFIER, APPLICATION_IDENTIFIER_OID, SUBJECT_COMMON_NAME, SUBJECT_COUNTRY,
        SUBJECT_ORGANIZATION,
    },
    keys::Identity,
    random::{OsRandom, RandomSource},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to encode the signing request subject"))]
    EncodeSubject { source: der::Error },

    #[snafu(display("failed to encode the application identifier extension"))]
    EncodeApplicationIdentifier { source: der::Error },

    #[snafu(display("failed to create signing request builder"))]
    CreateRequestBuilder { source: x509_cert::builder::Error },

    #[snafu(display("failed to add signing request extension"))]
    AddRequestExtension { source: x509_cert::builder::Error },

    #[snafu(display("failed to sign the signing request"))]
    SignRequest { source: x509_cert::builder::Error },

    #[snafu(display("failed to serialize the signing request as DER"))]
    SerializeRequest { source: der::Error },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::SigningFailed
    }
}

/// The non-critical application identifier extension (OID `1.2.36.1.333.1`)
/// which carries the IA5String `mygovid.gov.au`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationIdentifier(Ia5String);

impl ApplicationIdentifier {
    pub fn new(value: &str) -> der::Result<Self> {
        Ia5String::new(value).map(Self)
    }
}

impl AssociatedOid for ApplicationIdentifier {
    const OID: ObjectIdentifier = APPLICATION_IDENTIFIER_OID;
}

impl FixedTag for ApplicationIdentifier {
    const TAG: Tag = Tag::Ia5String;
}

impl EncodeValue for ApplicationIdentifier {
    fn value_len(&self) -> der::Result<Length> {
        self.0.value_len()
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.0.encode_value(writer)
    }
}

impl AsExtension for ApplicationIdentifier {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }
}

/// A signed PKCS #10 request. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningRequest {
    der: Vec<u8>,
    dn_qualifier: Uuid,
}

impl SigningRequest {
    /// The DER encoded `CertificationRequest`.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// The random UUID used as `dnQualifier` of the subject.
    pub fn dn_qualifier(&self) -> Uuid {
        self.dn_qualifier
    }

    /// The transport encoding expected by the issuer: standard base64 of the
    /// DER bytes, without line breaks.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.der)
    }
}

/// Builds [`SigningRequest`]s for an [`Identity`].
#[derive(Debug, Default)]
pub struct RequestBuilder<R = OsRandom> {
    random: R,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R> RequestBuilder<R>
where
    R: RandomSource,
{
    /// Uses `random` to generate the `dnQualifier` UUIDs.
    pub fn with_random(random: R) -> Self {
        Self { random }
    }

    /// Builds and signs (sha512WithRSAEncryption) a new request for the
    /// identity's key.
    ///
    /// The subject is, in this order: `CN=poi id`, `dnQualifier=<uuid>`,
    /// `O=mygovid.gov.au` and `C=AU`.
    #[instrument(name = "build_signing_request", skip_all)]
    pub fn build(&self, identity: &Identity) -> Result<SigningRequest> {
        let dn_qualifier = self.random.uuid();
        let subject = subject(&dn_qualifier).context(EncodeSubjectSnafu)?;

        let signing_key = SigningKey::<Sha512>::new(identity.private_key().clone());
        let mut builder = x509_cert::builder::RequestBuilder::new(subject, &signing_key)
            .context(CreateRequestBuilderSnafu)?;

        let application_identifier = ApplicationIdentifier::new(APPLICATION_IDENTIFIER)
            .context(EncodeApplicationIdentifierSnafu)?;
        builder
            .add_extension(&application_identifier)
            .context(AddRequestExtensionSnafu)?;

        let request = builder
            .build::<Signature>()
            .context(SignRequestSnafu)?;
        let der = request.to_der().context(SerializeRequestSnafu)?;

        debug!(
            request.dn_qualifier = %dn_qualifier,
            request.len = der.len(),
            "built certificate signing request"
        );

        Ok(SigningRequest { der, dn_qualifier })
    }
}

fn subject(dn_qualifier: &Uuid) -> der::Result<Name> {
    let dn_qualifier = dn_qualifier.to_string();
    let attributes = [
        (CN, Any::encode_from(&Utf8StringRef::new(SUBJECT_COMMON_NAME)?)?),
        (
            DN_QUALIFIER,
            Any::encode_from(&PrintableStringRef::new(&dn_qualifier)?)?,
        ),
        (O, Any::encode_from(&Utf8StringRef::new(SUBJECT_ORGANIZATION)?)?),
        (C, Any::encode_from(&PrintableStringRef::new(SUBJECT_COUNTRY)?)?),
    ];

    let rdns = attributes
        .into_iter()
        .map(|(oid, value)| {
            SetOfVec::try_from(vec![AttributeTypeAndValue { oid, value }])
                .map(RelativeDistinguishedName)
        })
        .collect::<der::Result<Vec<_>>>()?;

    Ok(RdnSequence(rdns))
}
