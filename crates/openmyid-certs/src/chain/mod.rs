//! Decodes the PKCS #7 (`SignedData`, RFC 5652) envelope returned by the
//! issuer into an ordered [`CertificateChain`].
//!
//! Only the `certificates` field of the envelope is used. Neither the
//! envelope signature nor the chain itself is validated, trust decisions are
//! up to the caller.
//!
//! The issuer emits the envelope with indefinite-length BER encodings, which
//! the DER-only [`x509_cert::der`] refuses. The envelope is therefore walked
//! with [`asn1_rs`] in BER mode, and only the embedded certificates (which
//! are DER) are handed to [`x509_cert`].
use std::fmt;

use asn1_rs::{Any, Class, FromBer, Tag};
use base64::{Engine, engine::general_purpose::STANDARD};
use const_oid::{ObjectIdentifier, db::rfc4519::CN};
use rsa::{BigUint, RsaPublicKey, pkcs8::DecodePublicKey};
use sha1::{Digest, Sha1};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, instrument, warn};
use x509_cert::{
    Certificate,
    der::{Decode, Encode},
    name::Name,
};

use crate::{
    ErrorKind,
    consts::ID_SIGNED_DATA,
    keys::Identity,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the certificate chain is not valid base64"))]
    InvalidBase64 { source: base64::DecodeError },

    #[snafu(display("failed to decode the PKCS7 envelope"))]
    DecodeEnvelope {
        source: asn1_rs::Err<asn1_rs::Error>,
    },

    #[snafu(display("the PKCS7 envelope is followed by {len} bytes of trailing data"))]
    TrailingData { len: usize },

    #[snafu(display("expected {field} to be {expected}, got {actual}"))]
    UnexpectedTag {
        field: &'static str,
        expected: TagDisplay,
        actual: TagDisplay,
    },

    #[snafu(display("the PKCS7 envelope is missing the {field} field"))]
    MissingField { field: &'static str },

    #[snafu(display("failed to decode the PKCS7 content type"))]
    DecodeContentType { source: const_oid::Error },

    #[snafu(display("unsupported PKCS7 content type {oid}, expected signedData"))]
    UnsupportedContentType { oid: ObjectIdentifier },

    #[snafu(display("the PKCS7 envelope doesn't contain any certificates"))]
    NoCertificates,

    #[snafu(display("failed to decode certificate at index {index}"))]
    DecodeCertificate {
        source: x509_cert::der::Error,
        index: usize,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCertificates => ErrorKind::EmptyChain,
            _ => ErrorKind::MalformedChain,
        }
    }
}

/// A certificate as issued, keeping the exact DER bytes it was decoded from.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    der: Vec<u8>,
    certificate: Certificate,
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .field("serial_number", &self.serial_number())
            .field("sha1_fingerprint", &self.sha1_fingerprint())
            .finish_non_exhaustive()
    }
}

impl IssuedCertificate {
    /// Decodes a single DER encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, x509_cert::der::Error> {
        let certificate = Certificate::from_der(der)?;
        Ok(Self {
            der: der.to_vec(),
            certificate,
        })
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn subject(&self) -> &Name {
        &self.certificate.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.certificate.tbs_certificate.issuer
    }

    /// The serial number rendered as unsigned decimal integer.
    pub fn serial_number(&self) -> String {
        let serial = self.certificate.tbs_certificate.serial_number.as_bytes();
        BigUint::from_bytes_be(serial).to_str_radix(10)
    }

    /// The uppercase hex SHA-1 digest of the DER encoding.
    pub fn sha1_fingerprint(&self) -> String {
        hex::encode_upper(Sha1::digest(&self.der))
    }

    /// The first common name of the subject, if any.
    pub fn common_name(&self) -> Option<String> {
        self.subject()
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|atv| atv.oid == CN)
            .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
            .map(ToOwned::to_owned)
    }

    /// Whether subject and issuer are the same. The signature is not checked.
    pub fn is_self_signed(&self) -> bool {
        self.subject() == self.issuer()
    }

    /// Whether the certificate certifies the public key of `identity`.
    pub fn matches_identity(&self, identity: &Identity) -> bool {
        let Ok(spki) = self.certificate.tbs_certificate.subject_public_key_info.to_der() else {
            return false;
        };

        RsaPublicKey::from_public_key_der(&spki).is_ok_and(|key| key == identity.public_key())
    }
}

/// An ordered chain of certificates, where index 0 is the leaf. The order is
/// exactly the order the issuer used, no reordering or trust validation
/// happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Vec<IssuedCertificate>,
}

impl CertificateChain {
    /// Decodes the base64 transport encoding of a PKCS #7 envelope. ASCII
    /// whitespace (like line breaks) is ignored.
    #[instrument(name = "decode_certificate_chain", skip_all, fields(input.len = input.len()))]
    pub fn decode_base64(input: &str) -> Result<Self> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let envelope = STANDARD.decode(compact).context(InvalidBase64Snafu)?;

        Self::decode_pkcs7(&envelope)
    }

    /// Decodes a BER or DER encoded PKCS #7 `ContentInfo` containing
    /// `SignedData`.
    pub fn decode_pkcs7(envelope: &[u8]) -> Result<Self> {
        let (trailing, content_info) = Any::from_ber(envelope).context(DecodeEnvelopeSnafu)?;
        ensure!(
            trailing.is_empty(),
            TrailingDataSnafu {
                len: trailing.len()
            }
        );
        expect_tag(&content_info, "ContentInfo", Class::Universal, Tag::Sequence)?;

        let mut fields = Children::of(&content_info);
        let (content_type, _) = next_field(&mut fields, "contentType")?;
        expect_tag(&content_type, "contentType", Class::Universal, Tag::Oid)?;

        let oid = ObjectIdentifier::from_bytes(content_type.data).context(DecodeContentTypeSnafu)?;
        ensure!(oid == ID_SIGNED_DATA, UnsupportedContentTypeSnafu { oid });

        let (content, _) = next_field(&mut fields, "content")?;
        expect_tag(&content, "content", Class::ContextSpecific, Tag(0))?;

        let (signed_data, _) = next_field(&mut Children::of(&content), "signedData")?;
        expect_tag(&signed_data, "signedData", Class::Universal, Tag::Sequence)?;

        // certificates is the only [0] IMPLICIT field of SignedData
        let mut certificates = None;
        for field in Children::of(&signed_data) {
            let (field, _) = field?;
            if is_tagged(&field, Class::ContextSpecific, Tag(0)) {
                certificates = Some(field);
                break;
            }
        }
        let certificates = certificates.context(NoCertificatesSnafu)?;

        let mut chain = Vec::new();
        for (index, choice) in Children::of(&certificates).enumerate() {
            let (choice, encoded) = choice?;
            if !is_tagged(&choice, Class::Universal, Tag::Sequence) {
                warn!(
                    index,
                    tag = %TagDisplay::of(&choice),
                    "skipping certificate choice which is not an X.509 certificate"
                );
                continue;
            }

            let certificate =
                IssuedCertificate::from_der(encoded).context(DecodeCertificateSnafu { index })?;
            debug!(
                index,
                certificate.subject = %certificate.subject(),
                certificate.serial = %certificate.serial_number(),
                certificate.sha1 = %certificate.sha1_fingerprint(),
                "decoded certificate"
            );
            chain.push(certificate);
        }

        ensure!(!chain.is_empty(), NoCertificatesSnafu);
        debug!(chain.len = chain.len(), "decoded certificate chain");

        Ok(Self {
            certificates: chain,
        })
    }

    /// The leaf (first) certificate. A decoded chain is never empty.
    pub fn leaf(&self) -> &IssuedCertificate {
        &self.certificates[0]
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always `false`, decoding rejects empty chains.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IssuedCertificate> {
        self.certificates.iter()
    }

    pub fn certificates(&self) -> &[IssuedCertificate] {
        &self.certificates
    }
}

impl<'a> IntoIterator for &'a CertificateChain {
    type IntoIter = std::slice::Iter<'a, IssuedCertificate>;
    type Item = &'a IssuedCertificate;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Class and tag number of an element, printed like `[UNIVERSAL 16]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagDisplay {
    class: Class,
    tag: Tag,
}

impl TagDisplay {
    fn of(element: &Any<'_>) -> Self {
        Self {
            class: element.header.class(),
            tag: element.header.tag(),
        }
    }
}

impl fmt::Display for TagDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class {
            Class::Universal => "UNIVERSAL",
            Class::Application => "APPLICATION",
            Class::ContextSpecific => "CONTEXT",
            Class::Private => "PRIVATE",
        };
        write!(f, "[{class} {}]", self.tag.0)
    }
}

/// Iterates over the elements inside a constructed element. Every item
/// carries the complete encoding of the element next to the parsed form.
/// The iterator stops after the first error.
struct Children<'a> {
    remaining: &'a [u8],
}

impl<'a> Children<'a> {
    fn of(parent: &Any<'a>) -> Self {
        Self {
            remaining: parent.data,
        }
    }
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<(Any<'a>, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let input = self.remaining;
        match Any::from_ber(input) {
            Ok((rest, element)) => {
                self.remaining = rest;
                Some(Ok((element, &input[..input.len() - rest.len()])))
            }
            Err(source) => {
                self.remaining = &[];
                Some(Err(Error::DecodeEnvelope { source }))
            }
        }
    }
}

fn next_field<'a>(
    fields: &mut Children<'a>,
    field: &'static str,
) -> Result<(Any<'a>, &'a [u8])> {
    fields.next().context(MissingFieldSnafu { field })?
}

fn is_tagged(element: &Any<'_>, class: Class, tag: Tag) -> bool {
    element.header.class() == class && element.header.tag() == tag
}

fn expect_tag(element: &Any<'_>, field: &'static str, class: Class, tag: Tag) -> Result<()> {
    ensure!(
        is_tagged(element, class, tag),
        UnexpectedTagSnafu {
            field,
            expected: TagDisplay { class, tag },
            actual: TagDisplay::of(element),
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const EMPTY_SIGNED_DATA: [u8; 37] = [
        0x30, 0x23, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02, 0xa0, 0x16,
        0x30, 0x14, 0x02, 0x01, 0x01, 0x31, 0x00, 0x30, 0x0b, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86,
        0xf7, 0x0d, 0x01, 0x07, 0x01, 0x31, 0x00,
    ];

    #[test]
    fn envelope_without_certificates() {
        let err = CertificateChain::decode_pkcs7(&EMPTY_SIGNED_DATA).expect_err("must fail");

        assert!(matches!(err, Error::NoCertificates));
        assert_eq!(err.kind(), ErrorKind::EmptyChain);
    }

    #[test]
    fn envelope_with_empty_certificates() {
        // Same as above, but with an empty [0] certificates field
        let mut envelope = EMPTY_SIGNED_DATA.to_vec();
        envelope[1] += 2;
        envelope[14] += 2;
        envelope[16] += 2;
        envelope.splice(35..35, [0xa0, 0x00]);

        let err = CertificateChain::decode_pkcs7(&envelope).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::EmptyChain);
    }

    #[test]
    fn envelope_with_indefinite_lengths() {
        // EMPTY_SIGNED_DATA with an empty certificates field, where every
        // constructed element uses an indefinite length
        let envelope = [
            0x30, 0x80, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02, 0xa0,
            0x80, 0x30, 0x80, 0x02, 0x01, 0x01, 0x31, 0x00, 0x30, 0x0b, 0x06, 0x09, 0x2a, 0x86,
            0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01, 0xa0, 0x80, 0x00, 0x00, 0x31, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let err = CertificateChain::decode_pkcs7(&envelope).expect_err("must fail");
        assert!(matches!(err, Error::NoCertificates));
    }

    #[test]
    fn envelope_with_missing_end_of_contents() {
        let envelope = [
            0x30, 0x80, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02,
        ];

        let err = CertificateChain::decode_pkcs7(&envelope).expect_err("must fail");
        assert!(matches!(err, Error::DecodeEnvelope { .. }));
        assert_eq!(err.kind(), ErrorKind::MalformedChain);
    }

    #[test]
    fn envelope_which_is_not_a_sequence() {
        let err = CertificateChain::decode_pkcs7(&[0x02, 0x01, 0x01]).expect_err("must fail");

        assert_eq!(
            err.to_string(),
            "expected ContentInfo to be [UNIVERSAL 16], got [UNIVERSAL 2]"
        );
    }

    #[test]
    fn envelope_with_wrong_content_type() {
        // id-data instead of id-signedData
        let mut envelope = EMPTY_SIGNED_DATA.to_vec();
        envelope[12] = 0x01;

        let err = CertificateChain::decode_pkcs7(&envelope).expect_err("must fail");
        assert!(matches!(err, Error::UnsupportedContentType { .. }));
        assert_eq!(err.kind(), ErrorKind::MalformedChain);
    }

    #[test]
    fn envelope_with_trailing_data() {
        let mut envelope = EMPTY_SIGNED_DATA.to_vec();
        envelope.push(0x00);

        let err = CertificateChain::decode_pkcs7(&envelope).expect_err("must fail");
        assert!(matches!(err, Error::TrailingData { len: 1 }));
    }

    #[rstest]
    #[case::not_base64("this is *not* base64")]
    #[case::not_a_sequence("AgEB")]
    #[case::truncated("MCMGCSqGSIb3DQEHAqAWMBQCAQExADAL")]
    #[case::empty("")]
    fn malformed_input(#[case] input: &str) {
        let err = CertificateChain::decode_base64(input).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::MalformedChain);
    }

    #[test]
    fn whitespace_is_ignored() {
        let encoded = STANDARD.encode(EMPTY_SIGNED_DATA);
        let (head, tail) = encoded.split_at(20);
        let wrapped = format!(" {head}\r\n{tail}\n");

        let err = CertificateChain::decode_base64(&wrapped).expect_err("must fail");
        assert!(matches!(err, Error::NoCertificates));
    }
}
