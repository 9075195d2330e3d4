//! Protocol constants which are baked into every client of the identity
//! provider.
use const_oid::ObjectIdentifier;

/// The minimum (and default) RSA modulus size in bits.
pub const DEFAULT_RSA_BIT_SIZE: usize = 2048;

/// The public exponent of every identity key.
pub const RSA_PUBLIC_EXPONENT: u32 = 65_537;

/// The default number of PBKDF2-HMAC-SHA256 iterations used when exporting an
/// identity.
pub const DEFAULT_KDF_ITERATIONS: u32 = 600_000;

/// Length of the random PBKDF2 salt in bytes.
pub const KDF_SALT_LEN: usize = 16;

/// The common name of every signing request subject.
pub const SUBJECT_COMMON_NAME: &str = "poi id";

/// The organization of every signing request subject.
pub const SUBJECT_ORGANIZATION: &str = "mygovid.gov.au";

/// The country of every signing request subject.
pub const SUBJECT_COUNTRY: &str = "AU";

/// The value of the application identifier extension.
pub const APPLICATION_IDENTIFIER: &str = "mygovid.gov.au";

/// The private OID of the application identifier extension.
pub const APPLICATION_IDENTIFIER_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.36.1.333.1");

/// The `id-signedData` content type (RFC 5652, section 5.1).
pub const ID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// The host used to build the `iss` claim of assertions.
pub const DEFAULT_ISSUER_HOST: &str = "ausidapp.gov.au";

/// The `aud` claim of assertions, which is the token endpoint.
pub const DEFAULT_AUDIENCE: &str = "https://myGovId.gov.au/connect/token";

/// The lifetime of a minted assertion in seconds.
pub const ASSERTION_LIFETIME_SECS: u64 = 3600;
