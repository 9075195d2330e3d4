//! Contains various constant definitions, mostly defaults of the issuance
//! flow and the audit headers every request has to carry.
use std::time::Duration;

/// The factor the issuer-supplied ETA is multiplied with before fetching the
/// certificate.
pub const DEFAULT_ETA_OVERSHOOT: f64 = 1.5;

/// The default number of fetch attempts while the issuer reports the
/// certificate as not yet ready.
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 3;

/// The default upper bound of a whole issuance attempt, 10 minutes.
pub const DEFAULT_ISSUANCE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// The calling application name reported to the issuer.
pub const AUDIT_CALLING_APP_NAME: &str = "myID";

/// The calling application version reported to the issuer.
pub const AUDIT_CALLING_APP_VERSION: &str = "3.1.0.2";

pub const HEADER_AUDIT_CALLING_APP_NAME: &str = "X-AuditCallingAppName";
pub const HEADER_AUDIT_CALLING_APP_VERSION: &str = "X-AuditCallingAppVersion";
pub const HEADER_AUDIT_REQUEST_ID: &str = "X-AuditRequestId";
pub const HEADER_AUDIT_SESSION_ID: &str = "X-AuditSessionId";
pub const HEADER_AUTHORIZATION: &str = "Authorization";

/// The status of a successfully verified email address.
pub const EMAIL_VERIFIED: &str = "Verified";
