//! Contains available options to configure the
//! [IssuanceOrchestrator][crate::IssuanceOrchestrator].
use std::time::Duration;

use crate::constants::{
    DEFAULT_ETA_OVERSHOOT, DEFAULT_ISSUANCE_TIMEOUT, DEFAULT_MAX_FETCH_ATTEMPTS,
};

/// Specifies available issuance options.
///
/// The [`Default`] implementation for this struct contains the following values:
///
/// - The ETA returned by the issuer is multiplied by 1.5 before fetching.
/// - The certificate is fetched at most 3 times while it is not ready.
/// - A whole issuance attempt times out after 10 minutes.
///
/// ### Example with Custom Fetch Attempts
///
/// ```
/// use std::time::Duration;
///
/// use openmyid_issuance::IssuanceOptions;
///
/// let options = IssuanceOptions::builder()
///     .max_fetch_attempts(5)
///     .timeout(Duration::from_secs(120))
///     .build();
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct IssuanceOptions {
    /// The factor the issuer-supplied ETA is multiplied with.
    pub eta_overshoot: f64,

    /// How often the certificate is fetched while the issuer reports it as
    /// not ready. Every attempt is preceded by a fresh ETA-based wait.
    pub max_fetch_attempts: u32,

    /// The upper bound of a whole issuance attempt, including all waits.
    pub timeout: Duration,
}

impl Default for IssuanceOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl IssuanceOptions {
    /// Returns the default [`IssuanceOptionsBuilder`] which allows to
    /// selectively customize the options.
    pub fn builder() -> IssuanceOptionsBuilder {
        IssuanceOptionsBuilder::default()
    }
}

/// The [`IssuanceOptionsBuilder`] which allows to selectively customize the
/// [`IssuanceOptions`].
#[derive(Debug, Default)]
pub struct IssuanceOptionsBuilder {
    eta_overshoot: Option<f64>,
    max_fetch_attempts: Option<u32>,
    timeout: Option<Duration>,
}

impl IssuanceOptionsBuilder {
    pub fn eta_overshoot(mut self, eta_overshoot: f64) -> Self {
        self.eta_overshoot = Some(eta_overshoot);
        self
    }

    /// Sets the maximum number of fetch attempts. Zero is treated as one.
    pub fn max_fetch_attempts(mut self, max_fetch_attempts: u32) -> Self {
        self.max_fetch_attempts = Some(max_fetch_attempts.max(1));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the final [`IssuanceOptions`] by using default values for any
    /// not explicitly set option.
    pub fn build(self) -> IssuanceOptions {
        IssuanceOptions {
            eta_overshoot: self.eta_overshoot.unwrap_or(DEFAULT_ETA_OVERSHOOT),
            max_fetch_attempts: self
                .max_fetch_attempts
                .unwrap_or(DEFAULT_MAX_FETCH_ATTEMPTS),
            timeout: self.timeout.unwrap_or(DEFAULT_ISSUANCE_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = IssuanceOptions::default();

        assert_eq!(options.eta_overshoot, 1.5);
        assert_eq!(options.max_fetch_attempts, 3);
        assert_eq!(options.timeout, Duration::from_secs(600));
    }

    #[test]
    fn zero_fetch_attempts_means_one() {
        let options = IssuanceOptions::builder().max_fetch_attempts(0).build();
        assert_eq!(options.max_fetch_attempts, 1);
    }
}
