//! The issuance state machine.
//!
//! An issuance attempt moves through
//! `Idle → RequestBuilt → Submitted → Pending → CertificateFetched →
//! ChainDecoded → Complete`. Any failure moves it into the terminal
//! [`IssuanceState::Failed`] state, which carries the [`ErrorKind`] of the
//! originating error. The wait before fetching the certificate is the only
//! suspension point which depends on time and can be cancelled by the caller.
use std::{future::Future, time::Duration};

use openmyid_certs::{
    ErrorKind,
    chain::{self, CertificateChain},
    csr::{self, RequestBuilder},
    keys::Identity,
    random::{OsRandom, RandomSource},
};
use snafu::{ResultExt, Snafu, ensure};
use strum::Display;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    options::IssuanceOptions,
    protocol::CertificateSigningRequestBody,
    transport::{FetchOutcome, IssuanceTransport, TransportError},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the terms and conditions version must not be empty"))]
    EmptyTermsVersion,

    #[snafu(display("the transport doesn't follow redirects, which fetching the certificate requires"))]
    RedirectsNotFollowed,

    #[snafu(display("the ETA overshoot factor {eta_overshoot} is not a non-negative number"))]
    InvalidEtaOvershoot { eta_overshoot: f64 },

    #[snafu(display("the wait for an ETA of {eta} seconds is not representable"))]
    InvalidEta {
        source: std::time::TryFromFloatSecsError,
        eta: u64,
    },

    #[snafu(display("the issuance attempt was already started"))]
    AlreadyStarted,

    #[snafu(display("failed to build the certificate signing request"))]
    BuildSigningRequest { source: csr::Error },

    #[snafu(display("failed to submit the certificate signing request"))]
    SubmitSigningRequest { source: TransportError },

    #[snafu(display("failed to fetch the certificate of signing task {task_id}"))]
    FetchCertificate {
        source: TransportError,
        task_id: u64,
    },

    #[snafu(display("the certificate was not ready after {attempts} fetch attempts"))]
    CertificateNotReady { attempts: u32 },

    #[snafu(display("failed to decode the issued certificate chain"))]
    DecodeChain { source: chain::Error },

    #[snafu(display("the issuance attempt was cancelled"))]
    Cancelled,

    #[snafu(display("the issuance attempt didn't complete within {timeout:?}"))]
    TimedOut { timeout: Duration },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyTermsVersion
            | Self::RedirectsNotFollowed
            | Self::InvalidEtaOvershoot { .. }
            | Self::InvalidEta { .. }
            | Self::AlreadyStarted => ErrorKind::InvalidArgument,
            Self::BuildSigningRequest { source } => source.kind(),
            Self::SubmitSigningRequest { .. } | Self::FetchCertificate { .. } => {
                ErrorKind::Transport
            }
            Self::CertificateNotReady { .. } => ErrorKind::NotReady,
            Self::DecodeChain { source } => source.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
            Self::TimedOut { .. } => ErrorKind::Timeout,
        }
    }
}

/// The states of an [`IssuanceAttempt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssuanceState {
    Idle,

    /// The signing request was built. Its `dnQualifier` identifies the
    /// attempt in logs.
    RequestBuilt { dn_qualifier: Uuid },

    /// The issuer accepted the signing request as task `task_id`.
    Submitted { task_id: u64, eta: u64 },

    /// Waiting `wait` before fetch attempt `attempt` (starting at 1).
    Pending { wait: Duration, attempt: u32 },

    CertificateFetched,

    ChainDecoded { chain_len: usize },

    Complete,

    /// Terminal failure state, reachable from every non-terminal state.
    Failed(ErrorKind),
}

impl IssuanceState {
    /// The stage of this state, without any attached data.
    pub fn stage(&self) -> IssuanceStage {
        match self {
            Self::Idle => IssuanceStage::Idle,
            Self::RequestBuilt { .. } => IssuanceStage::RequestBuilt,
            Self::Submitted { .. } => IssuanceStage::Submitted,
            Self::Pending { .. } => IssuanceStage::Pending,
            Self::CertificateFetched => IssuanceStage::CertificateFetched,
            Self::ChainDecoded { .. } => IssuanceStage::ChainDecoded,
            Self::Complete => IssuanceStage::Complete,
            Self::Failed(_) => IssuanceStage::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum IssuanceStage {
    Idle,
    RequestBuilt,
    Submitted,
    Pending,
    CertificateFetched,
    ChainDecoded,
    Complete,
    Failed,
}

/// The result of a completed issuance.
#[derive(Debug)]
pub struct IssuedIdentity {
    /// The identity the certificate was issued for.
    pub identity: Identity,

    /// The issued chain, leaf first.
    pub chain: CertificateChain,

    /// The bearer token which authenticates the calls following issuance.
    pub credential_token: String,

    /// The signing task which produced the certificate.
    pub task_id: u64,
}

/// Drives certificate issuance against an [`IssuanceTransport`].
#[derive(Debug)]
pub struct IssuanceOrchestrator<T, R = OsRandom> {
    transport: T,
    request_builder: RequestBuilder<R>,
    options: IssuanceOptions,
}

impl<T> IssuanceOrchestrator<T>
where
    T: IssuanceTransport,
{
    pub fn new(transport: T, options: IssuanceOptions) -> Self {
        Self {
            transport,
            request_builder: RequestBuilder::new(),
            options,
        }
    }
}

impl<T, R> IssuanceOrchestrator<T, R>
where
    T: IssuanceTransport,
    R: RandomSource,
{
    /// Replaces the request builder, for example to control the
    /// `dnQualifier` of the requests.
    pub fn with_request_builder<S: RandomSource>(
        self,
        request_builder: RequestBuilder<S>,
    ) -> IssuanceOrchestrator<T, S> {
        IssuanceOrchestrator {
            transport: self.transport,
            request_builder,
            options: self.options,
        }
    }

    pub fn options(&self) -> &IssuanceOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Starts a new attempt in the [`IssuanceState::Idle`] state. Use this
    /// instead of [`Self::issue`] to inspect the states the attempt went
    /// through.
    pub fn attempt(&self) -> IssuanceAttempt<'_, T, R> {
        IssuanceAttempt {
            orchestrator: self,
            state: IssuanceState::Idle,
            history: vec![IssuanceState::Idle],
        }
    }

    /// Issues a certificate for `identity` as part of the proof of identity
    /// process started with the accepted `terms_version`.
    pub async fn issue(&self, identity: Identity, terms_version: &str) -> Result<IssuedIdentity> {
        self.attempt().issue(identity, terms_version).await
    }

    /// Like [`Self::issue`], but aborts with [`ErrorKind::Cancelled`] as soon
    /// as `cancel` completes.
    pub async fn issue_with_cancellation(
        &self,
        identity: Identity,
        terms_version: &str,
        cancel: impl Future<Output = ()>,
    ) -> Result<IssuedIdentity> {
        self.attempt()
            .issue_with_cancellation(identity, terms_version, cancel)
            .await
    }

    fn wait_for(&self, eta: u64) -> Result<Duration> {
        Duration::try_from_secs_f64(eta as f64 * self.options.eta_overshoot)
            .context(InvalidEtaSnafu { eta })
    }
}

/// A single issuance attempt. Attempts are not reusable, every attempt
/// starts in [`IssuanceState::Idle`] and ends in a terminal state.
#[derive(Debug)]
pub struct IssuanceAttempt<'a, T, R = OsRandom> {
    orchestrator: &'a IssuanceOrchestrator<T, R>,
    state: IssuanceState,
    history: Vec<IssuanceState>,
}

impl<T, R> IssuanceAttempt<'_, T, R>
where
    T: IssuanceTransport,
    R: RandomSource,
{
    pub fn state(&self) -> &IssuanceState {
        &self.state
    }

    /// Every state this attempt went through, starting with
    /// [`IssuanceState::Idle`].
    pub fn history(&self) -> &[IssuanceState] {
        &self.history
    }

    /// Runs this attempt to completion. It can't be cancelled other than by
    /// the configured timeout.
    pub async fn issue(
        &mut self,
        identity: Identity,
        terms_version: &str,
    ) -> Result<IssuedIdentity> {
        self.issue_with_cancellation(identity, terms_version, std::future::pending())
            .await
    }

    /// Runs this attempt to completion, unless `cancel` completes first.
    #[instrument(name = "issue_certificate", skip_all)]
    pub async fn issue_with_cancellation(
        &mut self,
        identity: Identity,
        terms_version: &str,
        cancel: impl Future<Output = ()>,
    ) -> Result<IssuedIdentity> {
        ensure!(self.state == IssuanceState::Idle, AlreadyStartedSnafu);

        let timeout = self.orchestrator.options.timeout;
        let result = tokio::select! {
            biased;

            () = cancel => CancelledSnafu.fail(),
            result = tokio::time::timeout(timeout, self.run(identity, terms_version)) => {
                match result {
                    Ok(result) => result,
                    Err(_elapsed) => TimedOutSnafu { timeout }.fail(),
                }
            }
        };

        if let Err(err) = &result {
            let kind = err.kind();
            if kind == ErrorKind::Cancelled {
                info!("issuance attempt cancelled");
            } else {
                warn!(error = %err, %kind, "issuance attempt failed");
            }
            self.transition(IssuanceState::Failed(kind));
        }

        result
    }

    async fn run(&mut self, identity: Identity, terms_version: &str) -> Result<IssuedIdentity> {
        let orchestrator = self.orchestrator;
        let transport = &orchestrator.transport;
        let options = &orchestrator.options;

        ensure!(!terms_version.is_empty(), EmptyTermsVersionSnafu);
        ensure!(
            transport.capabilities().follows_redirects,
            RedirectsNotFollowedSnafu
        );
        ensure!(
            options.eta_overshoot.is_finite() && options.eta_overshoot >= 0.0,
            InvalidEtaOvershootSnafu {
                eta_overshoot: options.eta_overshoot
            }
        );

        let request = orchestrator
            .request_builder
            .build(&identity)
            .context(BuildSigningRequestSnafu)?;
        self.transition(IssuanceState::RequestBuilt {
            dn_qualifier: request.dn_qualifier(),
        });

        let body = CertificateSigningRequestBody::from(&request);
        let task = transport
            .submit_signing_request(terms_version, &body)
            .await
            .context(SubmitSigningRequestSnafu)?;
        let task_id = task.id;
        self.transition(IssuanceState::Submitted {
            task_id,
            eta: task.eta,
        });

        let mut eta = task.eta;
        let mut attempt = 0;
        let response = loop {
            attempt += 1;

            let wait = orchestrator.wait_for(eta)?;
            self.transition(IssuanceState::Pending { wait, attempt });
            tokio::time::sleep(wait).await;

            match transport
                .fetch_issued_certificate(task_id)
                .await
                .context(FetchCertificateSnafu { task_id })?
            {
                FetchOutcome::Issued(response) => break response,
                FetchOutcome::NotReady(task) => {
                    ensure!(
                        attempt < options.max_fetch_attempts,
                        CertificateNotReadySnafu { attempts: attempt }
                    );
                    debug!(task_id, eta = task.eta, "certificate not ready yet");
                    eta = task.eta;
                }
            }
        };
        self.transition(IssuanceState::CertificateFetched);

        let chain = response
            .decode_certificate_chain()
            .context(DecodeChainSnafu)?;
        self.transition(IssuanceState::ChainDecoded {
            chain_len: chain.len(),
        });

        if !chain.leaf().matches_identity(&identity) {
            warn!(
                certificate.serial_number = %chain.leaf().serial_number(),
                "the issued leaf certificate doesn't certify the identity key"
            );
        }
        self.transition(IssuanceState::Complete);

        Ok(IssuedIdentity {
            identity,
            chain,
            credential_token: response.credential_token,
            task_id,
        })
    }

    fn transition(&mut self, state: IssuanceState) {
        info!(from = %self.state.stage(), to = %state.stage(), "issuance state changed");
        debug!(?state);

        self.state = state.clone();
        self.history.push(state);
    }
}
