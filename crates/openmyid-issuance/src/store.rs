//! Persistence of identities.
//!
//! The [`IdentityStore`] contract maps a label (the email address the
//! identity is registered with) to an encrypted export blob. The
//! [`IdentityVault`] combines a store with a [`KeyManager`] so that identities
//! never touch the store unencrypted.
use indexmap::IndexMap;
use openmyid_certs::{
    ErrorKind,
    keys::{self, Identity, KeyManager},
};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, instrument};

/// A label to blob mapping. Labels are unique.
pub trait IdentityStore {
    type Error: std::error::Error + 'static;

    /// Inserts a new entry. Implementations must reject existing labels.
    fn put(&mut self, label: &str, blob: Vec<u8>) -> Result<(), Self::Error>;

    fn get(&self, label: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// All labels, in insertion order.
    fn labels(&self) -> Result<Vec<String>, Self::Error>;
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum MemoryStoreError {
    #[snafu(display("an identity labelled {label:?} already exists"))]
    DuplicateLabel { label: String },
}

/// An [`IdentityStore`] keeping everything in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryIdentityStore {
    entries: IndexMap<String, Vec<u8>>,
}

impl IdentityStore for MemoryIdentityStore {
    type Error = MemoryStoreError;

    fn put(&mut self, label: &str, blob: Vec<u8>) -> Result<(), Self::Error> {
        ensure!(
            !self.entries.contains_key(label),
            DuplicateLabelSnafu { label }
        );
        self.entries.insert(label.to_owned(), blob);

        Ok(())
    }

    fn get(&self, label: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.entries.get(label).cloned())
    }

    fn labels(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self.entries.keys().cloned().collect())
    }
}

#[derive(Debug, Snafu)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    #[snafu(display("the identity has no email address to label it with"))]
    MissingEmail,

    #[snafu(display("failed to export the identity"))]
    ExportIdentity { source: keys::Error },

    #[snafu(display("failed to write identity {label:?}"))]
    WriteIdentity { source: E, label: String },

    #[snafu(display("failed to read identity {label:?}"))]
    ReadIdentity { source: E, label: String },

    #[snafu(display("failed to list identities"))]
    ListIdentities { source: E },

    #[snafu(display("there is no identity labelled {label:?}"))]
    UnknownLabel { label: String },

    #[snafu(display("failed to import identity {label:?}"))]
    ImportIdentity { source: keys::Error, label: String },
}

impl<E> Error<E>
where
    E: std::error::Error + 'static,
{
    /// Store backend failures are reported as [`ErrorKind::Transport`], like
    /// any other collaborator failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingEmail | Self::UnknownLabel { .. } => ErrorKind::InvalidArgument,
            Self::ExportIdentity { source } | Self::ImportIdentity { source, .. } => source.kind(),
            Self::WriteIdentity { .. }
            | Self::ReadIdentity { .. }
            | Self::ListIdentities { .. } => ErrorKind::Transport,
        }
    }
}

/// Stores identities encrypted with a password, labelled by their email
/// address.
#[derive(Debug)]
pub struct IdentityVault<S> {
    store: S,
    key_manager: KeyManager,
}

impl<S> IdentityVault<S>
where
    S: IdentityStore,
{
    pub fn new(store: S, key_manager: KeyManager) -> Self {
        Self { store, key_manager }
    }

    /// Encrypts the identity and inserts it labelled by its email address.
    /// Returns the label.
    #[instrument(name = "save_identity", skip_all)]
    pub fn save(
        &mut self,
        identity: &Identity,
        password: &str,
    ) -> Result<String, Error<S::Error>> {
        let label = identity.email().context(MissingEmailSnafu)?.to_owned();
        let blob = self
            .key_manager
            .export_encrypted(identity, password)
            .context(ExportIdentitySnafu)?;

        self.store
            .put(&label, blob)
            .context(WriteIdentitySnafu { label: &label })?;
        debug!(identity.label = %label, "saved identity");

        Ok(label)
    }

    /// Decrypts the identity labelled `label`. The returned identity carries
    /// the label as email address.
    #[instrument(name = "load_identity", skip(self, password))]
    pub fn load(&self, label: &str, password: &str) -> Result<Identity, Error<S::Error>> {
        let blob = self
            .store
            .get(label)
            .context(ReadIdentitySnafu { label })?
            .context(UnknownLabelSnafu { label })?;

        let identity = self
            .key_manager
            .import_encrypted(&blob, password)
            .context(ImportIdentitySnafu { label })?;

        Ok(identity.with_email(label))
    }

    pub fn labels(&self) -> Result<Vec<String>, Error<S::Error>> {
        self.store.labels().context(ListIdentitiesSnafu)
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}
