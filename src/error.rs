// Typed errors for the catalog, downloader, installer and queue scheduler

use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::{Architecture, Platform};

/// Errors raised while turning user input into a release and a package list.
/// These never have side effects: the queue is not built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Invalid version '{0}', expected a version like 2019.4.31f1 or a 12 character hash")]
    InvalidVersion(String),

    #[error("Could not find a release matching '{0}'")]
    UnknownVersion(String),

    #[error("Release {version} has no download for {platform} ({architecture})")]
    NoDownload {
        version: String,
        platform: Platform,
        architecture: Architecture,
    },

    #[error("Package pattern '{pattern}' is ambiguous, it matches both '{first}' and '{second}'")]
    AmbiguousPackage {
        pattern: String,
        first: String,
        second: String,
    },

    #[error("Unknown package(s) for Unity {version}: {}", .packages.join(", "))]
    UnknownPackages {
        version: String,
        packages: Vec<String>,
    },
}

/// Errors raised by a single file transfer
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Downloader has not been prepared")]
    NotPrepared,

    #[error("Downloader already ran, reset it before starting again")]
    AlreadyStarted,

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Transfer of {url} failed: {source}")]
    Transfer {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection dropped after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },

    #[error("Hash mismatch for '{path}': expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
        /// Whether the transfer continued a partial file from an earlier attempt
        resumed: bool,
    },

    #[error("Unsupported integrity hash '{0}'")]
    UnsupportedHash(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the scheduler may retry the transfer.
    ///
    /// Network faults are retryable. A hash mismatch is only retryable when the transfer
    /// had resumed a partial file, which the downloader discards before failing.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Request { .. }
            | DownloadError::Status { .. }
            | DownloadError::Transfer { .. }
            | DownloadError::Incomplete { .. } => true,
            DownloadError::HashMismatch { resumed, .. } => *resumed,
            DownloadError::NotPrepared
            | DownloadError::AlreadyStarted
            | DownloadError::UnsupportedHash(_)
            | DownloadError::Io { .. }
            | DownloadError::Cancelled => false,
        }
    }
}

/// Errors raised by the platform installer
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Another install pipeline is already active")]
    PipelineBusy,

    #[error("No install pipeline is active, call prepare first")]
    NoPipeline,

    #[error("Version {version} is already installed at '{path}'")]
    AlreadyInstalled { version: String, path: PathBuf },

    #[error("Installing only modules but no installation of {0} was found")]
    NotInstalled(String),

    #[error("Package '{id}' has file type '{file_type}', which this installer cannot install")]
    Unsupported { id: String, file_type: String },

    #[error("Destination '{0}' already exists")]
    DestinationExists(PathBuf),

    #[error("Failed to extract package '{id}': {source}")]
    Archive {
        id: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{context} '{path}': {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid installation marker '{path}': {message}")]
    Marker { path: PathBuf, message: String },

    #[error("Installation of '{id}' failed: {message}")]
    Failed { id: String, message: String },

    #[error("Installer task stopped unexpectedly: {0}")]
    Task(String),
}

impl InstallError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced by the queue scheduler. Each names the offending package.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Package '{id}' has not been downloaded to '{path}'")]
    MissingFile { id: String, path: PathBuf },

    #[error("Download of '{id}' failed: {source}")]
    Download {
        id: String,
        #[source]
        source: DownloadError,
    },

    #[error("Installation of '{id}' failed: {source}")]
    Install {
        id: String,
        #[source]
        source: InstallError,
    },

    #[error("Preparing the installation failed: {0}")]
    Prepare(#[source] InstallError),

    #[error("Completing the installation failed: {0}")]
    Complete(#[source] InstallError),

    #[error("Task for '{id}' stopped unexpectedly: {message}")]
    Task { id: String, message: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,
}
