/// Metrics
mod metrics;
pub use metrics::*;

pub mod config;
pub mod telemetry;

pub mod controller;
pub use crate::controller::*;

mod gopass_repository_crd;
pub use gopass_repository_crd::{
    GopassRepository, GopassRepositorySpec, GopassRepositoryStatus, SecretKeyRef,
};

pub mod finalizer;

mod deployment;
pub use deployment::{
    build_deployment, dependent_labels, owner_of, select_single, ServerTemplate, REPO_NAME_LABEL,
};

mod service;
pub use service::build_service;

pub mod cluster;
pub use cluster::{ClusterOps, KubeCluster, RepositoryRef};

pub mod client;
pub use client::{GrpcConnector, RepositoryClient, RepositoryConnector};

pub mod credentials;
pub use credentials::{CredentialProvider, GpgKeyring, KubeCredentialProvider, Keyring};

mod repository;
pub use repository::{GitCredentials, PullOutcome, Repository};

mod password_store;
pub use password_store::GopassStore;

pub mod sync;
pub use sync::{PasswordEntry, SyncEngine};

mod secret;
pub use secret::{sanitize, KubeSecretStore, SecretPublisher, SecretStore, SecretTarget};

pub mod server;
pub use server::RepositoryServer;

#[cfg(test)]
mod test_support;

pub mod proto {
    tonic::include_proto!("gopass_repository");

    pub use self::repository_service_client::RepositoryServiceClient as Client;
    pub use self::repository_service_server::{
        RepositoryService as Service, RepositoryServiceServer as Server,
    };
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    /// A cluster object or a registry entry that was looked up does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("unable to find key '{key}' in secret '{secret}' in namespace '{namespace}'")]
    KeyNotFound {
        key: String,
        secret: String,
        namespace: String,
    },

    /// More than one dependent object matched a label query. Never repaired automatically.
    #[error("expected at most 1 {kind}, found: {count}")]
    TooMany { kind: &'static str, count: usize },

    #[error("Transport Error: {0}")]
    TransportError(#[source] tonic::transport::Error),

    #[error("Rpc Error: {0}")]
    RpcError(#[source] tonic::Status),

    #[error("{operation} not successful: {message}")]
    OperationFailed {
        operation: &'static str,
        message: String,
    },

    #[error("unable to import gpg key: {0}")]
    KeyImportFailed(String),

    #[error("unable to decrypt password '{name}': {message}")]
    DecryptionFailed { name: String, message: String },

    #[error("Git Error: {0}")]
    GitError(#[source] git2::Error),

    #[error("IO Error: {0}")]
    IoError(#[source] std::io::Error),

    #[error("Blocking task failed: {0}")]
    JoinError(#[source] tokio::task::JoinError),

    #[error("Invalid refresh interval '{value}': {source}")]
    InvalidInterval {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Invalid GopassRepository CRD: {0}")]
    UserInputError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn metric_label(&self) -> String {
        let label = match self {
            Error::KubeError(_) => "kube",
            Error::NotFound(_) => "not_found",
            Error::KeyNotFound { .. } => "key_not_found",
            Error::TooMany { .. } => "too_many",
            Error::TransportError(_) | Error::RpcError(_) => "transport",
            Error::OperationFailed { .. } => "operation_failed",
            Error::KeyImportFailed(_) | Error::DecryptionFailed { .. } => "external_tool",
            Error::GitError(_) => "git",
            Error::IoError(_) | Error::JoinError(_) => "io",
            Error::InvalidInterval { .. }
            | Error::UserInputError(_)
            | Error::InvalidRequest(_) => "user_input",
        };
        label.to_string()
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        Error::KubeError(error)
    }
}

impl From<git2::Error> for Error {
    fn from(error: git2::Error) -> Self {
        Error::GitError(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IoError(error)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Error::JoinError(error)
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::RpcError(status)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
