//! CLI error types.

use kube_wait::WaitError;
use thiserror::Error;

/// Errors that can end a kwait run.
#[derive(Debug, Error)]
pub enum CliError {
    /// The wait itself failed (resolution, timeout, transport)
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// Kubernetes client could not be created
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid command-line argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Interrupted by the user before the condition was met
    #[error("Interrupted")]
    Interrupted,
}
