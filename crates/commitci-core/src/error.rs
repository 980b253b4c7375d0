//! Error types for commitci.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing required parameter (unknown slave, missing endpoint).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The job-scheduling system rejected a create/trigger request.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    /// The remote build service could not be reached.
    #[error("build service unavailable: {0}")]
    BuildServiceUnavailable(String),

    /// Branch checkout or tracking setup failed.
    #[error("checkout error: {0}")]
    Checkout(String),

    /// The remote build service refused a submission (e.g. malformed target).
    #[error("build submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Name of the error class for the classified kinds, `None` otherwise.
    pub fn class(&self) -> Option<&'static str> {
        match self {
            Error::Configuration(_) => Some("ConfigurationError"),
            Error::Scheduling(_) => Some("SchedulingError"),
            Error::BuildServiceUnavailable(_) => Some("BuildServiceUnavailable"),
            Error::Checkout(_) => Some("CheckoutError"),
            _ => None,
        }
    }

    /// The specific cause, without the class prefix the `Display` impl adds.
    pub fn message(&self) -> String {
        match self {
            Error::Configuration(msg)
            | Error::Scheduling(msg)
            | Error::BuildServiceUnavailable(msg)
            | Error::Checkout(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
