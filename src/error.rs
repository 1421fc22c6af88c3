use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("invalid reference format: {reason}")]
    #[diagnostic(code(digestpin::invalid_reference))]
    InvalidReference {
        reason: String,
        #[source_code]
        src: NamedSource,
        #[label("here")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(code(digestpin::submission))]
    Submission(#[from] SubmissionError),

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(digestpin::config))]
    Config(String),
}

/// Failure to look up an image on a registry.
///
/// The resolver never surfaces these to the caller of a service creation,
/// they end up inside a fallback resolution instead.
#[derive(Error, Debug)]
pub enum InspectionError {
    #[error("registry request failed: {0}")]
    Registry(#[from] dkregistry::errors::Error),

    #[error("request to daemon failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("daemon returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode inspection response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("error during connect: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Error response from daemon: {message}")]
    Daemon { status: u16, message: String },

    #[error("could not decode service create response: {0}")]
    Decode(#[from] serde_json::Error),
}
