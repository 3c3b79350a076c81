//! Error types that abort a generation pass or fail to build a host program.
//!
//! Most failures in the pipeline are *data*: compile errors in the generator module, load failures and
//! generator faults all become [`Diagnostic`](crate::diagnostics::Diagnostic)s. Only the errors below stop
//! a pass.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors while reading or parsing the host crate.
#[derive(Debug, Error, Diagnostic)]
pub enum HostError {
    #[error("cannot read `{path}`: {source}")]
    #[diagnostic(code(microgen::host::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse `{path}` at {line}:{column}: {message}")]
    #[diagnostic(code(microgen::host::parse))]
    Parse {
        path: PathBuf,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("`{0}` has no `src` directory")]
    #[diagnostic(code(microgen::host::layout), help("point the loader at a crate root containing `src/`"))]
    MissingSourceDir(PathBuf),
}

/// Errors that abort a whole generation pass.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    /// The marker attributes cannot be resolved, so nothing can be extracted.
    #[error("marker attribute `{marker}` cannot be resolved in the host crate")]
    #[diagnostic(
        code(microgen::config),
        help("the host program must reference `microgen_sdk`, which declares the marker attributes")
    )]
    MarkerUnresolved { marker: String },

    #[error("generation pass was cancelled")]
    #[diagnostic(code(microgen::cancelled))]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Host(#[from] HostError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
