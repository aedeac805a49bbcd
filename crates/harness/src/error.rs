//! Error types for the end-to-end harness.
//!
//! Every failure carries the full diagnostic transcript. The probe's result
//! shares a stream with telepresence's own logging, so a terse message would
//! leave nothing to debug with.

use thiserror::Error;

/// Errors that can occur while provisioning, invoking, or decoding a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The selected method cannot run in this environment. Tests should
    /// treat this as a skip, not a failure.
    #[error("method unsupported: {0}")]
    Unsupported(String),

    /// kubectl rejected a create/delete request.
    #[error("provisioning {resource} failed: {stderr}")]
    Provisioning { resource: String, stderr: String },

    /// The telepresence CLI exited non-zero.
    #[error("failure running telepresence {args:?}: exit {status}\n{output}")]
    Invocation {
        args: Vec<String>,
        status: i32,
        output: String,
    },

    /// The combined output did not contain the probe delimiter exactly twice.
    #[error(
        "expected exactly 2 occurrences of the probe delimiter, found {occurrences}; raw output:\n{output}"
    )]
    Framing { occurrences: usize, output: String },

    /// The delimited payload was not valid JSON.
    #[error("could not decode JSON probe result from:\n{segment}")]
    Decode {
        segment: String,
        #[source]
        source: serde_json::Error,
    },

    /// Spawning or reading from a child process failed.
    #[error("I/O error running {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }
}
