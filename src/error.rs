//! Error kinds shared by every pipeline stage.
//!
//! Stages are best-effort: record-level failures are emitted over the error
//! bus and the stage keeps going, so one malformed line never terminates a
//! run. The CLI consumer collects everything and turns "at least one error
//! observed" into a non-zero exit.

use thiserror::Error;

/// Errors emitted by pipeline stages over the error bus.
#[derive(Debug, Error)]
pub enum Error {
    /// Read, write, open or seek failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON document, malformed integer in a mapped line, or a
    /// binary record that does not decode. Carries the offending input so a
    /// failed record can be found in the source file.
    #[error("parse error: {reason}: {input:?}")]
    Parse { input: String, reason: String },

    /// A line reached the final mapping pass without the mapped sentinel,
    /// meaning the identifier never appeared in the vertex stream.
    #[error("unresolved identifier: {0:?}")]
    UnresolvedIdentifier(String),

    /// The edge map record stream and the edge document stream disagree in
    /// length.
    #[error("edge map out of step with edge documents: {0}")]
    StreamMismatch(String),

    /// A document is missing an attribute the pipeline depends on.
    #[error("document missing {0:?} attribute")]
    Schema(&'static str),
}

impl Error {
    pub(crate) fn parse(input: &[u8], reason: impl std::fmt::Display) -> Self {
        Error::Parse {
            input: String::from_utf8_lossy(input).into_owned(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
