//! Error types for the DDDG build.
//!
//! All build errors are fatal: the builder is a batch operation and partial
//! graphs are never returned. [`BuildError`] wraps the failure cause with the
//! trace byte offset of the line that triggered it, so a bad trace can be
//! inspected directly with `zcat | head -c`.

use thiserror::Error;

/// The cause of a build failure, without positional context.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A vector value was not a well-formed hex string.
    #[error("malformed hex value: {reason}")]
    MalformedHex { reason: String },

    /// A trace line did not have the field count its tag requires.
    #[error("malformed {tag} line: {reason}")]
    MalformedLine {
        /// Which record kind was being parsed.
        tag: &'static str,
        reason: String,
    },

    /// A DMA operation accumulated a parameter count that matches no known
    /// interface version.
    #[error("unknown DMA interface version: expected 4 or 5 parameters, found {found}")]
    MalformedDmaOp { found: usize },

    /// The trace violated a sanity bound and cannot be trusted.
    #[error("corrupt trace: {reason}")]
    CorruptTrace { reason: String },

    /// A record arrived in a state that cannot accept it.
    #[error("unexpected state: {reason}")]
    UnexpectedState { reason: String },

    /// The underlying trace reader failed.
    #[error("trace read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A fatal build error, positioned at the trace byte offset of the failing
/// line.
#[derive(Debug, Error)]
#[error("DDDG build failed at trace byte offset {offset}: {kind}")]
pub struct BuildError {
    /// Byte offset just past the line that failed to parse.
    pub offset: u64,
    /// What went wrong.
    pub kind: ErrorKind,
}

impl BuildError {
    /// Attach a trace offset to an error cause.
    pub fn new(offset: u64, kind: ErrorKind) -> Self {
        Self { offset, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_offset() {
        let err = BuildError::new(
            128,
            ErrorKind::MalformedDmaOp { found: 7 },
        );
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("found 7"));
    }
}
