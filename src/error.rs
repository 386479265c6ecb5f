//! Errors for reading SAM/BAM files and loading them into a database.

use std::io;

use thiserror::Error;

/// Result type alias for `bamdb` operations.
pub type Result<T> = std::result::Result<T, BamDbError>;

/// Error type for `bamdb` operations.
///
/// Every variant is fatal for a conversion run.
/// Malformed tag blocks are not errors; see [`crate::tags`].
#[derive(Error, Debug)]
pub enum BamDbError {
    /// The input or output file could not be opened.
    #[error("Unable to open file {path}: {source}")]
    Open {
        /// Name of the file.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The SAM/BAM header is missing or unreadable.
    #[error("Unable to read the header from {source_name}: {reason}")]
    Header {
        /// Name of the input.
        source_name: String,
        /// Explanation of the problem.
        reason: String,
    },

    /// The input ended in the middle of a record.
    #[error("Attempting to process truncated file: {0}")]
    Truncated(String),

    /// A record is internally inconsistent.
    #[error("Invalid BAM record: {0}")]
    InvalidRecord(String),

    /// Any other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Database open, schema, prepare, or insert failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid command line arguments.
    #[error("{0}")]
    Usage(String),

    /// Unrecognized output mode.
    #[error("Invalid output format {0}")]
    InvalidMode(String),

    /// An operation was called in the wrong state.
    #[error("Invalid operation: {0}")]
    InvalidState(String),
}

impl BamDbError {
    /// Returns `true` if the error signals a truncated input stream.
    pub fn is_truncated(&self) -> bool {
        matches!(self, BamDbError::Truncated(_))
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let error = BamDbError::Header { source_name: String::from("sample.bam"), reason: String::from("bad magic") };
        let msg = error.to_string();
        assert!(msg.contains("sample.bam"), "Missing file name in {}", msg);
        assert!(msg.contains("bad magic"), "Missing reason in {}", msg);

        let error = BamDbError::InvalidMode(String::from("csv"));
        assert_eq!(error.to_string(), "Invalid output format csv");

        let error = BamDbError::Usage(String::from("Unrecognized option: 'x'"));
        assert_eq!(error.to_string(), "Unrecognized option: 'x'");
    }

    #[test]
    fn truncation() {
        assert!(BamDbError::Truncated(String::from("record 3")).is_truncated());
        assert!(!BamDbError::InvalidRecord(String::from("record 3")).is_truncated());
        let io_error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(!BamDbError::from(io_error).is_truncated());
    }
}

//-----------------------------------------------------------------------------
