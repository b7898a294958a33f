//! Error types for alignio

use crate::session::{ContractViolation, Status, StatusKind};
use thiserror::Error;

/// Result type alias for alignio operations
pub type Result<T> = std::result::Result<T, AlignError>;

/// Error types that can occur in alignio
#[derive(Debug, Error)]
pub enum AlignError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or rejected header
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Record that cannot be decoded or encoded
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Malformed index file or failed index lookup
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Container format or operation this crate does not handle
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Recoverable session status (end of records, ordering, sort violations)
    #[error(transparent)]
    Session(#[from] Status),

    /// Caller broke the session protocol
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

impl AlignError {
    /// True when the underlying I/O error carries `InvalidData`, i.e. the
    /// bytes were read but could not be decoded.
    pub fn is_decode_error(&self) -> bool {
        match self {
            AlignError::Io(e) => e.kind() == std::io::ErrorKind::InvalidData,
            AlignError::InvalidHeader(_)
            | AlignError::InvalidRecord(_)
            | AlignError::InvalidIndex(_) => true,
            _ => false,
        }
    }

    /// Session status category this error maps to: decode failures are
    /// `FailParse`, everything else reaching the stream is `FailIo`.
    pub fn status_kind(&self) -> StatusKind {
        match self {
            AlignError::Session(status) => status.kind(),
            AlignError::Contract(_) => StatusKind::FailOrder,
            _ if self.is_decode_error() => StatusKind::FailParse,
            _ => StatusKind::FailIo,
        }
    }
}

impl From<AlignError> for Status {
    fn from(err: AlignError) -> Self {
        match err {
            AlignError::Session(status) => status,
            other => Status::new(other.status_kind(), other.to_string()),
        }
    }
}
