//! Session status codes and protocol errors.

use std::fmt;
use thiserror::Error;

/// Outcome category of the last session operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusKind {
    /// The operation succeeded
    #[default]
    Success,
    /// No further records are available (end of file or end of region)
    NoMoreRecords,
    /// Opening, reading or writing the underlying stream failed
    FailIo,
    /// The operation is not valid in the current session state
    FailOrder,
    /// The data, header or index could not be interpreted
    FailParse,
    /// A record violates the configured sort order
    InvalidSort,
}

impl StatusKind {
    /// Short name used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Success => "SUCCESS",
            StatusKind::NoMoreRecords => "NO_MORE_RECS",
            StatusKind::FailIo => "FAIL_IO",
            StatusKind::FailOrder => "FAIL_ORDER",
            StatusKind::FailParse => "FAIL_PARSE",
            StatusKind::InvalidSort => "INVALID_SORT",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status attached to a session after every operation.
///
/// Failing operations return the same value as their error, so callers can
/// either match on the `Result` or inspect
/// [`AlignmentSession::status`](super::AlignmentSession::status) afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("{kind}: {message}")]
pub struct Status {
    kind: StatusKind,
    message: String,
}

impl Status {
    /// Successful status with no message.
    pub fn success() -> Self {
        Self::default()
    }

    /// Status of the given kind.
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Status category.
    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for [`StatusKind::Success`].
    pub fn is_success(&self) -> bool {
        self.kind == StatusKind::Success
    }
}

/// Misuse of the read protocol that no status can recover from.
///
/// Only [`AlignmentSession::read_record`](super::AlignmentSession::read_record)
/// produces these; they indicate a bug in the caller rather than bad data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// `read_record` called while the session is not open for reading
    #[error("cannot read a record: the session is not open for reading")]
    NotOpenForRead,

    /// `read_record` called before the header was read
    #[error("cannot read a record before the header has been read")]
    HeaderNotRead,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_success() {
        let status = Status::default();
        assert!(status.is_success());
        assert_eq!(status, Status::success());
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let status = Status::new(StatusKind::FailOrder, "header already read");
        assert_eq!(status.to_string(), "FAIL_ORDER: header already read");
        assert!(!status.is_success());
    }

    #[test]
    fn test_contract_violation_is_not_a_status() {
        let err: crate::AlignError = ContractViolation::HeaderNotRead.into();
        assert!(matches!(err, crate::AlignError::Contract(_)));
    }
}
