//! Structured BAM decoding errors.
//!
//! Codec functions return `io::Result`; a `BamDecodeError` travels inside an
//! `io::Error` of kind `InvalidData`, so the session maps it to a parse
//! failure while callers can still downcast for the exact cause.

use std::{error, fmt, io};

/// A malformed BAM record, tag block or CIGAR.
#[derive(Debug)]
#[allow(missing_docs)] // field names are self-describing
pub enum BamDecodeError {
    /// Reference id other than -1 or a non-negative index.
    InvalidReferenceId { value: i32, field: String },
    /// `l_read_name` of zero (the name always carries its NUL).
    InvalidReadNameLength { length: u8, offset: usize },
    /// C string running off the end of the record.
    MissingNulTerminator { field: String, offset: usize },
    /// Read name that is not UTF-8.
    InvalidUtf8 {
        field: String,
        source: std::string::FromUtf8Error,
    },
    /// Tag type code outside `AcCsSiIfZHB`.
    InvalidTagType { tag: [u8; 2], type_code: u8 },
    /// `B` array element type outside `cCsSiIf`.
    InvalidArraySubtype { subtype: u8 },
    /// More CIGAR operations than `n_cigar_op` can hold.
    CigarCountOverflow { count: usize },
    /// CIGAR operation code above 8.
    InvalidCigarOp { value: u32 },
    /// `l_seq` below zero.
    NegativeSequenceLength { length: i32 },
    /// Record shorter than its own fields claim.
    UnexpectedEof {
        context: String,
        expected: usize,
        actual: usize,
    },
    /// Anything else, described in prose.
    InvalidData { message: String },
}

impl error::Error for BamDecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidUtf8 { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for BamDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidReferenceId { value, field } => {
                write!(f, "{} reference id {} is neither -1 nor an index", field, value)
            }
            Self::InvalidReadNameLength { length, offset } => {
                write!(f, "read name length {} at byte {}", length, offset)
            }
            Self::MissingNulTerminator { field, offset } => {
                write!(f, "{} starting at byte {} is not NUL-terminated", field, offset)
            }
            Self::InvalidUtf8 { field, source } => write!(f, "{} is not UTF-8: {}", field, source),
            Self::InvalidTagType { tag, type_code } => write!(
                f,
                "tag {}{} has unknown type {:?}",
                tag[0] as char, tag[1] as char, *type_code as char
            ),
            Self::InvalidArraySubtype { subtype } => {
                write!(f, "unknown B-array element type {:?}", *subtype as char)
            }
            Self::CigarCountOverflow { count } => {
                write!(f, "{} CIGAR operations do not fit in 16 bits", count)
            }
            Self::InvalidCigarOp { value } => write!(f, "unknown CIGAR operation code {}", value),
            Self::NegativeSequenceLength { length } => write!(f, "sequence length {}", length),
            Self::UnexpectedEof {
                context,
                expected,
                actual,
            } => write!(
                f,
                "truncated {}: needed {} bytes, {} left",
                context, expected, actual
            ),
            Self::InvalidData { message } => f.write_str(message),
        }
    }
}

impl From<BamDecodeError> for io::Error {
    fn from(e: BamDecodeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_invalid_data() {
        let err: io::Error = BamDecodeError::NegativeSequenceLength { length: -3 }.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("-3"));

        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<BamDecodeError>())
            .unwrap();
        assert!(matches!(inner, BamDecodeError::NegativeSequenceLength { .. }));
    }

    #[test]
    fn test_tag_type_message() {
        let err = BamDecodeError::InvalidTagType {
            tag: *b"XY",
            type_code: b'q',
        };
        assert_eq!(err.to_string(), "tag XY has unknown type 'q'");
    }
}
