//! CIGAR operations in their binary (BAM) and text (SAM) forms.
//!
//! In BAM each operation is a little-endian u32: the low 4 bits hold the
//! operation code (0-8, in `MIDNSHP=X` order) and the high 28 bits hold the
//! length. In SAM the same list is written as `<len><op>` pairs, or `*` when
//! empty.

use super::error::BamDecodeError;
use std::fmt;
use std::io;

/// Operation characters indexed by BAM operation code.
const OP_CHARS: &[u8; 9] = b"MIDNSHP=X";

/// A single CIGAR operation with its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// Match or mismatch (M)
    Match(u32),
    /// Insertion to reference (I)
    Insertion(u32),
    /// Deletion from reference (D)
    Deletion(u32),
    /// Skipped region from reference (N)
    RefSkip(u32),
    /// Soft clipping (S)
    SoftClip(u32),
    /// Hard clipping (H)
    HardClip(u32),
    /// Padding (P)
    Padding(u32),
    /// Sequence match (=)
    SeqMatch(u32),
    /// Sequence mismatch (X)
    SeqMismatch(u32),
}

impl CigarOp {
    /// Build an operation from its BAM code.
    pub fn from_code(code: u32, length: u32) -> Option<Self> {
        let op = match code {
            0 => CigarOp::Match(length),
            1 => CigarOp::Insertion(length),
            2 => CigarOp::Deletion(length),
            3 => CigarOp::RefSkip(length),
            4 => CigarOp::SoftClip(length),
            5 => CigarOp::HardClip(length),
            6 => CigarOp::Padding(length),
            7 => CigarOp::SeqMatch(length),
            8 => CigarOp::SeqMismatch(length),
            _ => return None,
        };
        Some(op)
    }

    /// Build an operation from its SAM character.
    pub fn from_char(c: u8, length: u32) -> Option<Self> {
        let code = OP_CHARS.iter().position(|&op| op == c)?;
        Self::from_code(code as u32, length)
    }

    /// BAM operation code.
    pub fn code(&self) -> u32 {
        match self {
            CigarOp::Match(_) => 0,
            CigarOp::Insertion(_) => 1,
            CigarOp::Deletion(_) => 2,
            CigarOp::RefSkip(_) => 3,
            CigarOp::SoftClip(_) => 4,
            CigarOp::HardClip(_) => 5,
            CigarOp::Padding(_) => 6,
            CigarOp::SeqMatch(_) => 7,
            CigarOp::SeqMismatch(_) => 8,
        }
    }

    /// Operation length.
    pub fn length(&self) -> u32 {
        match *self {
            CigarOp::Match(len)
            | CigarOp::Insertion(len)
            | CigarOp::Deletion(len)
            | CigarOp::RefSkip(len)
            | CigarOp::SoftClip(len)
            | CigarOp::HardClip(len)
            | CigarOp::Padding(len)
            | CigarOp::SeqMatch(len)
            | CigarOp::SeqMismatch(len) => len,
        }
    }

    /// SAM character for this operation.
    pub fn as_char(&self) -> char {
        OP_CHARS[self.code() as usize] as char
    }

    /// True for operations that advance along the reference (M, D, N, =, X).
    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Deletion(_)
                | CigarOp::RefSkip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// True for operations that advance along the read (M, I, S, =, X).
    pub fn consumes_query(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Insertion(_)
                | CigarOp::SoftClip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    /// True for operations that place a read base on a reference base.
    pub fn is_aligned(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_) | CigarOp::SeqMatch(_) | CigarOp::SeqMismatch(_)
        )
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.length(), self.as_char())
    }
}

/// Number of reference bases spanned by an alignment.
pub fn reference_length(cigar: &[CigarOp]) -> u64 {
    cigar
        .iter()
        .filter(|op| op.consumes_reference())
        .map(|op| op.length() as u64)
        .sum()
}

/// Number of read bases described by an alignment.
pub fn query_length(cigar: &[CigarOp]) -> u64 {
    cigar
        .iter()
        .filter(|op| op.consumes_query())
        .map(|op| op.length() as u64)
        .sum()
}

/// Parse BAM CIGAR operations (4 bytes each).
pub fn parse_cigar(data: &[u8], n_ops: usize) -> io::Result<Vec<CigarOp>> {
    let required_bytes = n_ops * 4;
    if data.len() < required_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Insufficient CIGAR data: need {} bytes for {} operations, got {}",
                required_bytes,
                n_ops,
                data.len()
            ),
        ));
    }

    data[..required_bytes]
        .chunks_exact(4)
        .map(|raw| {
            let value = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            CigarOp::from_code(value & 0x0F, value >> 4)
                .ok_or_else(|| io::Error::from(BamDecodeError::InvalidCigarOp { value: value & 0x0F }))
        })
        .collect()
}

/// Append the BAM encoding of `cigar` to `buf`.
pub fn encode_cigar(cigar: &[CigarOp], buf: &mut Vec<u8>) {
    for op in cigar {
        buf.extend_from_slice(&((op.length() << 4) | op.code()).to_le_bytes());
    }
}

/// Parse a SAM CIGAR string such as `10S40M2I48M`. `*` is the empty CIGAR.
pub fn parse_cigar_string(s: &str) -> io::Result<Vec<CigarOp>> {
    if s == "*" {
        return Ok(Vec::new());
    }

    let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);
    let mut ops = Vec::new();
    let mut length: Option<u32> = None;

    for &b in s.as_bytes() {
        if b.is_ascii_digit() {
            let digit = (b - b'0') as u32;
            let next = length
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .filter(|&v| v < (1 << 28))
                .ok_or_else(|| invalid(format!("CIGAR length overflow in '{}'", s)))?;
            length = Some(next);
        } else {
            let len = length
                .take()
                .ok_or_else(|| invalid(format!("CIGAR operation without length in '{}'", s)))?;
            let op = CigarOp::from_char(b, len).ok_or_else(|| {
                invalid(format!("Invalid CIGAR operation '{}' in '{}'", b as char, s))
            })?;
            ops.push(op);
        }
    }

    if length.is_some() {
        return Err(invalid(format!("Trailing CIGAR length without operation in '{}'", s)));
    }
    Ok(ops)
}

/// Render `cigar` as SAM text (`*` when empty).
pub fn format_cigar(cigar: &[CigarOp]) -> String {
    if cigar.is_empty() {
        return "*".to_string();
    }
    cigar.iter().map(|op| op.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_single_match() {
        // 100M = 100 << 4 | 0 = 0x00000640
        let data = vec![0x40, 0x06, 0x00, 0x00];
        let cigar = parse_cigar(&data, 1).unwrap();
        assert_eq!(cigar, vec![CigarOp::Match(100)]);
    }

    #[test]
    fn test_parse_all_operations() {
        let data: Vec<u8> = (0u8..9).flat_map(|code| [0x10 | code, 0, 0, 0]).collect();
        let cigar = parse_cigar(&data, 9).unwrap();
        assert_eq!(format_cigar(&cigar), "1M1I1D1N1S1H1P1=1X");
    }

    #[test]
    fn test_invalid_operation_code() {
        let data = vec![0x19, 0x00, 0x00, 0x00];
        assert!(parse_cigar(&data, 1).is_err());
        assert!(parse_cigar(&[0x10, 0x00], 1).is_err());
    }

    #[test]
    fn test_reference_length() {
        let cigar = parse_cigar_string("5S10M2I3D4N6=1X7H").unwrap();
        // M + D + N + = + X
        assert_eq!(reference_length(&cigar), 10 + 3 + 4 + 6 + 1);
        // S + M + I + = + X
        assert_eq!(query_length(&cigar), 5 + 10 + 2 + 6 + 1);
    }

    #[test]
    fn test_parse_cigar_string() {
        assert_eq!(parse_cigar_string("*").unwrap(), vec![]);
        assert_eq!(
            parse_cigar_string("50M5I45M").unwrap(),
            vec![CigarOp::Match(50), CigarOp::Insertion(5), CigarOp::Match(45)]
        );
        assert!(parse_cigar_string("M").is_err());
        assert!(parse_cigar_string("10").is_err());
        assert!(parse_cigar_string("10Q").is_err());
    }

    fn arb_op() -> impl Strategy<Value = CigarOp> {
        (0u32..=8, 1u32..100_000).prop_map(|(code, len)| CigarOp::from_code(code, len).unwrap())
    }

    proptest! {
        #[test]
        fn prop_binary_and_text_forms_agree(ops in prop::collection::vec(arb_op(), 0..12)) {
            let mut encoded = Vec::new();
            encode_cigar(&ops, &mut encoded);
            let decoded = parse_cigar(&encoded, ops.len()).unwrap();
            let text = format_cigar(&decoded);
            prop_assert_eq!(parse_cigar_string(&text).unwrap(), ops);
        }

        #[test]
        fn prop_reference_length_ignores_insertions(ops in prop::collection::vec(arb_op(), 0..12), extra in 1u32..500) {
            let mut with_insertion = ops.clone();
            with_insertion.push(CigarOp::Insertion(extra));
            with_insertion.push(CigarOp::SoftClip(extra));
            prop_assert_eq!(reference_length(&ops), reference_length(&with_insertion));
        }
    }
}
