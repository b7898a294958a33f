//! Streaming sort-order validation.
//!
//! The validator remembers just enough of the previous record to decide
//! whether the next one keeps the declared order. It performs no I/O.

use crate::io::bam::{Header, Record};
use std::cmp::Ordering;
use thiserror::Error;

/// Order records are expected to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPolicy {
    /// Use the `@HD SO:` value of the header, resolved at the first check
    FromHeader,
    /// No validation
    #[default]
    Unsorted,
    /// By reference index then leftmost position, unmapped reads last
    Coordinate,
    /// By read name
    QueryName,
}

impl SortPolicy {
    /// Policy declared by a header; `Unsorted` when absent or unrecognised.
    pub fn from_header(header: &Header) -> SortPolicy {
        match header.sort_order() {
            Some("coordinate") => SortPolicy::Coordinate,
            Some("queryname") => SortPolicy::QueryName,
            _ => SortPolicy::Unsorted,
        }
    }
}

/// A record that breaks the expected order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SortViolation(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Memory {
    Empty,
    Coordinate { reference: Option<usize>, position: i64 },
    QueryName(String),
}

/// Checks each record against the one before it.
#[derive(Debug, Clone)]
pub struct SortValidator {
    policy: SortPolicy,
    memory: Memory,
}

impl SortValidator {
    /// Create a validator. `FromHeader` is resolved at the first check.
    pub fn new(policy: SortPolicy) -> Self {
        Self {
            policy,
            memory: Memory::Empty,
        }
    }

    /// Current policy (still `FromHeader` until the first check).
    pub fn policy(&self) -> SortPolicy {
        self.policy
    }

    /// Change the policy and forget the previous record.
    pub fn set_policy(&mut self, policy: SortPolicy) {
        self.policy = policy;
        self.reset();
    }

    /// Forget the previous record.
    pub fn reset(&mut self) {
        self.memory = Memory::Empty;
    }

    /// Validate `record`, the `record_number`-th record of the stream
    /// (used in messages only). On violation the memory is left unchanged.
    pub fn check(
        &mut self,
        header: &Header,
        record: &Record,
        record_number: u64,
    ) -> Result<(), SortViolation> {
        if self.policy == SortPolicy::FromHeader {
            self.policy = SortPolicy::from_header(header);
            log::debug!("Sort order resolved from header: {:?}", self.policy);
        }
        match self.policy {
            SortPolicy::FromHeader | SortPolicy::Unsorted => Ok(()),
            SortPolicy::Coordinate => self.check_coordinate(header, record, record_number),
            SortPolicy::QueryName => self.check_query_name(record, record_number),
        }
    }

    fn check_coordinate(
        &mut self,
        header: &Header,
        record: &Record,
        record_number: u64,
    ) -> Result<(), SortViolation> {
        let reference = record.reference_id;
        let position = record.alignment_start();
        let label = |r: Option<usize>, p: i64| format!("{}:{}", header.reference_label(r), p);

        if let Memory::Coordinate {
            reference: prev_ref,
            position: prev_pos,
        } = self.memory
        {
            // Unmapped pseudo-reference sorts after every real reference
            let out_of_order = match (prev_ref, reference) {
                (_, None) => false,
                (None, Some(_)) => {
                    return Err(SortViolation(format!(
                        "File is not coordinate sorted at record {}\n\tPrevious record was unmapped, but this record is {}",
                        record_number,
                        label(reference, position)
                    )));
                }
                (Some(prev), Some(cur)) => cur < prev || (cur == prev && position < prev_pos),
            };
            if out_of_order {
                return Err(SortViolation(format!(
                    "File is not coordinate sorted at record {}\n\tPrevious record was {}, but this record is {}",
                    record_number,
                    label(prev_ref, prev_pos),
                    label(reference, position)
                )));
            }
        }

        self.memory = Memory::Coordinate {
            reference,
            position,
        };
        Ok(())
    }

    fn check_query_name(&mut self, record: &Record, record_number: u64) -> Result<(), SortViolation> {
        if let Memory::QueryName(prev) = &self.memory {
            let natural = natural_cmp(prev, &record.name);
            let bytewise = prev.as_bytes().cmp(record.name.as_bytes());
            if natural == Ordering::Greater && bytewise == Ordering::Greater {
                return Err(SortViolation(format!(
                    "File is not sorted by read name at record {}\n\tPrevious record was {}, but this record is {}",
                    record_number, prev, record.name
                )));
            }
        }
        self.memory = Memory::QueryName(record.name.clone());
        Ok(())
    }
}

impl Default for SortValidator {
    fn default() -> Self {
        Self::new(SortPolicy::default())
    }
}

/// Compare strings so that runs of ASCII digits order by numeric value:
/// `read2 < read10`.
///
/// Runs of equal value but different width (`07` vs `7`) fall back to the
/// shorter run first.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let a_end = i + a[i..].iter().take_while(|c| c.is_ascii_digit()).count();
            let b_end = j + b[j..].iter().take_while(|c| c.is_ascii_digit()).count();
            let ord = compare_digit_runs(&a[i..a_end], &b[j..b_end]);
            if ord != Ordering::Equal {
                return ord;
            }
            i = a_end;
            j = b_end;
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let strip = |run: &[u8]| -> usize { run.iter().take_while(|&&c| c == b'0').count() };
    let a_sig = &a[strip(a)..];
    let b_sig = &b[strip(b)..];
    a_sig
        .len()
        .cmp(&b_sig.len())
        .then_with(|| a_sig.cmp(b_sig))
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header(sort_order: &str) -> Header {
        let text = format!(
            "@HD\tVN:1.6\tSO:{}\n@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:1000\n",
            sort_order
        );
        Header::from_sam_text(text).unwrap()
    }

    fn placed(reference_id: Option<usize>, pos: Option<i32>) -> Record {
        let mut record = Record::new();
        record.reference_id = reference_id;
        record.position = pos;
        record
    }

    fn named(name: &str) -> Record {
        let mut record = Record::new();
        record.name = name.to_string();
        record
    }

    #[test]
    fn test_policy_from_header() {
        assert_eq!(SortPolicy::from_header(&header("coordinate")), SortPolicy::Coordinate);
        assert_eq!(SortPolicy::from_header(&header("queryname")), SortPolicy::QueryName);
        assert_eq!(SortPolicy::from_header(&header("unknown")), SortPolicy::Unsorted);
        assert_eq!(SortPolicy::from_header(&Header::default()), SortPolicy::Unsorted);

        assert_eq!(SortValidator::default().policy(), SortPolicy::Unsorted);

        let mut validator = SortValidator::new(SortPolicy::FromHeader);
        validator.check(&header("coordinate"), &placed(Some(0), Some(1)), 1).unwrap();
        assert_eq!(validator.policy(), SortPolicy::Coordinate);
    }

    #[test]
    fn test_coordinate_order() {
        let h = header("coordinate");
        let mut v = SortValidator::new(SortPolicy::Coordinate);
        v.check(&h, &placed(Some(0), Some(200)), 1).unwrap();
        v.check(&h, &placed(Some(0), Some(200)), 2).unwrap();
        let err = v.check(&h, &placed(Some(0), Some(100)), 3).unwrap_err();
        assert_eq!(
            err.0,
            "File is not coordinate sorted at record 3\n\tPrevious record was chr1:200, but this record is chr1:100"
        );
        // memory untouched by the violation
        v.check(&h, &placed(Some(0), Some(250)), 4).unwrap();
        // new reference resets the position constraint
        v.check(&h, &placed(Some(1), Some(5)), 5).unwrap();
        assert!(v.check(&h, &placed(Some(0), Some(900)), 6).is_err());
    }

    #[test]
    fn test_unmapped_must_be_last() {
        let h = header("coordinate");
        let mut v = SortValidator::new(SortPolicy::Coordinate);
        v.check(&h, &placed(Some(1), Some(10)), 1).unwrap();
        v.check(&h, &placed(None, None), 2).unwrap();
        v.check(&h, &placed(None, None), 3).unwrap();
        let err = v.check(&h, &placed(Some(0), Some(0)), 4).unwrap_err();
        assert!(err.0.contains("Previous record was unmapped, but this record is chr1:0"));
    }

    #[test]
    fn test_query_name_accepts_either_convention() {
        let h = Header::default();
        let mut v = SortValidator::new(SortPolicy::QueryName);
        // natural order only
        v.check(&h, &named("read2"), 1).unwrap();
        v.check(&h, &named("read10"), 2).unwrap();
        // byte order only: "read10" < "read1_x" bytewise, natural says 10 > 1
        v.check(&h, &named("read1_x"), 3).unwrap();

        let err = v.check(&h, &named("read0"), 4).unwrap_err();
        assert!(err.0.contains("Previous record was read1_x, but this record is read0"));
    }

    #[test]
    fn test_set_policy_resets_memory() {
        let h = Header::default();
        let mut v = SortValidator::new(SortPolicy::QueryName);
        v.check(&h, &named("b"), 1).unwrap();
        v.set_policy(SortPolicy::QueryName);
        v.check(&h, &named("a"), 2).unwrap();

        v.set_policy(SortPolicy::Unsorted);
        v.check(&h, &named("z"), 3).unwrap();
        v.check(&h, &named("a"), 4).unwrap();
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("read2", "read10"), Ordering::Less);
        assert_eq!(natural_cmp("read10", "read10"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
        assert_eq!(natural_cmp("x007", "x7"), Ordering::Greater);
        assert_eq!(natural_cmp("r1:5", "r1:40"), Ordering::Less);
    }

    proptest! {
        #[test]
        fn prop_natural_cmp_is_antisymmetric(a in "[a-c0-9]{0,8}", b in "[a-c0-9]{0,8}") {
            prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        }

        #[test]
        fn prop_sorted_coordinates_are_accepted(
            mut positions in prop::collection::vec((0usize..3, 0i32..10_000), 1..50),
            unmapped in 0usize..5,
        ) {
            positions.sort();
            let h = header("coordinate");
            let mut v = SortValidator::new(SortPolicy::Coordinate);
            let mut n = 0;
            for (reference, pos) in positions {
                n += 1;
                prop_assert!(v.check(&h, &placed(Some(reference), Some(pos)), n).is_ok());
            }
            for _ in 0..unmapped {
                n += 1;
                prop_assert!(v.check(&h, &placed(None, None), n).is_ok());
            }
        }

        #[test]
        fn prop_names_sorted_bytewise_are_accepted(mut names in prop::collection::vec("[A-Za-z0-9_:]{1,12}", 1..40)) {
            names.sort();
            let h = Header::default();
            let mut v = SortValidator::new(SortPolicy::QueryName);
            for (i, name) in names.iter().enumerate() {
                prop_assert!(v.check(&h, &named(name), i as u64 + 1).is_ok());
            }
        }
    }
}
