//! Region queries and the containment check applied to every candidate
//! record.

use crate::io::bam::{Header, Record};
use std::fmt;

/// Which reference a region query targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReferenceSelector {
    /// Every record, no index filtering
    #[default]
    All,
    /// The unmapped pseudo-reference at the end of a sorted container
    Unmapped,
    /// Reference by header index
    Index(usize),
    /// Reference by name, resolved against the header on the next read
    Name(String),
}

impl ReferenceSelector {
    /// Selector for a reference name. `""` and `"*"` select
    /// [`Unmapped`](Self::Unmapped).
    pub fn name(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            "" | "*" => ReferenceSelector::Unmapped,
            _ => ReferenceSelector::Name(name),
        }
    }

    /// Collapse a `Name` into an `Index`. Returns `None` when the name is not
    /// in the header; other variants are returned unchanged.
    pub fn resolve(&self, header: &Header) -> Option<ReferenceSelector> {
        match self {
            ReferenceSelector::Name(name) => header.reference_id(name).map(ReferenceSelector::Index),
            other => Some(other.clone()),
        }
    }

    /// Reference id records must carry to match: `Some(None)` for the
    /// unmapped pseudo-reference, `None` for `All` and unresolved names.
    pub fn target(&self) -> Option<Option<usize>> {
        match self {
            ReferenceSelector::Unmapped => Some(None),
            ReferenceSelector::Index(id) => Some(Some(*id)),
            ReferenceSelector::All | ReferenceSelector::Name(_) => None,
        }
    }
}

impl From<&str> for ReferenceSelector {
    fn from(name: &str) -> Self {
        Self::name(name)
    }
}

impl From<String> for ReferenceSelector {
    fn from(name: String) -> Self {
        Self::name(name)
    }
}

impl From<usize> for ReferenceSelector {
    fn from(id: usize) -> Self {
        ReferenceSelector::Index(id)
    }
}

impl fmt::Display for ReferenceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceSelector::All => f.write_str("<all>"),
            ReferenceSelector::Unmapped => f.write_str("*"),
            ReferenceSelector::Index(id) => write!(f, "#{}", id),
            ReferenceSelector::Name(name) => f.write_str(name),
        }
    }
}

/// How a record must relate to the interval to be returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapMode {
    /// Any overlap with the interval
    #[default]
    Overlap,
    /// The whole alignment must lie inside the interval
    FullyContained,
}

/// Result of checking one record against a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionMatch {
    /// Return the record
    Accept,
    /// Drop the record and keep scanning
    Skip,
    /// No later record can match; stop
    Exhausted,
}

/// A reference plus an optional `[start, end)` interval in 0-based
/// coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionQuery {
    /// Target reference
    pub selector: ReferenceSelector,
    /// Inclusive start, open when `None`
    pub start: Option<i64>,
    /// Exclusive end, open when `None`
    pub end: Option<i64>,
    /// Containment rule
    pub mode: OverlapMode,
}

impl RegionQuery {
    /// Build a query.
    pub fn new(
        selector: impl Into<ReferenceSelector>,
        start: Option<i64>,
        end: Option<i64>,
        mode: OverlapMode,
    ) -> Self {
        Self {
            selector: selector.into(),
            start,
            end,
            mode,
        }
    }

    /// The query that matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether this query scans the whole container.
    pub fn is_all(&self) -> bool {
        self.selector == ReferenceSelector::All
    }

    /// Check one record. The selector must already be resolved.
    ///
    /// Rules, first match wins: `All` accepts; a different reference ends the
    /// scan; a start at or past `end` ends the scan; an alignment ending
    /// before `start` is skipped; in [`OverlapMode::FullyContained`] anything
    /// sticking out of the interval is skipped.
    pub fn check(&self, record: &Record) -> SectionMatch {
        if self.is_all() {
            return SectionMatch::Accept;
        }
        match self.selector.target() {
            Some(target) if target == record.reference_id => {}
            _ => return SectionMatch::Exhausted,
        }

        let record_start = record.alignment_start();
        let record_end = record.alignment_end();

        if matches!(self.end, Some(end) if record_start >= end) {
            return SectionMatch::Exhausted;
        }
        if matches!(self.start, Some(start) if record_end < start) {
            return SectionMatch::Skip;
        }
        if self.mode == OverlapMode::FullyContained {
            let starts_before = matches!(self.start, Some(start) if record_start < start);
            let ends_after = matches!(self.end, Some(end) if record_end >= end);
            if starts_before || ends_after {
                return SectionMatch::Skip;
            }
        }
        SectionMatch::Accept
    }

    /// `name:start-end` description used in messages.
    pub fn describe(&self, header: &Header) -> String {
        let reference = match &self.selector {
            ReferenceSelector::Index(id) => header.reference_label(Some(*id)).to_string(),
            other => other.to_string(),
        };
        let bound = |b: Option<i64>| b.map(|v| v.to_string()).unwrap_or_default();
        format!("{}:{}-{}", reference, bound(self.start), bound(self.end))
    }
}
