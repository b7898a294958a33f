//! Flag-based record admission.

use crate::io::bam::Record;

/// Required and excluded FLAG bits.
///
/// A record passes when it has every required bit and none of the excluded
/// ones. The default filter admits everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagFilter {
    /// Bits that must all be set
    pub required: u16,
    /// Bits that must all be clear
    pub excluded: u16,
}

impl FlagFilter {
    /// Create a filter.
    pub fn new(required: u16, excluded: u16) -> Self {
        Self { required, excluded }
    }

    /// Check raw FLAG bits.
    pub fn admits_flags(&self, flags: u16) -> bool {
        flags & self.required == self.required && flags & self.excluded == 0
    }

    /// Check a record.
    pub fn admits(&self, record: &Record) -> bool {
        self.admits_flags(record.flags)
    }
}
