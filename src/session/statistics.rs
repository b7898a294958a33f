//! Counters over accepted records.

use crate::io::bam::Record;
use std::fmt;

/// Running totals over the records a session accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignmentStatistics {
    /// Records seen
    pub total: u64,
    /// Records without the unmapped flag
    pub mapped: u64,
    /// Records with the unmapped flag
    pub unmapped: u64,
    /// Paired reads
    pub paired: u64,
    /// Reads in a proper pair
    pub proper_pairs: u64,
    /// Reverse strand alignments
    pub reverse: u64,
    /// Secondary alignments
    pub secondary: u64,
    /// Supplementary alignments
    pub supplementary: u64,
    /// PCR or optical duplicates
    pub duplicates: u64,
    /// Reads failing quality checks
    pub qc_fail: u64,
    /// Sum of sequence lengths
    pub bases: u64,
}

impl AlignmentStatistics {
    /// Empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one record.
    pub fn update(&mut self, record: &Record) {
        let bump = |counter: &mut u64, set: bool| *counter += set as u64;

        self.total += 1;
        bump(&mut self.mapped, !record.is_unmapped());
        bump(&mut self.unmapped, record.is_unmapped());
        bump(&mut self.paired, record.is_paired());
        bump(&mut self.proper_pairs, record.is_proper_pair());
        bump(&mut self.reverse, record.is_reverse_complement());
        bump(&mut self.secondary, record.is_secondary());
        bump(&mut self.supplementary, record.is_supplementary());
        bump(&mut self.duplicates, record.is_duplicate());
        bump(&mut self.qc_fail, record.is_qc_fail());
        self.bases += record.sequence_length() as u64;
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for AlignmentStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |n: u64| {
            if self.total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / self.total as f64
            }
        };
        writeln!(f, "Total records:  {}", self.total)?;
        writeln!(f, "Mapped:         {} ({:.2}%)", self.mapped, pct(self.mapped))?;
        writeln!(f, "Unmapped:       {} ({:.2}%)", self.unmapped, pct(self.unmapped))?;
        writeln!(f, "Paired:         {}", self.paired)?;
        writeln!(f, "Proper pairs:   {}", self.proper_pairs)?;
        writeln!(f, "Reverse strand: {}", self.reverse)?;
        writeln!(f, "Secondary:      {}", self.secondary)?;
        writeln!(f, "Supplementary:  {}", self.supplementary)?;
        writeln!(f, "Duplicates:     {} ({:.2}%)", self.duplicates, pct(self.duplicates))?;
        writeln!(f, "QC fail:        {}", self.qc_fail)?;
        write!(f, "Bases:          {}", self.bases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::flags;

    #[test]
    fn test_update_counts_flags() {
        let mut stats = AlignmentStatistics::new();

        let mut record = Record::new();
        record.flags = flags::PAIRED | flags::PROPER_PAIR | flags::REVERSE;
        record.sequence = b"ACGT".to_vec();
        stats.update(&record);

        record.flags = flags::UNMAPPED | flags::DUPLICATE;
        record.sequence = b"AC".to_vec();
        stats.update(&record);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.mapped, 1);
        assert_eq!(stats.unmapped, 1);
        assert_eq!(stats.proper_pairs, 1);
        assert_eq!(stats.reverse, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.bases, 6);
        assert!(stats.to_string().contains("Mapped:         1 (50.00%)"));

        stats.reset();
        assert_eq!(stats, AlignmentStatistics::default());
    }
}
