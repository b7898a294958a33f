//! Container codecs: BGZF blocks, BAM records with the BAI index, SAM text.
//!
//! These layers know nothing about sessions; they decode and encode whole
//! headers and records and report positions. [`crate::backend`] wraps them
//! behind a single trait.

pub mod bam;
pub mod bgzf;
pub mod sam;

pub use bam::{BaiIndex, BamReader, BamWriter, Header, Record};
pub use bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
pub use sam::{SamReader, SamWriter};
