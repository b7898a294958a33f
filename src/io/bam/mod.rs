//! BAM (Binary Alignment Map) codec and BAI index.
//!
//! The [`Record`] and [`Header`] types defined here are shared by every
//! container format in the crate; SAM text is converted to and from them by
//! [`crate::io::sam`].
//!
//! # Example
//!
//! ```no_run
//! use alignio::io::bam::{BaiIndex, BamReader, RegionIndex};
//!
//! # fn main() -> alignio::Result<()> {
//! let mut bam = BamReader::from_path("alignments.bam")?;
//! let chr1 = bam.header().reference_id("chr1");
//!
//! let index = BaiIndex::from_path("alignments.bam.bai")?;
//! if let Some(chunks) = index.chunks_for_region(chr1, Some(10_000), Some(20_000)) {
//!     for chunk in chunks {
//!         bam.seek(chunk.start)?;
//!         // read until bam.virtual_offset() >= chunk.end
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cigar;
pub mod error;
pub mod header;
pub mod index;
pub mod reader;
pub mod record;
pub mod sequence;
pub mod tags;
pub mod writer;

pub use cigar::{format_cigar, parse_cigar, parse_cigar_string, CigarOp};
pub use error::BamDecodeError;
pub use header::{Header, Reference};
pub use index::{BaiBuilder, BaiIndex, Chunk, RegionIndex, VirtualOffset};
pub use reader::{BamReader, Records};
pub use record::{flags, parse_record, Record};
pub use sequence::decode_sequence;
pub use tags::Tags;
pub use writer::BamWriter;
