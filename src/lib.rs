//! alignio: session-level streaming access to SAM/BAM alignments
//!
//! # Overview
//!
//! alignio reads and writes genomic alignment records one at a time through an
//! [`AlignmentSession`]. The session enforces the header-before-record
//! protocol and, when asked to, validates sort order as records stream
//! past. It can restrict reads to a genomic region by walking the byte
//! chunks a BAI index points at.
//!
//! ## Key Features
//!
//! - **Streaming**: one record in memory at a time, one BGZF block buffered
//! - **Region queries**: lazy reference resolution, chunk iteration over
//!   virtual offsets, overlap or full-containment rules
//! - **Sort validation**: coordinate order (unmapped last) and query-name
//!   order under natural or byte ordering
//! - **Filtering**: required/excluded flag bits, plus optional statistics
//! - **Formats**: SAM text and BAM (parallel BGZF compression on write),
//!   BAI read/write/build
//!
//! ## Quick Start
//!
//! ```no_run
//! use alignio::{AlignmentSession, Header, Record};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut input = AlignmentSession::new();
//! let mut header = Header::default();
//! input.open_for_read("input.sam", Some(&mut header))?;
//!
//! let mut output = AlignmentSession::new();
//! output.open_for_write("output.bam", Some(&header))?;
//!
//! let mut record = Record::new();
//! while input.read_record(&header, &mut record)? {
//!     output.write_record(&header, &record)?;
//! }
//! output.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`session`]: the access session, region queries, sort validation, filters
//! - [`backend`]: per-format backends chosen at open time
//! - [`io`]: BGZF, BAM (with BAI) and SAM codecs
//! - [`error`]: crate error type

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod error;
pub mod io;
pub mod session;

// Re-export commonly used types
pub use backend::{ContainerFormat, FormatBackend, OpenMode};
pub use error::{AlignError, Result};
pub use io::bam::{BaiIndex, Header, Record};
pub use session::{
    AlignmentSession, ContractViolation, OverlapMode, ReferenceSelector, SessionConfig,
    SortPolicy, Status, StatusKind,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
