//! Format backends: one object per open container, chosen once at open time.
//!
//! A backend performs raw header and record I/O and reports positions. It
//! applies no filtering, ordering or region logic; that belongs to
//! [`AlignmentSession`](crate::session::AlignmentSession).
//!
//! Readers are picked by content (BGZF + `BAM\1` is BAM, anything else
//! textual is SAM); writers by file extension (`.bam`, `.ubam` for
//! uncompressed BAM, everything else SAM).

mod bam;
mod sam;

pub use bam::{BamReaderBackend, BamWriterBackend};
pub use sam::{SamReaderBackend, SamWriterBackend};

use crate::error::{AlignError, Result};
use crate::io::bam::header::BAM_MAGIC;
use crate::io::bam::{Header, Record};
use crate::io::bgzf::{is_bgzf, BgzfReader, VirtualOffset};
use flate2::Compression;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Detected container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// SAM text
    Sam,
    /// BGZF-compressed BAM
    Bam,
    /// CRAM (recognised, not decoded)
    Cram,
    /// Anything else
    Unknown,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Sam => "SAM",
            ContainerFormat::Bam => "BAM",
            ContainerFormat::Cram => "CRAM",
            ContainerFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Direction a container is open in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reading records
    Read,
    /// Writing records
    Write,
}

fn unsupported(what: &str, format: ContainerFormat) -> AlignError {
    AlignError::Unsupported(format!("{} is not available for a {} backend", what, format))
}

/// Raw container I/O behind an access session.
///
/// Read backends implement the `read_*` methods, write backends the
/// `write_*` ones; the defaults report [`AlignError::Unsupported`].
/// Backends that can seek implement [`tell`](Self::tell),
/// [`seek`](Self::seek) and [`data_start`](Self::data_start) so the session
/// can walk index chunks. Backends that do their own region filtering
/// return `true` from [`resolves_regions`](Self::resolves_regions) and
/// implement [`restrict_to_region`](Self::restrict_to_region).
pub trait FormatBackend {
    /// Container format of the underlying stream.
    fn format(&self) -> ContainerFormat;

    /// Read the header into `header`.
    fn read_header(&mut self, _header: &mut Header) -> Result<()> {
        Err(unsupported("Reading a header", self.format()))
    }

    /// Validate and write `header`.
    fn write_header(&mut self, _header: &Header) -> Result<()> {
        Err(unsupported("Writing a header", self.format()))
    }

    /// Read the next record. Returns `Ok(false)` at end of stream.
    fn read_record(&mut self, _header: &Header, _record: &mut Record) -> Result<bool> {
        Err(unsupported("Reading records", self.format()))
    }

    /// Encode and write one record.
    fn write_record(&mut self, _header: &Header, _record: &Record) -> Result<()> {
        Err(unsupported("Writing records", self.format()))
    }

    /// True when no unread data remains. Write backends are never at EOF.
    fn is_eof(&mut self) -> Result<bool> {
        Ok(false)
    }

    /// Virtual offset of the next record, for seekable backends.
    fn tell(&self) -> Option<VirtualOffset> {
        None
    }

    /// Reposition on a record boundary.
    fn seek(&mut self, _offset: VirtualOffset) -> Result<()> {
        Err(unsupported("Seeking", self.format()))
    }

    /// Virtual offset of the first record, once the header has been read.
    fn data_start(&self) -> Option<VirtualOffset> {
        None
    }

    /// Whether the backend filters regions itself instead of relying on the
    /// session's chunk iteration.
    fn resolves_regions(&self) -> bool {
        false
    }

    /// Load a backend-specific index. Returns `Ok(false)` when the backend
    /// has no use for it.
    fn load_index(&mut self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    /// Restrict subsequent reads to `reference` (`None` = unmapped) and
    /// `[start, end)`. Returns `Ok(false)` when unsupported.
    fn restrict_to_region(
        &mut self,
        _reference: Option<usize>,
        _start: Option<i64>,
        _end: Option<i64>,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Flush buffered output and write any trailer. Idempotent.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sniff the container format from the first bytes of `path`.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<ContainerFormat> {
    let mut file = File::open(path.as_ref())?;
    let mut prefix = Vec::with_capacity(18);
    file.by_ref().take(18).read_to_end(&mut prefix)?;

    if prefix.starts_with(b"CRAM") {
        return Ok(ContainerFormat::Cram);
    }
    if is_bgzf(&prefix) {
        let mut magic = Vec::with_capacity(4);
        BgzfReader::new(BufReader::new(File::open(path.as_ref())?))
            .take(4)
            .read_to_end(&mut magic)?;
        if magic == BAM_MAGIC {
            return Ok(ContainerFormat::Bam);
        }
        return Ok(ContainerFormat::Unknown);
    }
    if prefix.starts_with(&[31, 139]) {
        return Ok(ContainerFormat::Unknown);
    }
    Ok(ContainerFormat::Sam)
}

/// Open a container for reading, choosing the backend by content.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn FormatBackend>> {
    let path = path.as_ref();
    let format = detect_format(path)?;
    log::debug!("Opening {} for reading as {}", path.display(), format);

    match format {
        ContainerFormat::Bam => Ok(Box::new(BamReaderBackend::open(path)?)),
        ContainerFormat::Sam => Ok(Box::new(SamReaderBackend::open(path)?)),
        ContainerFormat::Cram => Err(AlignError::Unsupported(format!(
            "{}: CRAM containers cannot be decoded",
            path.display()
        ))),
        ContainerFormat::Unknown => Err(AlignError::Unsupported(format!(
            "{}: unrecognised container format",
            path.display()
        ))),
    }
}

/// Format a writer would produce for `path`.
pub fn format_for_extension<P: AsRef<Path>>(path: P) -> ContainerFormat {
    match path.as_ref().extension().and_then(|e| e.to_str()) {
        Some("bam") | Some("ubam") => ContainerFormat::Bam,
        Some("cram") => ContainerFormat::Cram,
        _ => ContainerFormat::Sam,
    }
}

/// Create a container for writing, choosing the backend by extension.
///
/// `.ubam` writes BAM with compression level 0; `.bam` uses `level`.
pub fn open_writer<P: AsRef<Path>>(path: P, level: Compression) -> Result<Box<dyn FormatBackend>> {
    let path = path.as_ref();
    let format = format_for_extension(path);
    log::debug!("Opening {} for writing as {}", path.display(), format);

    match format {
        ContainerFormat::Bam => {
            let uncompressed = path.extension().and_then(|e| e.to_str()) == Some("ubam");
            let level = if uncompressed { Compression::none() } else { level };
            Ok(Box::new(BamWriterBackend::create(path, level)?))
        }
        ContainerFormat::Cram => Err(AlignError::Unsupported(format!(
            "{}: writing CRAM is not supported",
            path.display()
        ))),
        _ => Ok(Box::new(SamWriterBackend::create(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::BamWriter;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_detect_format() {
        let dir = tempdir().unwrap();

        let sam = dir.path().join("a.sam");
        std::fs::write(&sam, "@HD\tVN:1.6\n").unwrap();
        assert_eq!(detect_format(&sam).unwrap(), ContainerFormat::Sam);

        let bam = dir.path().join("a.bam");
        let mut writer = BamWriter::new(File::create(&bam).unwrap());
        writer.write_header(&Header::default()).unwrap();
        writer.finish().unwrap();
        assert_eq!(detect_format(&bam).unwrap(), ContainerFormat::Bam);

        let cram = dir.path().join("a.cram");
        std::fs::write(&cram, b"CRAM\x03\x00").unwrap();
        assert_eq!(detect_format(&cram).unwrap(), ContainerFormat::Cram);

        let gz = dir.path().join("a.sam.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"@HD\tVN:1.6\n").unwrap();
        encoder.finish().unwrap();
        assert_eq!(detect_format(&gz).unwrap(), ContainerFormat::Unknown);
    }

    #[test]
    fn test_open_reader_rejects_cram_and_missing_files() {
        let dir = tempdir().unwrap();
        let cram = dir.path().join("a.cram");
        std::fs::write(&cram, b"CRAM\x03\x00").unwrap();
        assert!(matches!(open_reader(&cram), Err(AlignError::Unsupported(_))));
        assert!(matches!(
            open_reader(dir.path().join("missing.bam")),
            Err(AlignError::Io(_))
        ));
    }

    #[test]
    fn test_writer_choice_by_extension() {
        assert_eq!(format_for_extension("out.bam"), ContainerFormat::Bam);
        assert_eq!(format_for_extension("out.ubam"), ContainerFormat::Bam);
        assert_eq!(format_for_extension("out.cram"), ContainerFormat::Cram);
        assert_eq!(format_for_extension("out.sam"), ContainerFormat::Sam);
        assert_eq!(format_for_extension("out"), ContainerFormat::Sam);

        let dir = tempdir().unwrap();
        let backend = open_writer(dir.path().join("out.ubam"), Compression::default()).unwrap();
        assert_eq!(backend.format(), ContainerFormat::Bam);
        assert!(open_writer(dir.path().join("out.cram"), Compression::default()).is_err());
    }
}
