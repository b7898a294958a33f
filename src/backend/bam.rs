//! BAM backends over [`BamReader`] and [`BamWriter`].

use super::{ContainerFormat, FormatBackend};
use crate::error::{AlignError, Result};
use crate::io::bam::{BamReader, BamWriter, Header, Record};
use crate::io::bgzf::VirtualOffset;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Seekable BAM reader.
pub struct BamReaderBackend {
    reader: BamReader<BufReader<File>>,
}

impl BamReaderBackend {
    /// Open `path` without reading the header yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BamReader::with_deferred_header(BufReader::new(file)),
        })
    }
}

impl FormatBackend for BamReaderBackend {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Bam
    }

    fn read_header(&mut self, header: &mut Header) -> Result<()> {
        *header = self.reader.read_header()?.clone();
        Ok(())
    }

    fn read_record(&mut self, _header: &Header, record: &mut Record) -> Result<bool> {
        Ok(self.reader.read_record_into(record)?)
    }

    fn is_eof(&mut self) -> Result<bool> {
        Ok(self.reader.is_eof()?)
    }

    fn tell(&self) -> Option<VirtualOffset> {
        Some(self.reader.virtual_offset())
    }

    fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        log::trace!("Seeking BAM reader to {}", offset);
        self.reader.seek(offset)?;
        Ok(())
    }

    fn data_start(&self) -> Option<VirtualOffset> {
        self.reader.data_start()
    }
}

/// BAM writer with a configurable compression level.
pub struct BamWriterBackend {
    writer: BamWriter<BufWriter<File>>,
}

impl BamWriterBackend {
    /// Create `path` (truncating any existing file).
    pub fn create<P: AsRef<Path>>(path: P, level: Compression) -> Result<Self> {
        Ok(Self {
            writer: BamWriter::from_path(path, level)?,
        })
    }
}

impl FormatBackend for BamWriterBackend {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Bam
    }

    fn write_header(&mut self, header: &Header) -> Result<()> {
        header.validate()?;
        self.writer.write_header(header)?;
        Ok(())
    }

    fn write_record(&mut self, header: &Header, record: &Record) -> Result<()> {
        for id in [record.reference_id, record.mate_reference_id].into_iter().flatten() {
            if id >= header.reference_count() {
                return Err(AlignError::InvalidRecord(format!(
                    "Record '{}' refers to reference {} but the header has {}",
                    record.name,
                    id,
                    header.reference_count()
                )));
            }
        }
        self.writer.write_record(record)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}
