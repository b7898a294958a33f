//! SAM text backends. Sequential only: no virtual offsets, no index.

use super::{ContainerFormat, FormatBackend};
use crate::error::Result;
use crate::io::bam::{Header, Record};
use crate::io::sam::{SamReader, SamWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// SAM reader.
pub struct SamReaderBackend {
    reader: SamReader<BufReader<File>>,
}

impl SamReaderBackend {
    /// Open `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: SamReader::from_path(path)?,
        })
    }
}

impl FormatBackend for SamReaderBackend {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Sam
    }

    fn read_header(&mut self, header: &mut Header) -> Result<()> {
        *header = self.reader.read_header()?;
        Ok(())
    }

    fn read_record(&mut self, header: &Header, record: &mut Record) -> Result<bool> {
        self.reader.read_record_into(header, record)
    }

    fn is_eof(&mut self) -> Result<bool> {
        Ok(self.reader.is_eof()?)
    }
}

/// SAM writer.
pub struct SamWriterBackend {
    writer: SamWriter<BufWriter<File>>,
}

impl SamWriterBackend {
    /// Create `path` (truncating any existing file).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            writer: SamWriter::from_path(path)?,
        })
    }
}

impl FormatBackend for SamWriterBackend {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Sam
    }

    fn write_header(&mut self, header: &Header) -> Result<()> {
        header.validate()?;
        self.writer.write_header(header)
    }

    fn write_record(&mut self, header: &Header, record: &Record) -> Result<()> {
        self.writer.write_record(header, record)
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.finish()
    }
}
