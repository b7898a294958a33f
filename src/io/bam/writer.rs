//! BAM writer on top of the parallel BGZF writer.

use super::header::{write_header, Header};
use super::record::{encode_record, Record};
use crate::io::bgzf::BgzfWriter;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Streaming BAM writer.
///
/// The header must be written before any record. Call [`finish`](Self::finish)
/// to flush the last blocks and the BGZF EOF marker; dropping the writer does
/// this on a best-effort basis.
pub struct BamWriter<W: Write> {
    writer: BgzfWriter<W>,
    buffer: Vec<u8>,
    header_written: bool,
}

impl<W: Write> BamWriter<W> {
    /// Create a writer with the default compression level.
    pub fn new(inner: W) -> Self {
        Self::with_compression(inner, Compression::default())
    }

    /// Create a writer with an explicit compression level.
    pub fn with_compression(inner: W, level: Compression) -> Self {
        Self {
            writer: BgzfWriter::with_compression(inner, level),
            buffer: Vec::with_capacity(512),
            header_written: false,
        }
    }

    /// Underlying writer.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    /// Write the header. Only one header may be written.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        if self.header_written {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "BAM header already written",
            ));
        }
        write_header(&mut self.writer, header)?;
        self.header_written = true;
        Ok(())
    }

    /// Encode and write one record.
    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        if !self.header_written {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "BAM header must be written before records",
            ));
        }
        self.buffer.clear();
        encode_record(record, &mut self.buffer)?;
        self.writer.write_all(&self.buffer)
    }

    /// Flush remaining blocks and write the EOF marker. Idempotent.
    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.finish()
    }
}

impl BamWriter<BufWriter<File>> {
    /// Create a BAM file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P, level: Compression) -> crate::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::with_compression(BufWriter::new(file), level))
    }
}
