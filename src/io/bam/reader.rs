//! BAM streaming reader.
//!
//! Wraps a [`BgzfReader`] so records can be read sequentially with constant
//! memory, and (for seekable inputs) repositioned on index chunk boundaries
//! via virtual offsets.
//!
//! # Usage
//!
//! ```no_run
//! use alignio::io::bam::BamReader;
//!
//! # fn main() -> alignio::Result<()> {
//! let mut bam = BamReader::from_path("alignments.bam")?;
//! println!("Header: {} references", bam.header().reference_count());
//!
//! for result in bam.records() {
//!     let record = result?;
//!     println!("{} at {}", record.name, record.position.unwrap_or(-1));
//! }
//! # Ok(())
//! # }
//! ```

use super::header::{read_header, Header};
use super::record::{parse_record_into, read_record_bytes, Record};
use crate::io::bgzf::{BgzfReader, VirtualOffset};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

/// BAM file reader.
///
/// The internal buffer is reused across records and grows to the largest
/// record seen.
pub struct BamReader<R> {
    reader: BgzfReader<R>,
    header: Header,
    header_read: bool,
    /// Virtual offset of the first record
    data_start: VirtualOffset,
    buffer: Vec<u8>,
}

impl<R: Read> BamReader<R> {
    /// Create a reader and read the header immediately.
    pub fn new(inner: R) -> io::Result<Self> {
        let mut reader = Self::with_deferred_header(inner);
        reader.read_header()?;
        Ok(reader)
    }

    /// Create a reader without touching the stream; call
    /// [`read_header`](Self::read_header) before reading records.
    pub fn with_deferred_header(inner: R) -> Self {
        Self {
            reader: BgzfReader::new(inner),
            header: Header::default(),
            header_read: false,
            data_start: VirtualOffset::default(),
            buffer: Vec::with_capacity(512),
        }
    }

    /// Read the header if it has not been read yet.
    pub fn read_header(&mut self) -> io::Result<&Header> {
        if !self.header_read {
            self.header = read_header(&mut self.reader)?;
            self.data_start = self.reader.virtual_offset();
            self.header_read = true;
        }
        Ok(&self.header)
    }

    /// The header (empty until read).
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Virtual offset of the next unread byte.
    pub fn virtual_offset(&self) -> VirtualOffset {
        self.reader.virtual_offset()
    }

    /// Virtual offset of the first record, once the header has been read.
    pub fn data_start(&self) -> Option<VirtualOffset> {
        self.header_read.then_some(self.data_start)
    }

    /// True when no bytes remain in the stream.
    pub fn is_eof(&mut self) -> io::Result<bool> {
        self.reader.at_eof()
    }

    /// Read the next record into `record`. Returns `Ok(false)` at end of stream.
    pub fn read_record_into(&mut self, record: &mut Record) -> io::Result<bool> {
        self.read_header()?;
        if !read_record_bytes(&mut self.reader, &mut self.buffer)? {
            return Ok(false);
        }
        parse_record_into(&self.buffer, record)?;
        Ok(true)
    }

    /// Read the next record. Returns `Ok(None)` at end of stream.
    pub fn read_record(&mut self) -> io::Result<Option<Record>> {
        let mut record = Record::new();
        Ok(self.read_record_into(&mut record)?.then_some(record))
    }

    /// Iterate over the remaining records.
    pub fn records(&mut self) -> Records<'_, R> {
        Records { reader: self }
    }
}

impl<R: Read + Seek> BamReader<R> {
    /// Reposition on a record boundary.
    pub fn seek(&mut self, offset: VirtualOffset) -> io::Result<()> {
        self.reader.seek(offset)
    }
}

impl BamReader<BufReader<File>> {
    /// Open a BAM file from a path and read its header.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file))?)
    }
}

/// Iterator over BAM records, created by [`BamReader::records`].
pub struct Records<'a, R> {
    reader: &'a mut BamReader<R>,
}

impl<'a, R: Read> Iterator for Records<'a, R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::header::Reference;
    use crate::io::bam::writer::BamWriter;
    use std::io::Cursor;

    fn sample_bam(names: &[&str]) -> Vec<u8> {
        let header = Header::new(
            "@HD\tVN:1.6\tSO:coordinate\n".to_string(),
            vec![Reference::new("chr1", 10_000)],
        );
        let mut writer = BamWriter::new(Vec::new());
        writer.write_header(&header).unwrap();
        for (i, name) in names.iter().enumerate() {
            let mut record = Record::new();
            record.name = name.to_string();
            record.reference_id = Some(0);
            record.position = Some(i as i32 * 10);
            writer.write_record(&record).unwrap();
        }
        writer.finish().unwrap();
        writer.get_ref().clone()
    }

    #[test]
    fn test_reader_header() {
        let bam = BamReader::new(Cursor::new(sample_bam(&[]))).unwrap();
        assert_eq!(bam.header().reference_count(), 1);
        assert_eq!(bam.header().sort_order(), Some("coordinate"));
        assert!(bam.data_start().is_some());
    }

    #[test]
    fn test_records_iterator() {
        let mut bam = BamReader::new(Cursor::new(sample_bam(&["a", "b", "c"]))).unwrap();
        let names: Vec<String> = bam
            .records()
            .map(|r| r.map(|r| r.name))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(bam.is_eof().unwrap());
    }

    #[test]
    fn test_deferred_header() {
        let mut bam = BamReader::with_deferred_header(Cursor::new(sample_bam(&["a"])));
        assert!(bam.data_start().is_none());
        assert!(!bam.is_eof().unwrap());
        assert_eq!(bam.read_header().unwrap().reference_count(), 1);
        assert_eq!(bam.read_record().unwrap().unwrap().name, "a");
        assert!(bam.read_record().unwrap().is_none());
    }

    #[test]
    fn test_seek_back_to_record() {
        let mut bam = BamReader::new(Cursor::new(sample_bam(&["a", "b", "c"]))).unwrap();
        bam.read_record().unwrap();
        let second = bam.virtual_offset();
        bam.read_record().unwrap();
        bam.read_record().unwrap();

        bam.seek(second).unwrap();
        assert_eq!(bam.read_record().unwrap().unwrap().name, "b");
    }

    #[test]
    fn test_not_bgzf() {
        assert!(BamReader::new(Cursor::new(b"INVALID".to_vec())).is_err());
    }
}
