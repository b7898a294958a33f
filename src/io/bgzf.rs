//! BGZF (blocked gzip) reading and writing with virtual offsets.
//!
//! BAM files are a series of independent gzip members ("blocks"), each at
//! most 64 KB compressed and 64 KB uncompressed. Because every block can be
//! inflated on its own, a position inside the file is addressed with a
//! *virtual offset*:
//!
//! ```text
//! virtual offset (64 bits):
//! - high 48 bits: byte offset of the compressed block in the file
//! - low 16 bits:  byte offset inside the decompressed block
//! ```
//!
//! Index chunks (BAI) are ranges of virtual offsets, so region queries need a
//! reader that can both report and seek to these positions.
//!
//! # Block Structure
//!
//! - Bytes 0-1: Gzip magic (31, 139)
//! - Bytes 2-9: Standard gzip header fields (FLG has FEXTRA set)
//! - Bytes 10-11: XLEN (extra field length)
//! - Bytes 12+: Extra subfields, including BSIZE
//!   - SI1=66 ('B'), SI2=67 ('C'), SLEN=2
//!   - BSIZE (little-endian u16): total block size - 1
//! - Deflate payload, CRC32, ISIZE

use flate2::read::GzDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Uncompressed payload written per block.
///
/// The format caps a block at 64 KB; 60 KB leaves headroom so that
/// incompressible data still fits after deflate overhead.
const BGZF_BLOCK_SIZE: usize = 60 * 1024;

/// Number of blocks compressed together on the rayon pool.
pub const PARALLEL_BLOCK_COUNT: usize = 8;

/// Fixed part of a gzip member header up to and including XLEN.
const GZIP_HEADER_LEN: usize = 12;

/// The empty block that terminates every well-formed BGZF file.
pub const EOF_MARKER: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // Header (10 bytes)
    6, 0, 66, 67, 2, 0, 27, 0, // Extra field with BSIZE=27 (8 bytes)
    3, 0, // Empty deflate block (2 bytes)
    0, 0, 0, 0, // CRC32 (4 bytes)
    0, 0, 0, 0, // ISIZE=0 (4 bytes)
];

/// BGZF virtual file offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Largest representable offset; used as an open end for chunks.
    pub const MAX: VirtualOffset = VirtualOffset(u64::MAX);

    /// Build from a compressed block offset and an offset inside that block.
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        VirtualOffset((compressed << 16) | uncompressed as u64)
    }

    /// Wrap a raw 64-bit virtual offset (as stored in index files).
    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    /// Raw 64-bit value.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Offset of the compressed block in the file.
    pub fn compressed(&self) -> u64 {
        self.0 >> 16
    }

    /// Offset inside the decompressed block.
    pub fn uncompressed(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.compressed(), self.uncompressed())
    }
}

/// Check whether `data` starts with a BGZF block header.
///
/// Plain gzip also starts with 31, 139; BGZF is distinguished by the `BC`
/// extra subfield.
pub fn is_bgzf(data: &[u8]) -> bool {
    data.len() >= 16
        && data[0] == 31
        && data[1] == 139
        && data[2] == 8
        && data[3] & 0x04 != 0
        && data[12] == 66
        && data[13] == 67
}

/// Read until `buf` is full or the reader is exhausted.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Block-at-a-time BGZF reader.
///
/// Holds exactly one decompressed block in memory, so the footprint stays
/// constant regardless of file size. `seek` requires `R: Seek`.
pub struct BgzfReader<R> {
    inner: R,
    /// Decompressed contents of the current block
    block: Vec<u8>,
    /// Read position inside `block`
    block_pos: usize,
    /// Compressed file offset of the current block
    block_offset: u64,
    /// Compressed file offset of the block after the current one
    next_block_offset: u64,
    /// Scratch buffer for the raw compressed block
    compressed: Vec<u8>,
    eof: bool,
}

impl<R: Read> BgzfReader<R> {
    /// Wrap a reader positioned at the start of a BGZF stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            block: Vec::with_capacity(BGZF_BLOCK_SIZE),
            block_pos: 0,
            block_offset: 0,
            next_block_offset: 0,
            compressed: Vec::with_capacity(BGZF_BLOCK_SIZE),
            eof: false,
        }
    }

    /// Current virtual offset.
    ///
    /// Once the current block is fully consumed this reports the start of the
    /// next block, which is how index chunk boundaries are expressed.
    pub fn virtual_offset(&self) -> VirtualOffset {
        if self.block_pos < self.block.len() {
            VirtualOffset::new(self.block_offset, self.block_pos as u16)
        } else {
            VirtualOffset::new(self.next_block_offset, 0)
        }
    }

    /// True once a read hit the end of the underlying stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// True when no unread data remains, loading the next block if needed.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        Ok(!self.fill()?)
    }

    /// Read and inflate the next block. Returns `false` on clean end of stream.
    fn read_block(&mut self) -> io::Result<bool> {
        let mut header = [0u8; GZIP_HEADER_LEN];
        let n = read_fully(&mut self.inner, &mut header)?;
        if n == 0 {
            self.eof = true;
            self.block.clear();
            self.block_pos = 0;
            self.block_offset = self.next_block_offset;
            return Ok(false);
        }
        if n < GZIP_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Incomplete BGZF header at offset {} (only {} bytes)",
                    self.next_block_offset, n
                ),
            ));
        }

        if header[0] != 31 || header[1] != 139 {
            return Err(invalid_data(format!(
                "Invalid gzip magic bytes at offset {}: expected [31, 139], got [{}, {}]",
                self.next_block_offset, header[0], header[1]
            )));
        }
        if header[3] & 0x04 == 0 {
            return Err(invalid_data(format!(
                "Gzip member at offset {} has no extra field (not BGZF)",
                self.next_block_offset
            )));
        }

        let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
        let mut extra = vec![0u8; xlen];
        self.inner.read_exact(&mut extra)?;

        // Walk the extra subfields looking for BC/BSIZE
        let mut bsize: Option<u16> = None;
        let mut pos = 0;
        while pos + 4 <= xlen {
            let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
            if extra[pos] == 66 && extra[pos + 1] == 67 && slen == 2 && pos + 6 <= xlen {
                bsize = Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
                break;
            }
            pos += 4 + slen;
        }
        let block_size = match bsize {
            Some(bs) => bs as usize + 1,
            None => {
                return Err(invalid_data(format!(
                    "Missing BSIZE subfield in block at offset {}",
                    self.next_block_offset
                )))
            }
        };

        let consumed = GZIP_HEADER_LEN + xlen;
        if block_size < consumed + 8 {
            return Err(invalid_data(format!(
                "Block size {} at offset {} is smaller than its header",
                block_size, self.next_block_offset
            )));
        }

        self.compressed.clear();
        self.compressed.extend_from_slice(&header);
        self.compressed.extend_from_slice(&extra);
        self.compressed.resize(block_size, 0);
        self.inner.read_exact(&mut self.compressed[consumed..])?;

        self.block.clear();
        let mut decoder = GzDecoder::new(&self.compressed[..]);
        decoder.read_to_end(&mut self.block)?;

        self.block_offset = self.next_block_offset;
        self.next_block_offset += block_size as u64;
        self.block_pos = 0;
        Ok(true)
    }

    /// Make sure unread data is available, skipping empty blocks.
    fn fill(&mut self) -> io::Result<bool> {
        while self.block_pos >= self.block.len() {
            if self.eof || !self.read_block()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Reposition the reader at a virtual offset.
    pub fn seek(&mut self, offset: VirtualOffset) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset.compressed()))?;
        self.next_block_offset = offset.compressed();
        self.block.clear();
        self.block_pos = 0;
        self.eof = false;

        let within = offset.uncompressed() as usize;
        if !self.read_block()? {
            if within == 0 {
                return Ok(());
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Cannot seek to {}: past end of file", offset),
            ));
        }
        if within > self.block.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Cannot seek to {}: block holds only {} bytes",
                    offset,
                    self.block.len()
                ),
            ));
        }
        self.block_pos = within;
        Ok(())
    }
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || !self.fill()? {
            return Ok(0);
        }
        let available = &self.block[self.block_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.block_pos += n;
        Ok(n)
    }
}

/// Parallel BGZF writer.
///
/// Buffers `PARALLEL_BLOCK_COUNT` blocks of 60 KB, compresses them on the
/// rayon pool, then writes them sequentially. Memory stays bounded at about
/// 1 MB. `finish` writes the EOF marker; dropping an unfinished writer
/// finishes it on a best-effort basis.
pub struct BgzfWriter<W: Write> {
    writer: W,
    level: Compression,
    /// Full blocks waiting to be compressed
    pending: Vec<Vec<u8>>,
    /// Block currently being filled
    current: Vec<u8>,
    finished: bool,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer using the default compression level.
    pub fn new(writer: W) -> Self {
        Self::with_compression(writer, Compression::default())
    }

    /// Create a writer with an explicit compression level.
    ///
    /// `Compression::none()` still produces valid BGZF (stored deflate
    /// blocks), which is what "uncompressed BAM" means.
    pub fn with_compression(writer: W, level: Compression) -> Self {
        Self {
            writer,
            level,
            pending: Vec::with_capacity(PARALLEL_BLOCK_COUNT),
            current: Vec::with_capacity(BGZF_BLOCK_SIZE),
            finished: false,
        }
    }

    /// Underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Compress a single block to BGZF format.
    ///
    /// The gzip header is built by hand because flate2's encoder cannot emit
    /// the `BC` subfield.
    fn compress_block(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
        let mut deflate = DeflateEncoder::new(Vec::with_capacity(data.len()), level);
        deflate.write_all(data)?;
        let deflated = deflate.finish()?;

        let mut block = Vec::with_capacity(deflated.len() + 26);
        block.extend_from_slice(&[31, 139, 8, 4, 0, 0, 0, 0, 0, 255]);
        block.extend_from_slice(&6u16.to_le_bytes()); // XLEN
        block.extend_from_slice(&[66, 67]);
        block.extend_from_slice(&2u16.to_le_bytes()); // SLEN
        let bsize_pos = block.len();
        block.extend_from_slice(&0u16.to_le_bytes());
        block.extend_from_slice(&deflated);
        block.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        block.extend_from_slice(&(data.len() as u32).to_le_bytes());

        let total = block.len();
        if total > 64 * 1024 {
            return Err(invalid_data(format!(
                "Compressed block of {} bytes exceeds the 64 KB BGZF limit",
                total
            )));
        }
        block[bsize_pos..bsize_pos + 2].copy_from_slice(&((total - 1) as u16).to_le_bytes());
        Ok(block)
    }

    /// Compress all pending blocks in parallel and write them in order.
    fn flush_blocks(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let level = self.level;
        let compressed: Vec<Vec<u8>> = self
            .pending
            .par_iter()
            .map(|block| Self::compress_block(block, level))
            .collect::<io::Result<Vec<_>>>()?;
        for block in compressed {
            self.writer.write_all(&block)?;
        }
        self.pending.clear();
        Ok(())
    }

    fn seal_current(&mut self) {
        if !self.current.is_empty() {
            let block = std::mem::replace(&mut self.current, Vec::with_capacity(BGZF_BLOCK_SIZE));
            self.pending.push(block);
        }
    }

    /// Flush remaining data and write the EOF marker. Idempotent.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.seal_current();
        self.flush_blocks()?;
        self.writer.write_all(&EOF_MARKER)?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "BGZF stream already finished",
            ));
        }
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BGZF_BLOCK_SIZE - self.current.len();
            let n = remaining.len().min(space);
            self.current.extend_from_slice(&remaining[..n]);
            remaining = &remaining[n..];

            if self.current.len() >= BGZF_BLOCK_SIZE {
                self.seal_current();
                if self.pending.len() >= PARALLEL_BLOCK_COUNT {
                    self.flush_blocks()?;
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.seal_current();
        self.flush_blocks()?;
        self.writer.flush()
    }
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
        writer.get_ref().clone()
    }

    #[test]
    fn test_virtual_offset_parts() {
        let offset = VirtualOffset::new(278, 17);
        assert_eq!(offset.compressed(), 278);
        assert_eq!(offset.uncompressed(), 17);
        assert_eq!(offset.as_raw(), (278 << 16) | 17);
        assert!(VirtualOffset::new(278, 17) < VirtualOffset::new(279, 0));
    }

    #[test]
    fn test_eof_marker_is_bgzf() {
        assert!(is_bgzf(&EOF_MARKER));
        assert!(!is_bgzf(b"@HD\tVN:1.6\n"));
    }

    #[test]
    fn test_small_payload() {
        let bytes = compress(b"hello bgzf");
        assert!(is_bgzf(&bytes));
        assert!(bytes.ends_with(&EOF_MARKER));

        let mut reader = BgzfReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello bgzf");
        assert!(reader.is_eof());
    }

    #[test]
    fn test_multi_block_payload() {
        // 200 KB spans four 60 KB blocks
        let data: Vec<u8> = (0..200 * 1024).map(|i| (i % 251) as u8).collect();
        let bytes = compress(&data);

        let mut reader = BgzfReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_uncompressed_level() {
        let data = vec![b'A'; 1000];
        let mut writer = BgzfWriter::with_compression(Vec::new(), Compression::none());
        writer.write_all(&data).unwrap();
        writer.finish().unwrap();
        let bytes = writer.get_ref().clone();
        // Stored blocks are bigger than the payload
        assert!(bytes.len() > data.len());

        let mut out = Vec::new();
        BgzfReader::new(Cursor::new(bytes)).read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_seek_to_recorded_offset() {
        let data: Vec<u8> = (0..150 * 1024).map(|i| (i % 7) as u8 + b'0').collect();
        let bytes = compress(&data);

        let mut reader = BgzfReader::new(Cursor::new(bytes));
        let mut skip = vec![0u8; 70 * 1024];
        reader.read_exact(&mut skip).unwrap();
        let mark = reader.virtual_offset();
        // 70 KB is inside the second block
        assert!(mark.compressed() > 0);
        assert_eq!(mark.uncompressed() as usize, 10 * 1024);

        let mut expected = [0u8; 64];
        reader.read_exact(&mut expected).unwrap();

        reader.seek(VirtualOffset::default()).unwrap();
        let mut first = [0u8; 4];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(&first, &data[..4]);

        reader.seek(mark).unwrap();
        let mut again = [0u8; 64];
        reader.read_exact(&mut again).unwrap();
        assert_eq!(again, expected);
    }

    #[test]
    fn test_offset_at_block_end_points_to_next_block() {
        let data = vec![b'x'; BGZF_BLOCK_SIZE + 10];
        let bytes = compress(&data);
        let mut reader = BgzfReader::new(Cursor::new(bytes));
        let mut first = vec![0u8; BGZF_BLOCK_SIZE];
        reader.read_exact(&mut first).unwrap();

        let offset = reader.virtual_offset();
        assert_eq!(offset.uncompressed(), 0);
        assert!(offset.compressed() > 0);
    }

    #[test]
    fn test_rejects_plain_gzip() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"not blocked").unwrap();
        let bytes = encoder.finish().unwrap();

        let mut reader = BgzfReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(b"abc").unwrap();
        writer.finish().unwrap();
        let len = writer.get_ref().len();
        writer.finish().unwrap();
        assert_eq!(writer.get_ref().len(), len);
        assert!(writer.write(b"more").is_err());
    }
}
