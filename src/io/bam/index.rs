//! BAI index: parsing, region queries, read counts, writing and building.
//!
//! # Format
//!
//! ```text
//! - Magic: "BAI\1"
//! - n_ref (int32)
//! - per reference:
//!   - n_bin (int32), then per bin: bin (uint32), n_chunk (int32),
//!     chunks as (beg, end) virtual offset pairs (uint64)
//!   - n_intv (int32), then ioffset (uint64) per 16 kb window
//! - n_no_coor (uint64, optional): reads without a coordinate
//! ```
//!
//! Bin 37450 is a pseudo-bin holding per-reference metadata in two "chunks":
//! the virtual offset range of the reference's records, then the mapped and
//! unmapped read counts.
//!
//! # Binning Scheme
//!
//! 37,450 bins covering 512 Mbp:
//! - Level 0: 1 bin (512 Mbp)
//! - Level 1: 8 bins (64 Mbp each)
//! - Level 2: 64 bins (8 Mbp each)
//! - Level 3: 512 bins (1 Mbp each)
//! - Level 4: 4096 bins (128 Kbp each)
//! - Level 5: 32768 bins (16 Kbp each)

use super::reader::BamReader;
use super::record::Record;
use crate::error::{AlignError, Result};
pub use crate::io::bgzf::VirtualOffset;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// BAI magic bytes.
const BAI_MAGIC: &[u8; 4] = b"BAI\x01";

/// Bin number of the metadata pseudo-bin.
pub const METADATA_BIN: u32 = 37450;

/// Width of a linear index window (16 kb).
const LINEAR_SHIFT: u32 = 14;

/// Largest coordinate addressable by the binning scheme.
const MAX_COORDINATE: i64 = 1 << 29;

/// Half-open range of virtual offsets `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    /// First byte of the chunk
    pub start: VirtualOffset,
    /// One past the last byte of the chunk
    pub end: VirtualOffset,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }

    /// True when the chunk covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Source of region chunks and per-reference read counts.
///
/// `reference` is `None` for the unmapped pseudo-reference. `start` is
/// inclusive and `end` exclusive; `None` bounds are open.
pub trait RegionIndex {
    /// Ordered, non-overlapping chunks that may hold records overlapping the
    /// region. `None` when the reference is not covered by the index.
    fn chunks_for_region(
        &self,
        reference: Option<usize>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Option<Vec<Chunk>>;

    /// Mapped reads on `reference`, `None` when out of range.
    fn mapped_read_count(&self, reference: Option<usize>) -> Option<u64>;

    /// Unmapped reads placed on `reference`; for the unmapped
    /// pseudo-reference, reads without any coordinate.
    fn unmapped_read_count(&self, reference: Option<usize>) -> Option<u64>;
}

/// Bin containing the 0-based half-open interval `[beg, end)`.
pub fn reg2bin(beg: i64, end: i64) -> u16 {
    let end = end - 1;
    if beg >> 14 == end >> 14 {
        return (((1 << 15) - 1) / 7 + (beg >> 14)) as u16;
    }
    if beg >> 17 == end >> 17 {
        return (((1 << 12) - 1) / 7 + (beg >> 17)) as u16;
    }
    if beg >> 20 == end >> 20 {
        return (((1 << 9) - 1) / 7 + (beg >> 20)) as u16;
    }
    if beg >> 23 == end >> 23 {
        return (((1 << 6) - 1) / 7 + (beg >> 23)) as u16;
    }
    if beg >> 26 == end >> 26 {
        return (((1 << 3) - 1) / 7 + (beg >> 26)) as u16;
    }
    0
}

/// All bins that may overlap `[beg, end)`.
pub fn reg2bins(beg: i64, end: i64) -> Vec<u32> {
    let beg = beg.clamp(0, MAX_COORDINATE - 1) as u32;
    let end = (end.clamp(1, MAX_COORDINATE) - 1) as u32;

    let mut bins = vec![0];
    for level in 1..=5u32 {
        let offset = ((1 << (3 * level)) - 1) / 7;
        let shift = 29 - 3 * level;
        bins.extend((offset + (beg >> shift))..=(offset + (end >> shift)));
    }
    bins
}

/// Merge sorted chunks that overlap or touch.
pub fn merge_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(current) if chunk.start <= current.end => {
                current.end = current.end.max(chunk.end);
            }
            _ => merged.push(*chunk),
        }
    }
    merged
}

/// Per-reference metadata stored in the pseudo-bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceMetadata {
    /// Virtual offset of the first record on the reference
    pub start: VirtualOffset,
    /// Virtual offset just past the last record on the reference
    pub end: VirtualOffset,
    /// Reads with the unmapped flag clear
    pub mapped: u64,
    /// Placed reads with the unmapped flag set
    pub unmapped: u64,
}

/// Index data for one reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    /// Bin number to chunks (pseudo-bin excluded)
    pub bins: BTreeMap<u32, Vec<Chunk>>,
    /// Smallest record offset per 16 kb window
    pub intervals: Vec<VirtualOffset>,
    /// Pseudo-bin contents, if present
    pub metadata: Option<ReferenceMetadata>,
}

impl ReferenceIndex {
    /// Lowest offset a record overlapping `beg` can start at.
    fn min_offset(&self, beg: i64) -> VirtualOffset {
        let window = (beg.max(0) >> LINEAR_SHIFT) as usize;
        self.intervals
            .get(window)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or_default()
    }

    /// Largest chunk end on this reference.
    fn max_end(&self) -> Option<VirtualOffset> {
        let from_bins = self.bins.values().flatten().map(|c| c.end).max();
        match (from_bins, self.metadata.map(|m| m.end)) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// BAM index (`.bai`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaiIndex {
    references: Vec<ReferenceIndex>,
    unplaced: Option<u64>,
}

impl BaiIndex {
    /// Load a BAI index from a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::parse(&mut BufReader::new(file))
    }

    /// Parse a BAI index from a reader.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != BAI_MAGIC {
            return Err(AlignError::InvalidIndex(format!(
                "Invalid BAI magic: expected {:?}, got {:?}",
                BAI_MAGIC, magic
            )));
        }

        let n_ref = read_count(reader, "reference count")?;
        let mut references = Vec::with_capacity(n_ref);

        for _ in 0..n_ref {
            let mut reference = ReferenceIndex::default();

            let n_bin = read_count(reader, "bin count")?;
            for _ in 0..n_bin {
                let bin_id = read_u32(reader)?;
                let n_chunk = read_count(reader, "chunk count")?;
                let mut chunks = Vec::with_capacity(n_chunk);
                for _ in 0..n_chunk {
                    let beg = read_u64(reader)?;
                    let end = read_u64(reader)?;
                    chunks.push(Chunk::new(
                        VirtualOffset::from_raw(beg),
                        VirtualOffset::from_raw(end),
                    ));
                }

                if bin_id == METADATA_BIN {
                    if chunks.len() != 2 {
                        return Err(AlignError::InvalidIndex(format!(
                            "Metadata bin has {} chunks, expected 2",
                            chunks.len()
                        )));
                    }
                    reference.metadata = Some(ReferenceMetadata {
                        start: chunks[0].start,
                        end: chunks[0].end,
                        mapped: chunks[1].start.as_raw(),
                        unmapped: chunks[1].end.as_raw(),
                    });
                } else {
                    reference.bins.insert(bin_id, chunks);
                }
            }

            let n_intv = read_count(reader, "interval count")?;
            reference.intervals = (0..n_intv)
                .map(|_| read_u64(reader).map(VirtualOffset::from_raw))
                .collect::<Result<_>>()?;

            references.push(reference);
        }

        // Trailing unplaced-read count is optional
        let mut tail = [0u8; 8];
        let unplaced = match reader.read_exact(&mut tail) {
            Ok(()) => Some(u64::from_le_bytes(tail)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            references,
            unplaced,
        })
    }

    /// Build an index by scanning a coordinate-sorted BAM file.
    pub fn build_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BamReader::from_path(path)?;
        let mut builder = BaiBuilder::new(reader.header().reference_count());
        let mut record = Record::new();
        loop {
            let start = reader.virtual_offset();
            if !reader.read_record_into(&mut record)? {
                break;
            }
            let end = reader.virtual_offset();
            builder.push(&record, Chunk::new(start, end))?;
        }
        Ok(builder.finish())
    }

    /// Number of references covered.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Index data for one reference.
    pub fn reference(&self, id: usize) -> Option<&ReferenceIndex> {
        self.references.get(id)
    }

    /// Reads without a coordinate, if recorded.
    pub fn unplaced_count(&self) -> Option<u64> {
        self.unplaced
    }

    /// Serialize in BAI format.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(BAI_MAGIC)?;
        writer.write_all(&(self.references.len() as i32).to_le_bytes())?;

        for reference in &self.references {
            let n_bin = reference.bins.len() + reference.metadata.is_some() as usize;
            writer.write_all(&(n_bin as i32).to_le_bytes())?;
            for (bin_id, chunks) in &reference.bins {
                writer.write_all(&bin_id.to_le_bytes())?;
                writer.write_all(&(chunks.len() as i32).to_le_bytes())?;
                for chunk in chunks {
                    writer.write_all(&chunk.start.as_raw().to_le_bytes())?;
                    writer.write_all(&chunk.end.as_raw().to_le_bytes())?;
                }
            }
            if let Some(meta) = &reference.metadata {
                writer.write_all(&METADATA_BIN.to_le_bytes())?;
                writer.write_all(&2i32.to_le_bytes())?;
                for value in [meta.start.as_raw(), meta.end.as_raw(), meta.mapped, meta.unmapped] {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }

            writer.write_all(&(reference.intervals.len() as i32).to_le_bytes())?;
            for offset in &reference.intervals {
                writer.write_all(&offset.as_raw().to_le_bytes())?;
            }
        }

        if let Some(unplaced) = self.unplaced {
            writer.write_all(&unplaced.to_le_bytes())?;
        }
        Ok(())
    }

    /// Write the index to a file.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Where the unmapped tail of the file begins.
    fn unplaced_start(&self) -> VirtualOffset {
        self.references
            .iter()
            .filter_map(ReferenceIndex::max_end)
            .max()
            .unwrap_or_default()
    }
}

impl RegionIndex for BaiIndex {
    fn chunks_for_region(
        &self,
        reference: Option<usize>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Option<Vec<Chunk>> {
        let Some(id) = reference else {
            return Some(vec![Chunk::new(self.unplaced_start(), VirtualOffset::MAX)]);
        };
        let reference = self.references.get(id)?;

        let beg = start.unwrap_or(0).max(0);
        let end = end.unwrap_or(MAX_COORDINATE).min(MAX_COORDINATE);
        if beg >= end {
            return Some(Vec::new());
        }

        let mut chunks: Vec<Chunk> = reg2bins(beg, end)
            .into_iter()
            .filter_map(|bin| reference.bins.get(&bin))
            .flatten()
            .copied()
            .collect();

        let min_offset = reference.min_offset(beg);
        chunks.retain(|chunk| chunk.end > min_offset);
        chunks.sort();
        Some(merge_chunks(&chunks))
    }

    fn mapped_read_count(&self, reference: Option<usize>) -> Option<u64> {
        match reference {
            None => Some(0),
            Some(id) => self
                .references
                .get(id)
                .map(|r| r.metadata.map(|m| m.mapped).unwrap_or(0)),
        }
    }

    fn unmapped_read_count(&self, reference: Option<usize>) -> Option<u64> {
        match reference {
            None => Some(self.unplaced.unwrap_or(0)),
            Some(id) => self
                .references
                .get(id)
                .map(|r| r.metadata.map(|m| m.unmapped).unwrap_or(0)),
        }
    }
}

/// Incremental BAI construction from records in file order.
pub struct BaiBuilder {
    references: Vec<ReferenceIndex>,
    /// Linear index under construction; `None` for windows with no records yet
    intervals: Vec<Vec<Option<VirtualOffset>>>,
    unplaced: u64,
    last: Option<(Option<usize>, i64)>,
}

impl BaiBuilder {
    /// Start an index for `reference_count` references.
    pub fn new(reference_count: usize) -> Self {
        Self {
            references: vec![ReferenceIndex::default(); reference_count],
            intervals: vec![Vec::new(); reference_count],
            unplaced: 0,
            last: None,
        }
    }

    /// Add a record occupying `chunk` in the BAM file.
    ///
    /// Records must arrive in coordinate order with unplaced reads last.
    pub fn push(&mut self, record: &Record, chunk: Chunk) -> Result<()> {
        let placed = record.reference_id.zip(record.position);

        if let (Some((id, pos)), Some((last_ref, last_pos))) = (placed, self.last) {
            let out_of_order = match last_ref {
                None => true,
                Some(prev) => id < prev || (id == prev && (pos as i64) < last_pos),
            };
            if out_of_order {
                return Err(AlignError::InvalidIndex(format!(
                    "Cannot index unsorted input: record '{}' is out of coordinate order",
                    record.name
                )));
            }
        }

        let Some((id, pos)) = placed else {
            self.unplaced += 1;
            self.last = Some((None, i64::MAX));
            return Ok(());
        };
        self.last = Some((Some(id), pos as i64));

        let reference = self.references.get_mut(id).ok_or_else(|| {
            AlignError::InvalidIndex(format!(
                "Record '{}' refers to reference {} beyond the header's dictionary",
                record.name, id
            ))
        })?;

        let chunks = reference.bins.entry(record.bin() as u32).or_default();
        match chunks.last_mut() {
            Some(last) if last.end == chunk.start => last.end = chunk.end,
            _ => chunks.push(chunk),
        }

        let meta = reference.metadata.get_or_insert(ReferenceMetadata {
            start: chunk.start,
            end: chunk.end,
            mapped: 0,
            unmapped: 0,
        });
        meta.end = chunk.end;
        if record.is_unmapped() {
            meta.unmapped += 1;
        } else {
            meta.mapped += 1;
        }

        let first_window = (pos as i64 >> LINEAR_SHIFT) as usize;
        let last_window = (record.alignment_end() >> LINEAR_SHIFT) as usize;
        let intervals = &mut self.intervals[id];
        if intervals.len() <= last_window {
            intervals.resize(last_window + 1, None);
        }
        for slot in &mut intervals[first_window..=last_window] {
            slot.get_or_insert(chunk.start);
        }
        Ok(())
    }

    /// Finish the index.
    pub fn finish(mut self) -> BaiIndex {
        for (reference, windows) in self.references.iter_mut().zip(self.intervals) {
            // Empty windows inherit the previous window's offset
            let mut previous = VirtualOffset::default();
            reference.intervals = windows
                .into_iter()
                .map(|slot| {
                    let offset = slot.unwrap_or(previous);
                    previous = offset;
                    offset
                })
                .collect();
        }
        BaiIndex {
            references: self.references,
            unplaced: Some(self.unplaced),
        }
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let value = read_u32(reader)? as i32;
    usize::try_from(value)
        .map_err(|_| AlignError::InvalidIndex(format!("Negative {} in BAI: {}", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::cigar::parse_cigar_string;
    use std::io::Cursor;

    fn vo(compressed: u64, within: u16) -> VirtualOffset {
        VirtualOffset::new(compressed, within)
    }

    fn record(reference_id: Option<usize>, position: Option<i32>, cigar: &str) -> Record {
        let mut r = Record::new();
        r.name = "r".into();
        r.reference_id = reference_id;
        r.position = position;
        r.cigar = parse_cigar_string(cigar).unwrap();
        if reference_id.is_none() {
            r.flags = crate::io::bam::record::flags::UNMAPPED;
        }
        r
    }

    /// Two references; chr1 has reads at 100 and 20_000, chr2 one read at 50,
    /// followed by two unplaced reads.
    fn sample_index() -> BaiIndex {
        let mut builder = BaiBuilder::new(2);
        builder
            .push(&record(Some(0), Some(100), "50M"), Chunk::new(vo(0, 100), vo(0, 200)))
            .unwrap();
        builder
            .push(&record(Some(0), Some(20_000), "50M"), Chunk::new(vo(0, 200), vo(500, 0)))
            .unwrap();
        builder
            .push(&record(Some(1), Some(50), "10M"), Chunk::new(vo(500, 0), vo(500, 80)))
            .unwrap();
        builder
            .push(&record(None, None, "*"), Chunk::new(vo(500, 80), vo(500, 160)))
            .unwrap();
        builder
            .push(&record(None, None, "*"), Chunk::new(vo(500, 160), vo(500, 240)))
            .unwrap();
        builder.finish()
    }

    #[test]
    fn test_reg2bins() {
        let bins = reg2bins(1000, 2000);
        assert_eq!(bins, vec![0, 1, 9, 73, 585, 4681]);

        let wide = reg2bins(0, 40_000);
        assert!(wide.contains(&4681) && wide.contains(&4682) && wide.contains(&4683));
        assert!(!wide.contains(&METADATA_BIN));
    }

    #[test]
    fn test_merge_chunks() {
        let chunks = vec![
            Chunk::new(vo(0, 0), vo(0, 100)),
            Chunk::new(vo(0, 100), vo(0, 200)),
            Chunk::new(vo(0, 150), vo(0, 180)),
            Chunk::new(vo(10, 0), vo(10, 5)),
        ];
        let merged = merge_chunks(&chunks);
        assert_eq!(
            merged,
            vec![Chunk::new(vo(0, 0), vo(0, 200)), Chunk::new(vo(10, 0), vo(10, 5))]
        );
    }

    #[test]
    fn test_query_uses_linear_index() {
        let index = sample_index();
        let all = index.chunks_for_region(Some(0), None, None).unwrap();
        assert_eq!(all, vec![Chunk::new(vo(0, 100), vo(500, 0))]);

        // Only the second read's bin overlaps window 1
        let late = index.chunks_for_region(Some(0), Some(20_000), Some(20_010)).unwrap();
        assert_eq!(late, vec![Chunk::new(vo(0, 200), vo(500, 0))]);

        assert_eq!(index.chunks_for_region(Some(0), Some(10), Some(10)), Some(vec![]));
        assert_eq!(index.chunks_for_region(Some(7), None, None), None);
    }

    #[test]
    fn test_unmapped_chunk_starts_after_mapped_data() {
        let index = sample_index();
        let chunks = index.chunks_for_region(None, None, None).unwrap();
        assert_eq!(chunks, vec![Chunk::new(vo(500, 80), VirtualOffset::MAX)]);
    }

    #[test]
    fn test_read_counts() {
        let index = sample_index();
        assert_eq!(index.mapped_read_count(Some(0)), Some(2));
        assert_eq!(index.mapped_read_count(Some(1)), Some(1));
        assert_eq!(index.mapped_read_count(Some(2)), None);
        assert_eq!(index.mapped_read_count(None), Some(0));
        assert_eq!(index.unmapped_read_count(Some(0)), Some(0));
        assert_eq!(index.unmapped_read_count(None), Some(2));
    }

    #[test]
    fn test_linear_index_fills_gaps() {
        let index = sample_index();
        let chr1 = index.reference(0).unwrap();
        // Windows 0 and 1 both point at the first read
        assert_eq!(chr1.intervals, vec![vo(0, 100), vo(0, 200)]);
    }

    #[test]
    fn test_write_then_parse() {
        let index = sample_index();
        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], BAI_MAGIC);

        let parsed = BaiIndex::parse(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_parse_without_unplaced_count() {
        let mut buf = Vec::new();
        buf.extend_from_slice(BAI_MAGIC);
        buf.extend_from_slice(&0i32.to_le_bytes());
        let index = BaiIndex::parse(&mut Cursor::new(buf)).unwrap();
        assert_eq!(index.reference_count(), 0);
        assert_eq!(index.unplaced_count(), None);
        assert_eq!(index.unmapped_read_count(None), Some(0));
    }

    #[test]
    fn test_bad_magic() {
        let err = BaiIndex::parse(&mut Cursor::new(b"BAM\x01\0\0\0\0".to_vec())).unwrap_err();
        assert!(matches!(err, AlignError::InvalidIndex(_)));
    }

    #[test]
    fn test_builder_rejects_unsorted_input() {
        let mut builder = BaiBuilder::new(1);
        builder
            .push(&record(Some(0), Some(500), "10M"), Chunk::new(vo(0, 0), vo(0, 50)))
            .unwrap();
        let err = builder
            .push(&record(Some(0), Some(100), "10M"), Chunk::new(vo(0, 50), vo(0, 100)))
            .unwrap_err();
        assert!(matches!(err, AlignError::InvalidIndex(_)));
    }
}
