//! Alignment record and its BAM binary encoding.
//!
//! # Binary Format
//!
//! ```text
//! BAM Record (binary, little-endian):
//! - block_size (int32): Total record size in bytes (excluding this field)
//! - refID (int32): Reference sequence ID (-1 for unmapped)
//! - pos (int32): 0-based leftmost position (-1 for unmapped)
//! - l_read_name (uint8): Length of read name (includes null terminator)
//! - mapq (uint8): Mapping quality (255 = unavailable)
//! - bin (uint16): BAI index bin
//! - n_cigar_op (uint16): Number of CIGAR operations
//! - flag (uint16): Bitwise FLAGS
//! - l_seq (int32): Sequence length
//! - next_refID (int32): Reference ID of mate/next read
//! - next_pos (int32): Position of mate/next read
//! - tlen (int32): Template length
//! - read_name (char[l_read_name]): Null-terminated read name
//! - cigar (uint32[n_cigar_op]): CIGAR operations
//! - seq (uint8[(l_seq+1)/2]): 4-bit encoded sequence
//! - qual (char[l_seq]): Phred quality scores (0xFF fill = absent)
//! - tags: Optional tags (variable length)
//! ```

use super::cigar::{encode_cigar, parse_cigar, reference_length, CigarOp};
use super::error::BamDecodeError;
use super::index::reg2bin;
use super::sequence::{decode_sequence, encode_sequence};
use super::tags::{parse_tags, Tags};
use std::io::{self, Read};

/// SAM flag bits.
pub mod flags {
    /// Template has multiple segments
    pub const PAIRED: u16 = 0x1;
    /// Each segment properly aligned
    pub const PROPER_PAIR: u16 = 0x2;
    /// Segment unmapped
    pub const UNMAPPED: u16 = 0x4;
    /// Next segment unmapped
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Sequence is reverse complemented
    pub const REVERSE: u16 = 0x10;
    /// Next segment reverse complemented
    pub const MATE_REVERSE: u16 = 0x20;
    /// First segment in the template
    pub const FIRST_IN_PAIR: u16 = 0x40;
    /// Last segment in the template
    pub const SECOND_IN_PAIR: u16 = 0x80;
    /// Secondary alignment
    pub const SECONDARY: u16 = 0x100;
    /// Not passing quality controls
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Fixed-size portion of a record after `block_size`.
const FIXED_LEN: usize = 32;

fn read_i32_le(data: &[u8], cursor: &mut usize) -> io::Result<i32> {
    let bytes = take(data, cursor, 4, "i32")?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u16_le(data: &[u8], cursor: &mut usize) -> io::Result<u16> {
    let bytes = take(data, cursor, 2, "u16")?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u8(data: &[u8], cursor: &mut usize) -> io::Result<u8> {
    Ok(take(data, cursor, 1, "u8")?[0])
}

fn take<'a>(data: &'a [u8], cursor: &mut usize, n: usize, context: &str) -> io::Result<&'a [u8]> {
    let end = cursor.checked_add(n).filter(|&end| end <= data.len());
    match end {
        Some(end) => {
            let slice = &data[*cursor..end];
            *cursor = end;
            Ok(slice)
        }
        None => Err(BamDecodeError::UnexpectedEof {
            context: format!("{} at offset {}", context, *cursor),
            expected: n,
            actual: data.len().saturating_sub(*cursor),
        }
        .into()),
    }
}

/// Only -1 (unmapped) and non-negative IDs are legal.
fn parse_reference_id(ref_id: i32, field_name: &str) -> io::Result<Option<usize>> {
    match ref_id {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        invalid => Err(BamDecodeError::InvalidReferenceId {
            value: invalid,
            field: field_name.to_string(),
        }
        .into()),
    }
}

/// Alignment record.
///
/// Shared by the SAM and BAM codecs. Coordinates are 0-based; quality scores
/// are raw Phred values (not ASCII-offset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Read name/query name
    pub name: String,

    /// Reference sequence ID; `None` places the record on the unmapped
    /// pseudo-reference
    pub reference_id: Option<usize>,

    /// 0-based leftmost mapping position; `None` when unplaced
    pub position: Option<i32>,

    /// Mapping quality; `None` when unavailable (255)
    pub mapq: Option<u8>,

    /// Bitwise FLAGS (see [`flags`])
    pub flags: u16,

    /// Mate/next segment reference ID
    pub mate_reference_id: Option<usize>,

    /// Mate/next segment position
    pub mate_position: Option<i32>,

    /// Template length (TLEN)
    pub template_length: i32,

    /// Sequence bases (ASCII)
    pub sequence: Vec<u8>,

    /// Phred quality scores; empty when absent
    pub quality: Vec<u8>,

    /// CIGAR operations
    pub cigar: Vec<CigarOp>,

    /// Optional tags
    pub tags: Tags,
}

impl Record {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            reference_id: None,
            position: None,
            mapq: None,
            flags: 0,
            mate_reference_id: None,
            mate_position: None,
            template_length: 0,
            sequence: Vec::new(),
            quality: Vec::new(),
            cigar: Vec::new(),
            tags: Tags::new(),
        }
    }

    /// Reset every field so the record can be reused.
    pub fn clear(&mut self) {
        self.name.clear();
        self.reference_id = None;
        self.position = None;
        self.mapq = None;
        self.flags = 0;
        self.mate_reference_id = None;
        self.mate_position = None;
        self.template_length = 0;
        self.sequence.clear();
        self.quality.clear();
        self.cigar.clear();
        self.tags.clear();
    }

    /// Check if the read is unmapped.
    pub fn is_unmapped(&self) -> bool {
        self.flags & flags::UNMAPPED != 0
    }

    /// Check if the read is paired.
    pub fn is_paired(&self) -> bool {
        self.flags & flags::PAIRED != 0
    }

    /// Check if both segments are properly aligned.
    pub fn is_proper_pair(&self) -> bool {
        self.flags & flags::PROPER_PAIR != 0
    }

    /// Check if the read is a reverse complement.
    pub fn is_reverse_complement(&self) -> bool {
        self.flags & flags::REVERSE != 0
    }

    /// Check if this is a secondary alignment.
    pub fn is_secondary(&self) -> bool {
        self.flags & flags::SECONDARY != 0
    }

    /// Check if this is a supplementary alignment.
    pub fn is_supplementary(&self) -> bool {
        self.flags & flags::SUPPLEMENTARY != 0
    }

    /// Check if the read is marked as a duplicate.
    pub fn is_duplicate(&self) -> bool {
        self.flags & flags::DUPLICATE != 0
    }

    /// Check if the read failed quality controls.
    pub fn is_qc_fail(&self) -> bool {
        self.flags & flags::QC_FAIL != 0
    }

    /// Get sequence length.
    pub fn sequence_length(&self) -> usize {
        self.sequence.len()
    }

    /// 0-based leftmost position, -1 when unplaced.
    pub fn alignment_start(&self) -> i64 {
        self.position.map(i64::from).unwrap_or(-1)
    }

    /// 0-based inclusive position of the last aligned reference base.
    ///
    /// Never less than the start; records without reference-consuming
    /// operations end where they start.
    pub fn alignment_end(&self) -> i64 {
        let start = self.alignment_start();
        let span = reference_length(&self.cigar) as i64;
        (start + span - 1).max(start)
    }

    /// BAI bin covering the alignment.
    pub fn bin(&self) -> u16 {
        let start = self.alignment_start();
        if start < 0 {
            // Unplaced reads go in the bin for [-1, 0)
            return reg2bin(-1, 0);
        }
        reg2bin(start, self.alignment_end() + 1)
    }

    /// Number of aligned read bases (M, =, X) inside `[start, end)`.
    ///
    /// `None` bounds are open.
    pub fn overlapping_bases(&self, start: Option<i64>, end: Option<i64>) -> u64 {
        let Some(pos) = self.position else {
            return 0;
        };
        let lo = start.unwrap_or(i64::MIN);
        let hi = end.unwrap_or(i64::MAX);

        let mut ref_pos = pos as i64;
        let mut count = 0u64;
        for op in &self.cigar {
            let len = op.length() as i64;
            if op.is_aligned() {
                let from = ref_pos.max(lo);
                let to = (ref_pos + len).min(hi);
                if to > from {
                    count += (to - from) as u64;
                }
            }
            if op.consumes_reference() {
                ref_pos += len;
            }
        }
        count
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a BAM record (including its leading `block_size`).
pub fn parse_record(data: &[u8]) -> io::Result<Record> {
    let mut record = Record::new();
    parse_record_into(data, &mut record)?;
    Ok(record)
}

/// Decode a BAM record into an existing [`Record`].
pub fn parse_record_into(data: &[u8], record: &mut Record) -> io::Result<()> {
    if data.len() < FIXED_LEN + 4 {
        return Err(BamDecodeError::InvalidData {
            message: format!("Record too short: {} bytes (minimum 36)", data.len()),
        }
        .into());
    }

    let mut cursor = 4;
    let ref_id = read_i32_le(data, &mut cursor)?;
    let pos = read_i32_le(data, &mut cursor)?;

    let l_read_name = read_u8(data, &mut cursor)?;
    if l_read_name == 0 {
        return Err(BamDecodeError::InvalidReadNameLength {
            length: l_read_name,
            offset: cursor - 1,
        }
        .into());
    }

    let mapq = read_u8(data, &mut cursor)?;
    let _bin = read_u16_le(data, &mut cursor)?;
    let n_cigar_op = read_u16_le(data, &mut cursor)? as usize;
    let flag = read_u16_le(data, &mut cursor)?;

    let l_seq = read_i32_le(data, &mut cursor)?;
    if l_seq < 0 {
        return Err(BamDecodeError::NegativeSequenceLength { length: l_seq }.into());
    }
    let l_seq = l_seq as usize;

    let next_ref_id = read_i32_le(data, &mut cursor)?;
    let next_pos = read_i32_le(data, &mut cursor)?;
    let tlen = read_i32_le(data, &mut cursor)?;

    let name_offset = cursor;
    let name_bytes = take(data, &mut cursor, l_read_name as usize, "read name")?;
    let name_bytes = match name_bytes.split_last() {
        Some((0, rest)) => rest,
        _ => {
            return Err(BamDecodeError::MissingNulTerminator {
                field: "read name".to_string(),
                offset: name_offset,
            }
            .into())
        }
    };
    if name_bytes.contains(&0) {
        return Err(BamDecodeError::InvalidData {
            message: format!("Embedded NUL in read name at offset {}", name_offset),
        }
        .into());
    }
    let name = String::from_utf8(name_bytes.to_vec()).map_err(|source| {
        BamDecodeError::InvalidUtf8 {
            field: "read name".to_string(),
            source,
        }
    })?;

    let cigar_bytes = take(data, &mut cursor, n_cigar_op * 4, "CIGAR")?;
    let cigar = parse_cigar(cigar_bytes, n_cigar_op)?;

    let seq_bytes = take(data, &mut cursor, l_seq.div_ceil(2), "sequence")?;
    let sequence = decode_sequence(seq_bytes, l_seq)?;

    let quality_bytes = take(data, &mut cursor, l_seq, "quality scores")?;
    let quality = if quality_bytes.first() == Some(&0xFF) {
        Vec::new()
    } else {
        quality_bytes.to_vec()
    };

    record.name = name;
    record.reference_id = parse_reference_id(ref_id, "read")?;
    record.position = (pos >= 0).then_some(pos);
    record.mapq = (mapq != 255).then_some(mapq);
    record.flags = flag;
    record.mate_reference_id = parse_reference_id(next_ref_id, "mate")?;
    record.mate_position = (next_pos >= 0).then_some(next_pos);
    record.template_length = tlen;
    record.sequence = sequence;
    record.quality = quality;
    record.cigar = cigar;
    record.tags = parse_tags(&data[cursor..])?;
    Ok(())
}

fn encode_error(message: String) -> io::Error {
    BamDecodeError::InvalidData { message }.into()
}

fn reference_id_to_i32(id: Option<usize>) -> io::Result<i32> {
    match id {
        None => Ok(-1),
        Some(id) => i32::try_from(id)
            .map_err(|_| encode_error(format!("Reference ID {} out of range", id))),
    }
}

/// Append the BAM encoding of `record` (with `block_size`) to `buf`.
pub fn encode_record(record: &Record, buf: &mut Vec<u8>) -> io::Result<()> {
    let name: &[u8] = if record.name.is_empty() {
        b"*"
    } else {
        record.name.as_bytes()
    };
    if name.len() > 254 {
        return Err(encode_error(format!(
            "Read name of {} bytes exceeds the 254-byte limit",
            name.len()
        )));
    }
    if record.cigar.len() > u16::MAX as usize {
        return Err(BamDecodeError::CigarCountOverflow {
            count: record.cigar.len(),
        }
        .into());
    }
    if !record.quality.is_empty() && record.quality.len() != record.sequence.len() {
        return Err(encode_error(format!(
            "Read {}: {} quality scores for {} bases",
            record.name,
            record.quality.len(),
            record.sequence.len()
        )));
    }

    let start = buf.len();
    buf.extend_from_slice(&0i32.to_le_bytes()); // block_size, patched below
    buf.extend_from_slice(&reference_id_to_i32(record.reference_id)?.to_le_bytes());
    buf.extend_from_slice(&record.position.unwrap_or(-1).to_le_bytes());
    buf.push((name.len() + 1) as u8);
    buf.push(record.mapq.unwrap_or(255));
    buf.extend_from_slice(&record.bin().to_le_bytes());
    buf.extend_from_slice(&(record.cigar.len() as u16).to_le_bytes());
    buf.extend_from_slice(&record.flags.to_le_bytes());
    buf.extend_from_slice(&(record.sequence.len() as i32).to_le_bytes());
    buf.extend_from_slice(&reference_id_to_i32(record.mate_reference_id)?.to_le_bytes());
    buf.extend_from_slice(&record.mate_position.unwrap_or(-1).to_le_bytes());
    buf.extend_from_slice(&record.template_length.to_le_bytes());
    buf.extend_from_slice(name);
    buf.push(0);
    encode_cigar(&record.cigar, buf);
    encode_sequence(&record.sequence, buf);
    if record.quality.is_empty() {
        buf.resize(buf.len() + record.sequence.len(), 0xFF);
    } else {
        buf.extend_from_slice(&record.quality);
    }
    buf.extend_from_slice(record.tags.as_raw());

    let block_size = (buf.len() - start - 4) as i32;
    buf[start..start + 4].copy_from_slice(&block_size.to_le_bytes());
    Ok(())
}

/// Read the next record's raw bytes (including `block_size`) into `buf`.
///
/// Returns `Ok(false)` on a clean end of stream, i.e. no bytes at all
/// before the next record. A record cut short anywhere is `InvalidData`.
pub fn read_record_bytes<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    let mut block_size_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < block_size_bytes.len() {
        match reader.read(&mut block_size_bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(encode_error(format!(
                    "Truncated record: stream ended after {} of 4 block size bytes",
                    filled
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let block_size = i32::from_le_bytes(block_size_bytes);
    if block_size < FIXED_LEN as i32 {
        return Err(encode_error(format!("Invalid block size: {}", block_size)));
    }

    buf.clear();
    buf.extend_from_slice(&block_size_bytes);
    buf.resize(block_size as usize + 4, 0);
    reader.read_exact(&mut buf[4..]).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => encode_error(format!(
            "Truncated record: block size {} but the stream ended early",
            block_size
        )),
        _ => e,
    })?;
    Ok(true)
}

/// Read and decode a single BAM record; `Ok(None)` at end of stream.
pub fn read_record<R: Read>(reader: &mut R) -> io::Result<Option<Record>> {
    let mut buf = Vec::new();
    if !read_record_bytes(reader, &mut buf)? {
        return Ok(None);
    }
    parse_record(&buf).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::cigar::parse_cigar_string;

    fn mapped(name: &str, reference_id: usize, position: i32, cigar: &str) -> Record {
        let mut record = Record::new();
        record.name = name.to_string();
        record.reference_id = Some(reference_id);
        record.position = Some(position);
        record.mapq = Some(60);
        record.cigar = parse_cigar_string(cigar).unwrap();
        record
    }

    /// Minimal unmapped record laid out by hand.
    fn minimal_bytes(ref_id: i32, next_ref_id: i32, l_read_name: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&37i32.to_le_bytes());
        data.extend_from_slice(&ref_id.to_le_bytes());
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.push(l_read_name);
        data.push(255);
        data.extend_from_slice(&4680u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&next_ref_id.to_le_bytes());
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(b"read\0");
        data
    }

    #[test]
    fn test_record_flags() {
        let mut record = Record::new();
        record.flags = flags::UNMAPPED;
        assert!(record.is_unmapped());
        assert!(!record.is_paired());

        record.flags = flags::PAIRED | flags::PROPER_PAIR | flags::DUPLICATE;
        assert!(record.is_paired());
        assert!(record.is_proper_pair());
        assert!(record.is_duplicate());
        assert!(!record.is_secondary());
    }

    #[test]
    fn test_parse_minimal_record() {
        let record = parse_record(&minimal_bytes(-1, -1, 5)).unwrap();
        assert_eq!(record.name, "read");
        assert_eq!(record.reference_id, None);
        assert_eq!(record.position, None);
        assert_eq!(record.mapq, None);
        assert!(record.is_unmapped());
        assert!(record.sequence.is_empty());
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_invalid_reference_ids() {
        let err = parse_record(&minimal_bytes(-2, -1, 5)).unwrap_err();
        assert!(err.to_string().contains("read reference id -2"));

        let err = parse_record(&minimal_bytes(0, -7, 5)).unwrap_err();
        assert!(err.to_string().contains("mate reference id -7"));
    }

    #[test]
    fn test_zero_read_name_length() {
        assert!(parse_record(&minimal_bytes(-1, -1, 0)).is_err());
    }

    #[test]
    fn test_truncated_record() {
        let data = minimal_bytes(-1, -1, 5);
        let err = parse_record(&data[..data.len() - 2]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_encode_then_decode() {
        let mut record = mapped("r001", 1, 99, "5S20M2I10M");
        record.flags = flags::PAIRED | flags::FIRST_IN_PAIR;
        record.mate_reference_id = Some(1);
        record.mate_position = Some(300);
        record.template_length = 250;
        record.sequence = b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTA".to_vec();
        record.quality = vec![30; record.sequence.len()];
        record.tags = Tags::from_sam_fields(["NM:i:2", "RG:Z:grp"]).unwrap();

        let mut buf = Vec::new();
        encode_record(&record, &mut buf).unwrap();
        let block_size = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(block_size + 4, buf.len());

        assert_eq!(parse_record(&buf).unwrap(), record);
    }

    #[test]
    fn test_missing_quality_uses_ff_fill() {
        let mut record = mapped("r", 0, 0, "4M");
        record.sequence = b"ACGT".to_vec();

        let mut buf = Vec::new();
        encode_record(&record, &mut buf).unwrap();
        assert!(buf.ends_with(&[0xFF; 4]));
        assert!(parse_record(&buf).unwrap().quality.is_empty());
    }

    #[test]
    fn test_encode_rejects_bad_records() {
        let mut record = mapped(&"x".repeat(300), 0, 0, "4M");
        assert!(encode_record(&record, &mut Vec::new()).is_err());

        record.name = "ok".into();
        record.sequence = b"ACGT".to_vec();
        record.quality = vec![30; 3];
        assert!(encode_record(&record, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_alignment_end() {
        assert_eq!(mapped("a", 0, 100, "50M").alignment_end(), 149);
        assert_eq!(mapped("a", 0, 100, "10S20M5D20M3I").alignment_end(), 144);
        // No reference-consuming operations: ends at the start
        assert_eq!(mapped("a", 0, 100, "*").alignment_end(), 100);
        assert_eq!(mapped("a", 0, 100, "30S").alignment_end(), 100);
    }

    #[test]
    fn test_bin() {
        assert_eq!(Record::new().bin(), 4680);
        assert_eq!(mapped("a", 0, 0, "100M").bin(), 4681);
        // Spans a 16 kb boundary
        assert_eq!(mapped("a", 0, 16_380, "10M").bin(), 585);
    }

    #[test]
    fn test_overlapping_bases() {
        // Aligned blocks: [100,110) and [115,125)
        let record = mapped("a", 0, 100, "3S10M5D10M2I");
        assert_eq!(record.overlapping_bases(None, None), 20);
        assert_eq!(record.overlapping_bases(Some(105), Some(120)), 5 + 5);
        assert_eq!(record.overlapping_bases(Some(110), Some(115)), 0);
        assert_eq!(record.overlapping_bases(Some(200), None), 0);
        assert_eq!(Record::new().overlapping_bases(None, None), 0);
    }

    #[test]
    fn test_read_record_stream() {
        let first = mapped("one", 0, 10, "5M");
        let second = mapped("two", 0, 20, "5M");
        let mut buf = Vec::new();
        encode_record(&first, &mut buf).unwrap();
        encode_record(&second, &mut buf).unwrap();

        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_record(&mut cursor).unwrap().unwrap().name, "one");
        assert_eq!(read_record(&mut cursor).unwrap().unwrap().name, "two");
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_read_record_cut_short() {
        let mut buf = Vec::new();
        encode_record(&mapped("one", 0, 10, "5M"), &mut buf).unwrap();
        let whole = buf.len();

        // inside the block size prefix
        buf.extend_from_slice(&[0x40, 0x00]);
        let mut cursor = io::Cursor::new(buf.clone());
        assert!(read_record(&mut cursor).unwrap().is_some());
        let err = read_record(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("2 of 4"));

        // inside the record body
        let mut cursor = io::Cursor::new(buf[..whole - 3].to_vec());
        let err = read_record(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
