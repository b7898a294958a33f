//! SAM text codec.
//!
//! Header lines start with `@`; each record is one line of 11 mandatory
//! tab-separated fields followed by optional `TAG:TYPE:VALUE` fields:
//!
//! ```text
//! QNAME FLAG RNAME POS MAPQ CIGAR RNEXT PNEXT TLEN SEQ QUAL [TAGS...]
//! ```
//!
//! POS and PNEXT are 1-based in text (0 = unplaced) and converted to the
//! 0-based coordinates of [`Record`]. QUAL is Phred+33.

use crate::error::{AlignError, Result};
use crate::io::bam::cigar::{format_cigar, parse_cigar_string};
use crate::io::bam::{Header, Record, Tags};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Phred quality offset used in SAM text.
const QUAL_OFFSET: u8 = 33;

/// Line-oriented SAM reader.
pub struct SamReader<R> {
    reader: R,
    line: String,
    line_number: u64,
}

impl<R: BufRead> SamReader<R> {
    /// Wrap a buffered reader positioned at the start of a SAM file.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
        }
    }

    /// True when no bytes remain.
    pub fn is_eof(&mut self) -> std::io::Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    /// Read all leading `@` lines into a header.
    pub fn read_header(&mut self) -> Result<Header> {
        let mut text = String::new();
        while self.reader.fill_buf()?.first() == Some(&b'@') {
            self.line.clear();
            self.reader.read_line(&mut self.line)?;
            self.line_number += 1;
            text.push_str(self.line.trim_end_matches(['\r', '\n']));
            text.push('\n');
        }
        Header::from_sam_text(text)
    }

    /// Read the next record line into `record`. Returns `Ok(false)` at end of file.
    pub fn read_record_into(&mut self, header: &Header, record: &mut Record) -> Result<bool> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(false);
            }
            self.line_number += 1;
            let line = self.line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if line.starts_with('@') {
                return Err(AlignError::InvalidRecord(format!(
                    "Header line after records at line {}",
                    self.line_number
                )));
            }
            parse_record_line(line, header, record).map_err(|e| match e {
                AlignError::InvalidRecord(msg) => {
                    AlignError::InvalidRecord(format!("line {}: {}", self.line_number, msg))
                }
                other => other,
            })?;
            return Ok(true);
        }
    }
}

impl SamReader<BufReader<File>> {
    /// Open a SAM file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

fn invalid(msg: String) -> AlignError {
    AlignError::InvalidRecord(msg)
}

fn parse_num<T: std::str::FromStr>(field: &str, name: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| invalid(format!("Invalid {} '{}'", name, field)))
}

fn parse_reference(field: &str, header: &Header) -> Result<Option<usize>> {
    if field == "*" {
        return Ok(None);
    }
    header
        .reference_id(field)
        .map(Some)
        .ok_or_else(|| invalid(format!("Reference '{}' is not in the header", field)))
}

/// 1-based text coordinate to 0-based; 0 means unplaced.
fn parse_position(field: &str, name: &str) -> Result<Option<i32>> {
    let pos: i32 = parse_num(field, name)?;
    match pos {
        0 => Ok(None),
        p if p > 0 => Ok(Some(p - 1)),
        p => Err(invalid(format!("Negative {} {}", name, p))),
    }
}

/// Parse one SAM record line.
pub fn parse_record_line(line: &str, header: &Header, record: &mut Record) -> Result<()> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 11 {
        return Err(invalid(format!(
            "Expected at least 11 fields, found {}",
            fields.len()
        )));
    }

    record.name = fields[0].to_string();
    record.flags = parse_num(fields[1], "FLAG")?;
    record.reference_id = parse_reference(fields[2], header)?;
    record.position = parse_position(fields[3], "POS")?;
    let mapq: u8 = parse_num(fields[4], "MAPQ")?;
    record.mapq = (mapq != 255).then_some(mapq);
    record.cigar = parse_cigar_string(fields[5])
        .map_err(|e| invalid(format!("Invalid CIGAR: {}", e)))?;
    record.mate_reference_id = match fields[6] {
        "=" => record.reference_id,
        other => parse_reference(other, header)?,
    };
    record.mate_position = parse_position(fields[7], "PNEXT")?;
    record.template_length = parse_num(fields[8], "TLEN")?;

    record.sequence.clear();
    if fields[9] != "*" {
        record.sequence.extend_from_slice(fields[9].as_bytes());
    }

    record.quality.clear();
    if fields[10] != "*" {
        let qual = fields[10].as_bytes();
        if qual.len() != record.sequence.len() {
            return Err(invalid(format!(
                "QUAL has {} scores for {} bases",
                qual.len(),
                record.sequence.len()
            )));
        }
        if qual.iter().any(|&q| q < QUAL_OFFSET) {
            return Err(invalid(format!("QUAL '{}' has characters below '!'", fields[10])));
        }
        record.quality.extend(qual.iter().map(|&q| q - QUAL_OFFSET));
    }

    record.tags = Tags::from_sam_fields(fields[11..].iter().copied())
        .map_err(|e| invalid(e.to_string()))?;
    Ok(())
}

/// Format one record as a SAM line (without the trailing newline).
pub fn format_record_line(header: &Header, record: &Record, line: &mut String) -> Result<()> {
    let reference_name = |id: Option<usize>| -> Result<&str> {
        match id {
            None => Ok("*"),
            Some(id) => header.reference_name(id).ok_or_else(|| {
                invalid(format!(
                    "Record '{}' refers to reference {} which is not in the header",
                    record.name, id
                ))
            }),
        }
    };

    let rname = reference_name(record.reference_id)?;
    let rnext = match record.mate_reference_id {
        Some(id) if record.reference_id == Some(id) => "=",
        other => reference_name(other)?,
    };

    let name = if record.name.is_empty() { "*" } else { &record.name };
    // Writing into a String cannot fail
    let _ = write!(
        line,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
        name,
        record.flags,
        rname,
        record.position.map(|p| p + 1).unwrap_or(0),
        record.mapq.unwrap_or(255),
        format_cigar(&record.cigar),
        rnext,
        record.mate_position.map(|p| p + 1).unwrap_or(0),
        record.template_length,
    );

    if record.sequence.is_empty() {
        line.push('*');
    } else {
        line.push_str(&String::from_utf8_lossy(&record.sequence));
    }
    line.push('\t');
    if record.quality.is_empty() {
        line.push('*');
    } else {
        line.extend(record.quality.iter().map(|&q| (q.min(93) + QUAL_OFFSET) as char));
    }

    let tags = record
        .tags
        .to_sam_fields()
        .map_err(|e| invalid(format!("Record '{}': {}", record.name, e)))?;
    for tag in tags {
        line.push('\t');
        line.push_str(&tag);
    }
    Ok(())
}

/// Line-oriented SAM writer.
pub struct SamWriter<W: Write> {
    writer: W,
    line: String,
}

impl<W: Write> SamWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            line: String::new(),
        }
    }

    /// Underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Write the header text, synthesizing `@SQ` lines when needed.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.writer.write_all(header.sam_text().as_bytes())?;
        Ok(())
    }

    /// Write one record line.
    pub fn write_record(&mut self, header: &Header, record: &Record) -> Result<()> {
        self.line.clear();
        format_record_line(header, record, &mut self.line)?;
        self.line.push('\n');
        self.writer.write_all(self.line.as_bytes())?;
        Ok(())
    }

    /// Flush buffered output.
    pub fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl SamWriter<BufWriter<File>> {
    /// Create a SAM file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAM: &str = "@HD\tVN:1.6\tSO:coordinate\n\
@SQ\tSN:chr1\tLN:1000\n\
@SQ\tSN:chr2\tLN:2000\n\
r001\t99\tchr1\t7\t30\t8M2I4M1D3M\t=\t37\t39\tTTAGATAAAGGATACTG\t*\tNM:i:1\n\
r002\t0\tchr2\t9\t30\t3S6M\t*\t0\t0\tAAAAGATAA\tABCDEFGHI\n\
\n\
r003\t4\t*\t0\t255\t*\t*\t0\t0\t*\t*\n";

    fn read_all(text: &str) -> (Header, Vec<Record>) {
        let mut reader = SamReader::new(Cursor::new(text.as_bytes().to_vec()));
        let header = reader.read_header().unwrap();
        let mut records = Vec::new();
        let mut record = Record::new();
        while reader.read_record_into(&header, &mut record).unwrap() {
            records.push(record.clone());
        }
        (header, records)
    }

    #[test]
    fn test_read_header_and_records() {
        let (header, records) = read_all(SAM);
        assert_eq!(header.reference_count(), 2);
        assert_eq!(header.sort_order(), Some("coordinate"));
        assert_eq!(records.len(), 3);

        let r1 = &records[0];
        assert_eq!(r1.reference_id, Some(0));
        assert_eq!(r1.position, Some(6));
        assert_eq!(r1.mate_reference_id, Some(0));
        assert_eq!(r1.mate_position, Some(36));
        assert_eq!(r1.template_length, 39);
        assert!(r1.quality.is_empty());
        assert_eq!(r1.tags.to_sam_fields().unwrap(), vec!["NM:i:1"]);

        let r2 = &records[1];
        assert_eq!(r2.reference_id, Some(1));
        assert_eq!(r2.quality[0], b'A' - 33);

        let r3 = &records[2];
        assert_eq!(r3.reference_id, None);
        assert_eq!(r3.position, None);
        assert_eq!(r3.mapq, None);
        assert!(r3.is_unmapped());
    }

    #[test]
    fn test_write_reproduces_input() {
        let (header, records) = read_all(SAM);
        let mut writer = SamWriter::new(Vec::new());
        writer.write_header(&header).unwrap();
        for record in &records {
            writer.write_record(&header, record).unwrap();
        }
        writer.finish().unwrap();

        let expected = SAM.replace("\n\n", "\n");
        assert_eq!(String::from_utf8(writer.get_ref().clone()).unwrap(), expected);
    }

    #[test]
    fn test_malformed_lines() {
        let header = Header::from_sam_text("@SQ\tSN:chr1\tLN:100\n").unwrap();
        let mut record = Record::new();

        let short = "r\t0\tchr1\t1\t30\t4M";
        assert!(parse_record_line(short, &header, &mut record).is_err());

        let unknown_ref = "r\t0\tchrZ\t1\t30\t4M\t*\t0\t0\tACGT\t*";
        assert!(parse_record_line(unknown_ref, &header, &mut record).is_err());

        let bad_qual = "r\t0\tchr1\t1\t30\t4M\t*\t0\t0\tACGT\tII";
        assert!(parse_record_line(bad_qual, &header, &mut record).is_err());

        let bad_flag = "r\tx\tchr1\t1\t30\t4M\t*\t0\t0\tACGT\t*";
        assert!(parse_record_line(bad_flag, &header, &mut record).is_err());
    }

    #[test]
    fn test_error_names_line_number() {
        let text = "@SQ\tSN:chr1\tLN:100\nr\t0\tchr1\t1\t30\tZZ\t*\t0\t0\t*\t*\n";
        let mut reader = SamReader::new(Cursor::new(text.as_bytes().to_vec()));
        let header = reader.read_header().unwrap();
        let err = reader
            .read_record_into(&header, &mut Record::new())
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_write_rejects_unknown_reference() {
        let header = Header::default();
        let mut record = Record::new();
        record.reference_id = Some(3);
        let mut line = String::new();
        assert!(format_record_line(&header, &record, &mut line).is_err());
    }

    #[test]
    fn test_empty_input_is_eof() {
        let mut reader = SamReader::new(Cursor::new(Vec::new()));
        assert!(reader.is_eof().unwrap());
        assert_eq!(reader.read_header().unwrap(), Header::default());
    }
}
