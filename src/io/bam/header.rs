//! Alignment header: SAM header text plus the reference dictionary.
//!
//! The same [`Header`] serves both containers. SAM carries only the text
//! (references come from `@SQ` lines); BAM additionally stores the
//! dictionary in binary form:
//!
//! ```text
//! BAM Header:
//! - 4 bytes: Magic ("BAM\1")
//! - 4 bytes: SAM header text length (l_text, int32)
//! - l_text bytes: SAM header text
//! - 4 bytes: Number of reference sequences (n_ref, int32)
//! - For each reference:
//!   - 4 bytes: Reference name length (l_name, int32, includes null terminator)
//!   - l_name bytes: Reference name (null-terminated)
//!   - 4 bytes: Reference length (int32)
//! ```

use crate::error::{AlignError, Result};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};

/// BAM magic bytes.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Reference sequence (chromosome/contig) name and length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference sequence name (e.g., "chr1", "chrM")
    pub name: String,
    /// Reference sequence length in bases
    pub length: u32,
}

impl Reference {
    /// Create a new reference.
    pub fn new(name: impl Into<String>, length: u32) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Alignment file header.
///
/// The reference dictionary is only reachable through methods so the
/// name→id map stays in step with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// SAM header text (includes @HD, @SQ, @RG, @PG lines)
    pub text: String,
    references: Vec<Reference>,
    ids: HashMap<String, usize>,
}

impl Header {
    /// Create a new header.
    pub fn new(text: String, references: Vec<Reference>) -> Self {
        // first occurrence wins for duplicate names; validate() rejects them
        let mut ids = HashMap::with_capacity(references.len());
        for (id, r) in references.iter().enumerate() {
            ids.entry(r.name.clone()).or_insert(id);
        }
        Self {
            text,
            references,
            ids,
        }
    }

    /// Reference dictionary in id order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Build a header from SAM text, taking the dictionary from `@SQ` lines.
    pub fn from_sam_text(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let mut references = Vec::new();
        for line in text.lines().filter(|l| l.starts_with("@SQ")) {
            let name = header_field(line, "SN").ok_or_else(|| {
                AlignError::InvalidHeader(format!("@SQ line without SN: '{}'", line))
            })?;
            let length = header_field(line, "LN")
                .and_then(|ln| ln.parse::<u32>().ok())
                .ok_or_else(|| {
                    AlignError::InvalidHeader(format!("@SQ line without valid LN: '{}'", line))
                })?;
            references.push(Reference::new(name, length));
        }
        Ok(Self::new(text, references))
    }

    /// Clear text and references.
    pub fn clear(&mut self) {
        self.text.clear();
        self.references.clear();
        self.ids.clear();
    }

    /// Get reference by ID.
    pub fn reference(&self, id: usize) -> Option<&Reference> {
        self.references.get(id)
    }

    /// Get reference name by ID.
    pub fn reference_name(&self, id: usize) -> Option<&str> {
        self.reference(id).map(|r| r.name.as_str())
    }

    /// Look up a reference ID by name.
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    /// Name used in messages: the reference name, or `*` when unmapped or unknown.
    pub fn reference_label(&self, id: Option<usize>) -> &str {
        id.and_then(|id| self.reference_name(id)).unwrap_or("*")
    }

    /// Get number of reference sequences.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Value of `SO` on the `@HD` line, if present.
    pub fn sort_order(&self) -> Option<&str> {
        self.text
            .lines()
            .find(|l| l.starts_with("@HD"))
            .and_then(|l| header_field(l, "SO"))
    }

    /// Header text suitable for a SAM file.
    ///
    /// BAM headers may keep the dictionary only in binary form; in that case
    /// `@SQ` lines are synthesized so the text stays self-describing.
    pub fn sam_text(&self) -> String {
        let mut text = self.text.clone();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        let has_sq = text.lines().any(|l| l.starts_with("@SQ"));
        if !has_sq {
            for r in &self.references {
                text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", r.name, r.length));
            }
        }
        text
    }

    /// Check structural validity before writing.
    ///
    /// Every line must be `@XX` followed by `TAG:VALUE` fields (`@CO` is free
    /// text), `@SQ` needs `SN` and `LN`, and reference names are unique.
    pub fn validate(&self) -> Result<()> {
        for line in self.text.lines().filter(|l| !l.is_empty()) {
            let bytes = line.as_bytes();
            let well_formed_type = bytes.len() >= 3
                && bytes[0] == b'@'
                && bytes[1].is_ascii_alphabetic()
                && bytes[2].is_ascii_alphabetic()
                && (bytes.len() == 3 || bytes[3] == b'\t');
            if !well_formed_type {
                return Err(AlignError::InvalidHeader(format!(
                    "Malformed header line: '{}'",
                    line
                )));
            }
            if line.starts_with("@CO") {
                continue;
            }
            for field in line.split('\t').skip(1) {
                let fb = field.as_bytes();
                if fb.len() < 3 || fb[2] != b':' {
                    return Err(AlignError::InvalidHeader(format!(
                        "Malformed field '{}' in header line '{}'",
                        field, line
                    )));
                }
            }
            if line.starts_with("@SQ") {
                let ln = header_field(line, "LN").and_then(|v| v.parse::<i64>().ok());
                if header_field(line, "SN").is_none() || !matches!(ln, Some(1..=0x7FFF_FFFF)) {
                    return Err(AlignError::InvalidHeader(format!(
                        "@SQ line needs SN and a positive LN: '{}'",
                        line
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for r in &self.references {
            if r.name.is_empty() || !seen.insert(r.name.as_str()) {
                return Err(AlignError::InvalidHeader(format!(
                    "Empty or duplicate reference name '{}'",
                    r.name
                )));
            }
        }
        Ok(())
    }
}

/// Value of `TAG` in a tab-separated header line.
fn header_field<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.split('\t').skip(1).find_map(|field| {
        field
            .strip_prefix(tag)
            .and_then(|rest| rest.strip_prefix(':'))
    })
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Read and validate BAM magic bytes.
pub fn read_magic<R: Read>(reader: &mut R) -> io::Result<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != BAM_MAGIC {
        return Err(invalid_data(format!(
            "Invalid BAM magic: expected {:?}, got {:?}",
            BAM_MAGIC, magic
        )));
    }
    Ok(())
}

/// Read the length-prefixed SAM header text.
pub fn read_header_text<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_i32(reader)?;
    if len < 0 {
        return Err(invalid_data(format!("Invalid SAM header length: {}", len)));
    }
    let mut text_bytes = vec![0u8; len as usize];
    reader.read_exact(&mut text_bytes)?;

    // Some writers pad the text with NULs
    while text_bytes.last() == Some(&0) {
        text_bytes.pop();
    }
    String::from_utf8(text_bytes)
        .map_err(|e| invalid_data(format!("Invalid UTF-8 in SAM header: {}", e)))
}

/// Read a single binary reference entry.
pub fn read_reference<R: Read>(reader: &mut R) -> io::Result<Reference> {
    let name_len = read_i32(reader)?;
    if name_len <= 0 {
        return Err(invalid_data(format!(
            "Invalid reference name length: {}",
            name_len
        )));
    }

    let mut name_bytes = vec![0u8; name_len as usize];
    reader.read_exact(&mut name_bytes)?;
    if name_bytes.pop() != Some(0) {
        return Err(invalid_data("Reference name not null-terminated".to_string()));
    }
    let name = String::from_utf8(name_bytes)
        .map_err(|e| invalid_data(format!("Invalid UTF-8 in reference name: {}", e)))?;

    let length = read_i32(reader)?;
    if length < 0 {
        return Err(invalid_data(format!("Invalid reference length: {}", length)));
    }
    Ok(Reference::new(name, length as u32))
}

/// Read the binary reference dictionary.
pub fn read_references<R: Read>(reader: &mut R) -> io::Result<Vec<Reference>> {
    let count = read_i32(reader)?;
    if count < 0 {
        return Err(invalid_data(format!("Invalid reference count: {}", count)));
    }

    let mut references = Vec::with_capacity(count as usize);
    for i in 0..count {
        let reference = read_reference(reader)
            .map_err(|e| invalid_data(format!("Error reading reference {}: {}", i, e)))?;
        references.push(reference);
    }
    Ok(references)
}

/// Read a complete BAM header.
pub fn read_header<R: Read>(reader: &mut R) -> io::Result<Header> {
    read_magic(reader)?;
    let text = read_header_text(reader)?;
    let references = read_references(reader)?;
    Ok(Header::new(text, references))
}

/// Write a complete BAM header.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> io::Result<()> {
    writer.write_all(BAM_MAGIC)?;
    writer.write_all(&(header.text.len() as i32).to_le_bytes())?;
    writer.write_all(header.text.as_bytes())?;
    writer.write_all(&(header.references.len() as i32).to_le_bytes())?;
    for r in &header.references {
        writer.write_all(&(r.name.len() as i32 + 1).to_le_bytes())?;
        writer.write_all(r.name.as_bytes())?;
        writer.write_all(&[0])?;
        writer.write_all(&(r.length as i32).to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TEXT: &str = "@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:2000\n@CO\tfree text: anything\n";

    #[test]
    fn test_read_magic() {
        assert!(read_magic(&mut Cursor::new(b"BAM\x01extra")).is_ok());
        assert!(read_magic(&mut Cursor::new(b"BAMX")).is_err());
    }

    #[test]
    fn test_read_reference() {
        let mut data = vec![5, 0, 0, 0];
        data.extend_from_slice(b"chr1\0");
        data.extend_from_slice(&248956422u32.to_le_bytes());

        let reference = read_reference(&mut Cursor::new(data)).unwrap();
        assert_eq!(reference, Reference::new("chr1", 248956422));
    }

    #[test]
    fn test_reference_name_without_nul() {
        let mut data = vec![4, 0, 0, 0];
        data.extend_from_slice(b"chr1");
        data.extend_from_slice(&10u32.to_le_bytes());
        assert!(read_reference(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn test_binary_header_write_then_read() {
        let header = Header::from_sam_text(TEXT).unwrap();
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        assert_eq!(&buf[..4], BAM_MAGIC);

        let parsed = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_from_sam_text() {
        let header = Header::from_sam_text(TEXT).unwrap();
        assert_eq!(header.reference_count(), 2);
        assert_eq!(header.reference_id("chr2"), Some(1));
        assert_eq!(header.reference_id("chrX"), None);
        assert_eq!(header.sort_order(), Some("coordinate"));

        assert!(Header::from_sam_text("@SQ\tSN:chr1\n").is_err());
    }

    #[test]
    fn test_reference_id_lookup() {
        let refs = || vec![Reference::new("chr1", 10), Reference::new("chrM", 20)];

        let from_parts = Header::new(String::new(), refs());
        assert_eq!(from_parts.reference_id("chrM"), Some(1));
        assert_eq!(from_parts.reference_id("chr2"), None);

        let from_text = Header::from_sam_text(TEXT).unwrap();
        assert_eq!(from_text.reference_id("chr2"), Some(1));
        assert_eq!(from_text.reference_id("chr1"), Some(0));

        let mut buf = Vec::new();
        write_header(&mut buf, &from_parts).unwrap();
        let mut from_binary = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(from_binary.reference_id("chrM"), Some(1));
        assert_eq!(from_binary.references(), &refs()[..]);

        from_binary.clear();
        assert_eq!(from_binary.reference_id("chr1"), None);

        let many: Vec<Reference> = (0..50_000)
            .map(|i| Reference::new(format!("contig{}", i), 100))
            .collect();
        let large = Header::new(String::new(), many);
        assert_eq!(large.reference_id("contig49999"), Some(49_999));

        let duplicated = Header::new(
            String::new(),
            vec![Reference::new("chr1", 1), Reference::new("chr1", 2)],
        );
        assert_eq!(duplicated.reference_id("chr1"), Some(0));
    }

    #[test]
    fn test_reference_label() {
        let header = Header::from_sam_text(TEXT).unwrap();
        assert_eq!(header.reference_label(Some(0)), "chr1");
        assert_eq!(header.reference_label(None), "*");
        assert_eq!(header.reference_label(Some(9)), "*");
    }

    #[test]
    fn test_sort_order_absent() {
        let header = Header::from_sam_text("@HD\tVN:1.6\n").unwrap();
        assert_eq!(header.sort_order(), None);
        assert_eq!(Header::default().sort_order(), None);
    }

    #[test]
    fn test_validate() {
        assert!(Header::from_sam_text(TEXT).unwrap().validate().is_ok());
        assert!(Header::default().validate().is_ok());

        let bad_line = Header::new("HD\tVN:1.6\n".into(), vec![]);
        assert!(bad_line.validate().is_err());

        let bad_field = Header::new("@HD\tVN1.6\n".into(), vec![]);
        assert!(bad_field.validate().is_err());

        let zero_length = Header::new("@SQ\tSN:chr1\tLN:0\n".into(), vec![]);
        assert!(zero_length.validate().is_err());

        let duplicate = Header::new(
            String::new(),
            vec![Reference::new("chr1", 10), Reference::new("chr1", 20)],
        );
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn test_sam_text_synthesizes_sq_lines() {
        let header = Header::new("@HD\tVN:1.6".into(), vec![Reference::new("chr1", 10)]);
        assert_eq!(header.sam_text(), "@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:10\n");

        let with_sq = Header::from_sam_text(TEXT).unwrap();
        assert_eq!(with_sq.sam_text(), TEXT);
    }
}
