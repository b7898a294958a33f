//! Optional alignment fields (auxiliary tags).
//!
//! Tags are kept in their raw BAM encoding so that BAM → BAM copies are
//! byte-exact. Conversion to and from the SAM `TAG:TYPE:VALUE` text form is
//! done on demand by the SAM codec.
//!
//! # BAM Format
//!
//! Each tag is encoded as:
//! - 2 bytes: tag name (e.g., "NM")
//! - 1 byte: value type (`A`, `c`, `C`, `s`, `S`, `i`, `I`, `f`, `Z`, `H`, `B`)
//! - N bytes: value (`Z`/`H` NUL-terminated, `B` = subtype + u32 count + values)

use super::error::BamDecodeError;
use std::io;

/// Raw auxiliary data of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    data: Vec<u8>,
}

impl Tags {
    /// Create empty tags.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Wrap raw BAM tag bytes.
    pub fn from_raw(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Raw BAM tag bytes.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Check if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the raw tag data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Remove all tags.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Parse SAM `TAG:TYPE:VALUE` fields into raw BAM tags.
    pub fn from_sam_fields<'a, I>(fields: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tags = Tags::new();
        for field in fields {
            tags.push_sam_field(field)?;
        }
        Ok(tags)
    }

    /// Append one SAM `TAG:TYPE:VALUE` field.
    pub fn push_sam_field(&mut self, field: &str) -> io::Result<()> {
        let mut parts = field.splitn(3, ':');
        let (name, ty, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(t), Some(v)) if n.len() == 2 && t.len() == 1 => (n, t, v),
            _ => {
                return Err(invalid(format!("Malformed optional field '{}'", field)));
            }
        };
        let name = name.as_bytes();
        let ty = ty.as_bytes()[0];
        let out = &mut self.data;
        out.extend_from_slice(name);

        match ty {
            b'A' => {
                if value.len() != 1 {
                    return Err(invalid(format!("Tag {} of type A needs one character", field)));
                }
                out.push(b'A');
                out.push(value.as_bytes()[0]);
            }
            b'i' => {
                let v: i64 = value
                    .parse()
                    .map_err(|_| invalid(format!("Invalid integer in tag '{}'", field)))?;
                push_smallest_int(out, v)
                    .ok_or_else(|| invalid(format!("Integer out of range in tag '{}'", field)))?;
            }
            b'f' => {
                let v: f32 = value
                    .parse()
                    .map_err(|_| invalid(format!("Invalid float in tag '{}'", field)))?;
                out.push(b'f');
                out.extend_from_slice(&v.to_le_bytes());
            }
            b'Z' | b'H' => {
                out.push(ty);
                out.extend_from_slice(value.as_bytes());
                out.push(0);
            }
            b'B' => push_array(out, value)
                .ok_or_else(|| invalid(format!("Invalid array in tag '{}'", field)))?,
            other => {
                return Err(BamDecodeError::InvalidTagType {
                    tag: [name[0], name[1]],
                    type_code: other,
                }
                .into())
            }
        }
        Ok(())
    }

    /// Render every tag as a SAM `TAG:TYPE:VALUE` field.
    pub fn to_sam_fields(&self) -> io::Result<Vec<String>> {
        let mut cursor = Cursor {
            data: &self.data,
            pos: 0,
        };
        let mut fields = Vec::new();

        while cursor.remaining() > 0 {
            let name = cursor.take(2, "tag name")?;
            let name = format!("{}{}", name[0] as char, name[1] as char);
            let ty = cursor.take(1, "tag type")?[0];
            let field = match ty {
                b'A' => format!("{}:A:{}", name, cursor.take(1, "A value")?[0] as char),
                b'c' | b'C' | b's' | b'S' | b'i' | b'I' => {
                    format!("{}:i:{}", name, cursor.int(ty)?)
                }
                b'f' => format!("{}:f:{}", name, cursor.float()?),
                b'Z' | b'H' => {
                    let text = cursor.cstr(&name)?;
                    format!("{}:{}:{}", name, ty as char, text)
                }
                b'B' => {
                    let subtype = cursor.take(1, "array subtype")?[0];
                    let count = cursor.u32()?;
                    let mut text = format!("{}:B:{}", name, subtype as char);
                    for _ in 0..count {
                        text.push(',');
                        if subtype == b'f' {
                            text.push_str(&cursor.float()?.to_string());
                        } else if int_width(subtype).is_some() {
                            text.push_str(&cursor.int(subtype)?.to_string());
                        } else {
                            return Err(BamDecodeError::InvalidArraySubtype { subtype }.into());
                        }
                    }
                    text
                }
                other => {
                    let raw = name.as_bytes();
                    return Err(BamDecodeError::InvalidTagType {
                        tag: [raw[0], raw[1]],
                        type_code: other,
                    }
                    .into());
                }
            };
            fields.push(field);
        }
        Ok(fields)
    }
}

/// Copy raw tag bytes out of a BAM record.
pub fn parse_tags(data: &[u8]) -> io::Result<Tags> {
    Ok(Tags::from_raw(data.to_vec()))
}

fn invalid(message: String) -> io::Error {
    BamDecodeError::InvalidData { message }.into()
}

/// Byte width of an integer type code.
fn int_width(ty: u8) -> Option<usize> {
    match ty {
        b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' => Some(4),
        _ => None,
    }
}

/// Encode a SAM `i` value with the narrowest BAM integer type.
fn push_smallest_int(out: &mut Vec<u8>, v: i64) -> Option<()> {
    if v < 0 {
        if v >= i8::MIN as i64 {
            out.push(b'c');
            out.push(v as i8 as u8);
        } else if v >= i16::MIN as i64 {
            out.push(b's');
            out.extend_from_slice(&(v as i16).to_le_bytes());
        } else if v >= i32::MIN as i64 {
            out.push(b'i');
            out.extend_from_slice(&(v as i32).to_le_bytes());
        } else {
            return None;
        }
    } else if v <= u8::MAX as i64 {
        out.push(b'C');
        out.push(v as u8);
    } else if v <= u16::MAX as i64 {
        out.push(b'S');
        out.extend_from_slice(&(v as u16).to_le_bytes());
    } else if v <= u32::MAX as i64 {
        out.push(b'I');
        out.extend_from_slice(&(v as u32).to_le_bytes());
    } else {
        return None;
    }
    Some(())
}

/// Encode a SAM `B` value such as `c,1,-2,3` or `f,0.5`.
fn push_array(out: &mut Vec<u8>, value: &str) -> Option<()> {
    let mut items = value.split(',');
    let subtype = items.next()?.as_bytes();
    if subtype.len() != 1 {
        return None;
    }
    let subtype = subtype[0];
    let values: Vec<&str> = items.collect();

    out.push(b'B');
    out.push(subtype);
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for item in values {
        match subtype {
            b'c' => out.push(item.parse::<i8>().ok()? as u8),
            b'C' => out.push(item.parse::<u8>().ok()?),
            b's' => out.extend_from_slice(&item.parse::<i16>().ok()?.to_le_bytes()),
            b'S' => out.extend_from_slice(&item.parse::<u16>().ok()?.to_le_bytes()),
            b'i' => out.extend_from_slice(&item.parse::<i32>().ok()?.to_le_bytes()),
            b'I' => out.extend_from_slice(&item.parse::<u32>().ok()?.to_le_bytes()),
            b'f' => out.extend_from_slice(&item.parse::<f32>().ok()?.to_le_bytes()),
            _ => return None,
        }
    }
    Some(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &str) -> io::Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(BamDecodeError::UnexpectedEof {
                context: context.to_string(),
                expected: n,
                actual: self.remaining(),
            }
            .into());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> io::Result<u32> {
        let b = self.take(4, "array count")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn float(&mut self) -> io::Result<f32> {
        let b = self.take(4, "float value")?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn int(&mut self, ty: u8) -> io::Result<i64> {
        let width = int_width(ty).unwrap_or(4);
        let b = self.take(width, "integer value")?;
        let v = match ty {
            b'c' => b[0] as i8 as i64,
            b'C' => b[0] as i64,
            b's' => i16::from_le_bytes([b[0], b[1]]) as i64,
            b'S' => u16::from_le_bytes([b[0], b[1]]) as i64,
            b'i' => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
            _ => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
        };
        Ok(v)
    }

    fn cstr(&mut self, tag: &str) -> io::Result<String> {
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            io::Error::from(BamDecodeError::MissingNulTerminator {
                field: format!("tag {}", tag),
                offset: self.pos,
            })
        })?;
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(text)
    }
}
