//! Auxiliary tag block.
//!
//! The block is walked lazily: a record view is created without looking at
//! it, and a malformed entry only surfaces as an error when a lookup reaches
//! it.

use crate::{Error, Result};

/// A decoded tag value borrowing from the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Char(u8),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    /// `Z` text without its terminator.
    String(&'a [u8]),
    /// `H` hex digits without the terminator.
    Hex(&'a [u8]),
    Array(Array<'a>),
}

impl<'a> Value<'a> {
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::UInt8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::UInt16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::UInt32(v) => Some(v.into()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            Value::String(s) | Value::Hex(s) => std::str::from_utf8(s).ok(),
            _ => None,
        }
    }
}

/// `B` array: element type byte plus packed little-endian elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Array<'a> {
    subtype: u8,
    count: usize,
    data: &'a [u8],
}

impl Array<'_> {
    pub fn subtype(&self) -> u8 {
        self.subtype
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Integer elements widened to `i64`; `None` for float arrays.
    pub fn to_ints(&self) -> Option<Vec<i64>> {
        let size = element_size(self.subtype)?;
        let chunks = self.data.chunks_exact(size);
        Some(match self.subtype {
            b'c' => chunks.map(|b| i64::from(b[0] as i8)).collect(),
            b'C' => chunks.map(|b| i64::from(b[0])).collect(),
            b's' => chunks.map(|b| i64::from(i16::from_le_bytes([b[0], b[1]]))).collect(),
            b'S' => chunks.map(|b| i64::from(u16::from_le_bytes([b[0], b[1]]))).collect(),
            b'i' => chunks.map(|b| i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))).collect(),
            b'I' => chunks.map(|b| i64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))).collect(),
            _ => return None,
        })
    }

    pub fn to_floats(&self) -> Option<Vec<f32>> {
        if self.subtype != b'f' {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }
}

fn element_size(subtype: u8) -> Option<usize> {
    match subtype {
        b'A' | b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        _ => None,
    }
}

/// Borrowed auxiliary block of one record.
#[derive(Debug, Clone, Copy)]
pub struct Tags<'a> {
    data: &'a [u8],
    /// Offset of the block inside its record.
    offset: u64,
}

impl<'a> Tags<'a> {
    pub(crate) fn new(data: &'a [u8], offset: u64) -> Self {
        Self { data, offset }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> TagIter<'a> {
        TagIter {
            data: self.data,
            pos: 0,
            offset: self.offset,
            failed: false,
        }
    }

    /// Value of `tag`, or `None` when the record does not carry it.
    pub fn get(&self, tag: [u8; 2]) -> Result<Option<Value<'a>>> {
        for entry in self.iter() {
            let (t, value) = entry?;
            if t == tag {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Text of a `Z` tag. A tag of another type counts as absent.
    pub fn get_string(&self, tag: [u8; 2]) -> Result<Option<&'a str>> {
        Ok(match self.get(tag)? {
            Some(v @ Value::String(_)) => v.as_str(),
            _ => None,
        })
    }

    pub fn read_group(&self) -> Result<Option<&'a str>> {
        self.get_string(*b"RG")
    }
}

/// Walks tag entries in order. Stops after the first malformed entry.
pub struct TagIter<'a> {
    data: &'a [u8],
    pos: usize,
    offset: u64,
    failed: bool,
}

impl<'a> TagIter<'a> {
    fn error(&self, at: usize, message: String) -> Error {
        Error::format(self.offset + at as u64, message)
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if available < n {
            return Err(self.error(
                self.pos,
                format!(
                    "truncated {}: expected {} bytes, found {}",
                    what, n, available
                ),
            ));
        }
        let data = self.data;
        let bytes = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_cstr(&mut self, what: &str) -> Result<&'a [u8]> {
        let data = self.data;
        let rest = &data[self.pos..];
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            self.error(
                self.pos,
                format!("unterminated {}: no NUL within {} bytes", what, rest.len()),
            )
        })?;
        self.pos += len + 1;
        Ok(&rest[..len])
    }

    fn read_entry(&mut self) -> Result<([u8; 2], Value<'a>)> {
        let start = self.pos;
        let head = self.take(3, "tag header")?;
        let tag = [head[0], head[1]];
        let ty = head[2];
        let value = match ty {
            b'A' => Value::Char(self.take(1, "char tag")?[0]),
            b'c' => Value::Int8(self.take(1, "int8 tag")?[0] as i8),
            b'C' => Value::UInt8(self.take(1, "uint8 tag")?[0]),
            b's' => {
                let b = self.take(2, "int16 tag")?;
                Value::Int16(i16::from_le_bytes([b[0], b[1]]))
            }
            b'S' => {
                let b = self.take(2, "uint16 tag")?;
                Value::UInt16(u16::from_le_bytes([b[0], b[1]]))
            }
            b'i' => {
                let b = self.take(4, "int32 tag")?;
                Value::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            b'I' => {
                let b = self.take(4, "uint32 tag")?;
                Value::UInt32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            b'f' => {
                let b = self.take(4, "float tag")?;
                Value::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            b'Z' => Value::String(self.take_cstr("string tag")?),
            b'H' => Value::Hex(self.take_cstr("hex tag")?),
            b'B' => {
                let sub = self.take(5, "array header")?;
                let subtype = sub[0];
                let count = u32::from_le_bytes([sub[1], sub[2], sub[3], sub[4]]) as usize;
                let size = element_size(subtype).filter(|_| subtype != b'A').ok_or_else(|| {
                    self.error(
                        self.pos - 5,
                        format!(
                            "bad array element type: expected one of cCsSiIf, found {:?}",
                            subtype as char
                        ),
                    )
                })?;
                let len = count.checked_mul(size).unwrap_or(usize::MAX);
                let data = self.take(len, "array tag")?;
                Value::Array(Array {
                    subtype,
                    count,
                    data,
                })
            }
            other => {
                return Err(self.error(
                    start + 2,
                    format!(
                        "bad tag type for {}{}: expected one of AcCsSiIfZHB, found {:?}",
                        tag[0] as char, tag[1] as char, other as char
                    ),
                ));
            }
        };
        Ok((tag, value))
    }
}

impl<'a> Iterator for TagIter<'a> {
    type Item = Result<([u8; 2], Value<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let entry = self.read_entry();
        self.failed = entry.is_err();
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TagBuilder;

    #[test]
    fn test_lookup_each_type() {
        let data = TagBuilder::new()
            .char(*b"XA", b'q')
            .int(*b"NM", 3)
            .string(*b"RG", "grp1")
            .int_array(*b"ZB", &[1, -2, 300])
            .float(*b"XF", 0.5)
            .build();
        let tags = Tags::new(&data, 0);

        assert_eq!(tags.get(*b"XA").unwrap(), Some(Value::Char(b'q')));
        assert_eq!(tags.get(*b"NM").unwrap().and_then(|v| v.as_int()), Some(3));
        assert_eq!(tags.read_group().unwrap(), Some("grp1"));
        assert_eq!(tags.get(*b"XF").unwrap(), Some(Value::Float(0.5)));
        match tags.get(*b"ZB").unwrap() {
            Some(Value::Array(array)) => {
                assert_eq!(array.subtype(), b'i');
                assert_eq!(array.len(), 3);
                assert_eq!(array.to_ints(), Some(vec![1, -2, 300]));
                assert_eq!(array.to_floats(), None);
            }
            other => panic!("unexpected value: {other:?}"),
        }
        assert_eq!(tags.get(*b"XX").unwrap(), None);
        assert_eq!(tags.iter().count(), 5);
    }

    #[test]
    fn test_missing_tag_is_not_an_error() {
        let tags = Tags::new(&[], 0);
        assert_eq!(tags.get(*b"RG").unwrap(), None);
        assert_eq!(tags.read_group().unwrap(), None);
    }

    #[test]
    fn test_unterminated_string() {
        let mut data = TagBuilder::new().int(*b"NM", 1).build();
        data.extend_from_slice(b"RGZabc");
        let tags = Tags::new(&data, 100);
        // entries before the bad one still resolve
        assert_eq!(tags.get(*b"NM").unwrap().and_then(|v| v.as_int()), Some(1));
        let err = tags.get(*b"RG").unwrap_err();
        match err {
            Error::Format { offset, message } => {
                assert_eq!(offset, 100 + 7 + 3);
                assert!(message.contains("unterminated string tag"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_array_overrun() {
        let mut data = b"ZBBi".to_vec();
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        let tags = Tags::new(&data, 0);
        assert!(tags.get(*b"ZB").unwrap_err().is_format());
        let mut iter = tags.iter();
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_unknown_type() {
        let tags = Tags::new(b"XXq\0", 0);
        let err = tags.get(*b"RG").unwrap_err();
        assert!(err.to_string().contains("found 'q'"));
    }
}
