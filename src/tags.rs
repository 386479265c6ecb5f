//! Decoding the auxiliary tag block of a BAM record.
//!
//! A tag block is a concatenation of entries with no length prefix for the block.
//! Each entry consists of a two-byte tag, a one-byte type code, and a value:
//!
//! | Type | Value |
//! |---|---|
//! | `A` | A single printable character. |
//! | `c` / `C` | Signed / unsigned 8-bit integer. |
//! | `s` / `S` | Signed / unsigned 16-bit integer. |
//! | `i` / `I` | Signed / unsigned 32-bit integer. |
//! | `f` | Single-precision float. |
//! | `d` | Double-precision float. |
//! | `Z` / `H` | NUL-terminated string / hex byte array. |
//! | `B` | Sub-type, 32-bit element count, and the elements. |
//!
//! Entries are rendered in the canonical `TAG:TYPE:VALUE` form used in SAM files.
//! All integer types are rendered with type `i`, and arrays are rendered as `B:<subtype>,<v0>,<v1>,...`.
//!
//! Decoding is lenient.
//! If an entry has an unknown type or its value would extend past the end of the block, iteration stops and the entries decoded so far are returned.
//! The decoder never reads past the end of the block.

use std::fmt::Display;
use std::io::Write;


//-----------------------------------------------------------------------------

/// A numeric element of a `B` array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    /// An integer of any width.
    Int(i64),
    /// A single-precision float.
    Float(f32),
    /// A double-precision float.
    Double(f64),
}

impl Number {
    // Decodes a little-endian value of the given type from a slice of the correct width.
    fn decode(type_code: u8, bytes: &[u8]) -> Option<Self> {
        let value = match type_code {
            b'c' => Number::Int(i8::from_le_bytes([bytes[0]]) as i64),
            b'C' => Number::Int(bytes[0] as i64),
            b's' => Number::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            b'S' => Number::Int(u16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            b'i' => Number::Int(i32::from_le_bytes(bytes[0..4].try_into().ok()?) as i64),
            b'I' => Number::Int(u32::from_le_bytes(bytes[0..4].try_into().ok()?) as i64),
            b'f' => Number::Float(f32::from_le_bytes(bytes[0..4].try_into().ok()?)),
            b'd' => Number::Double(f64::from_le_bytes(bytes[0..8].try_into().ok()?)),
            _ => return None,
        };
        Some(value)
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{}", value),
            Number::Float(value) => write!(f, "{}", value),
            Number::Double(value) => write!(f, "{}", value),
        }
    }
}

/// Returns the width in bytes of a numeric type, or [`None`] if the type is not numeric.
pub fn numeric_width(type_code: u8) -> Option<usize> {
    match type_code {
        b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        b'd' => Some(8),
        _ => None,
    }
}

//-----------------------------------------------------------------------------

/// The value of a tag entry.
///
/// String values borrow from the tag block.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue<'a> {
    /// A single printable character (`A`).
    Char(u8),
    /// An integer of any width (`cCsSiI`).
    Int(i64),
    /// A single-precision float (`f`).
    Float(f32),
    /// A double-precision float (`d`).
    Double(f64),
    /// A string (`Z`) without the terminator.
    String(&'a [u8]),
    /// A hex-encoded byte array (`H`) without the terminator.
    Hex(&'a [u8]),
    /// A numeric array (`B`) with its sub-type.
    Array(u8, Vec<Number>),
}

impl TagValue<'_> {
    /// Returns the type character used in the canonical text form.
    pub fn type_char(&self) -> u8 {
        match self {
            TagValue::Char(_) => b'A',
            TagValue::Int(_) => b'i',
            TagValue::Float(_) => b'f',
            TagValue::Double(_) => b'd',
            TagValue::String(_) => b'Z',
            TagValue::Hex(_) => b'H',
            TagValue::Array(_, _) => b'B',
        }
    }
}

/// A decoded tag entry.
///
/// # Examples
///
/// ```
/// use bamdb::tags::{self, TagEntry, TagValue};
///
/// let block = b"NMc\x05RGZgroup1\x00";
/// let entries: Vec<TagEntry> = tags::iter(block).collect();
/// assert_eq!(entries.len(), 2);
/// assert_eq!(entries[0], TagEntry { tag: *b"NM", value: TagValue::Int(5) });
/// assert_eq!(entries[0].to_string(), "NM:i:5");
/// assert_eq!(entries[1].to_string(), "RG:Z:group1");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TagEntry<'a> {
    /// Two-character tag.
    pub tag: [u8; 2],
    /// Decoded value.
    pub value: TagValue<'a>,
}

impl TagEntry<'_> {
    /// Appends the canonical `TAG:TYPE:VALUE` form to the buffer.
    ///
    /// String and byte array values are copied verbatim.
    pub fn append_to(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.tag[0]);
        buffer.push(self.tag[1]);
        buffer.push(b':');
        buffer.push(self.value.type_char());
        buffer.push(b':');
        match &self.value {
            TagValue::Char(value) => buffer.push(*value),
            TagValue::Int(value) => { let _ = write!(buffer, "{}", value); },
            TagValue::Float(value) => { let _ = write!(buffer, "{}", value); },
            TagValue::Double(value) => { let _ = write!(buffer, "{}", value); },
            TagValue::String(value) | TagValue::Hex(value) => buffer.extend_from_slice(value),
            TagValue::Array(sub_type, values) => {
                buffer.push(*sub_type);
                for value in values.iter() {
                    let _ = write!(buffer, ",{}", value);
                }
            },
        }
    }
}

impl Display for TagEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut buffer: Vec<u8> = Vec::new();
        self.append_to(&mut buffer);
        write!(f, "{}", String::from_utf8_lossy(&buffer))
    }
}

//-----------------------------------------------------------------------------

/// An iterator over the entries in a tag block.
///
/// The iterator is cheap to clone, and a clone restarts from the same position.
/// Iteration stops at the end of the block, when fewer than 4 bytes remain, or at the first malformed entry.
/// See [`TagIter::is_malformed`] for distinguishing the last case.
#[derive(Clone, Debug)]
pub struct TagIter<'a> {
    data: &'a [u8],
    offset: usize,
    malformed: bool,
}

/// Entries need a tag, a type, and at least one byte of value.
const MIN_ENTRY_SIZE: usize = 4;

impl<'a> TagIter<'a> {
    /// Creates a new iterator over the tag block.
    pub fn new(data: &'a [u8]) -> Self {
        TagIter { data, offset: 0, malformed: false }
    }

    /// Returns the offset of the first byte that has not been consumed.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` if iteration stopped at an entry that could not be decoded.
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    // Returns the next `len` bytes and advances the cursor, or `None` if there are not enough bytes.
    fn take(&self, cursor: &mut usize, len: usize) -> Option<&'a [u8]> {
        let end = cursor.checked_add(len)?;
        let bytes = self.data.get(*cursor..end)?;
        *cursor = end;
        Some(bytes)
    }

    // Returns the bytes until the next NUL or the end of the block and moves past the terminator.
    fn take_string(&self, cursor: &mut usize) -> &'a [u8] {
        let rest = &self.data[*cursor..];
        match rest.iter().position(|&byte| byte == 0) {
            Some(len) => {
                *cursor += len + 1;
                &rest[..len]
            },
            None => {
                *cursor = self.data.len();
                rest
            },
        }
    }

    fn decode_value(&self, type_code: u8, cursor: &mut usize) -> Option<TagValue<'a>> {
        match type_code {
            b'A' => {
                let bytes = self.take(cursor, 1)?;
                Some(TagValue::Char(bytes[0]))
            },
            b'c' | b'C' | b's' | b'S' | b'i' | b'I' | b'f' | b'd' => {
                let width = numeric_width(type_code)?;
                let bytes = self.take(cursor, width)?;
                match Number::decode(type_code, bytes)? {
                    Number::Int(value) => Some(TagValue::Int(value)),
                    Number::Float(value) => Some(TagValue::Float(value)),
                    Number::Double(value) => Some(TagValue::Double(value)),
                }
            },
            b'Z' => Some(TagValue::String(self.take_string(cursor))),
            b'H' => Some(TagValue::Hex(self.take_string(cursor))),
            b'B' => {
                let sub_type = self.take(cursor, 1)?[0];
                let width = numeric_width(sub_type)?;
                let count = self.take(cursor, 4)?;
                let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize;
                let bytes = self.take(cursor, count.checked_mul(width)?)?;
                let mut values = Vec::with_capacity(count);
                for element in bytes.chunks_exact(width) {
                    values.push(Number::decode(sub_type, element)?);
                }
                Some(TagValue::Array(sub_type, values))
            },
            _ => None,
        }
    }
}

impl<'a> Iterator for TagIter<'a> {
    type Item = TagEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.malformed || self.offset + MIN_ENTRY_SIZE > self.data.len() {
            return None;
        }

        let tag = [self.data[self.offset], self.data[self.offset + 1]];
        let type_code = self.data[self.offset + 2];
        let mut cursor = self.offset + 3;
        match self.decode_value(type_code, &mut cursor) {
            Some(value) => {
                self.offset = cursor;
                Some(TagEntry { tag, value })
            },
            None => {
                self.malformed = true;
                None
            },
        }
    }
}

//-----------------------------------------------------------------------------

/// Returns an iterator over the entries in the tag block.
pub fn iter(data: &[u8]) -> TagIter<'_> {
    TagIter::new(data)
}

/// Decodes the tag block into canonical `TAG:TYPE:VALUE` strings in block order.
///
/// Invalid UTF-8 in string values is replaced with U+FFFD.
///
/// # Examples
///
/// ```
/// use bamdb::tags;
///
/// let mut block: Vec<u8> = b"XXBi".to_vec();
/// block.extend_from_slice(&3u32.to_le_bytes());
/// for value in [1i32, -2, 3] {
///     block.extend_from_slice(&value.to_le_bytes());
/// }
/// assert_eq!(tags::decode(&block), vec![String::from("XX:B:i,1,-2,3")]);
/// ```
pub fn decode(data: &[u8]) -> Vec<String> {
    iter(data).map(|entry| entry.to_string()).collect()
}

/// Appends the decoded tag block to the buffer, with entries separated by tabs.
///
/// String values are copied verbatim.
/// Returns the exhausted iterator, which tells how much of the block was decoded.
pub fn append_tags<'a>(buffer: &mut Vec<u8>, data: &'a [u8]) -> TagIter<'a> {
    let mut entries = iter(data);
    for (i, entry) in entries.by_ref().enumerate() {
        if i > 0 {
            buffer.push(b'\t');
        }
        entry.append_to(buffer);
    }
    entries
}

/// Returns the decoded tag block as a single string with entries separated by tabs.
pub fn to_text(data: &[u8]) -> String {
    let mut buffer: Vec<u8> = Vec::new();
    append_tags(&mut buffer, data);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Returns the first entry with the given tag, or [`None`] if there is no such entry before the end of the decodable part.
pub fn find_tag(data: &[u8], tag: [u8; 2]) -> Option<TagEntry<'_>> {
    iter(data).find(|entry| entry.tag == tag)
}

//-----------------------------------------------------------------------------
