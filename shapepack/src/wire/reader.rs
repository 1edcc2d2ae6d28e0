//! The borrowing MessagePack reader.

use core::fmt;
use core::str;

use bytes::Bytes;
use rancor::{fail, Error};

use super::{marker, structure_end, ValueKind};
use crate::context::SerializationContext;
use crate::raw::RawBytes;

#[derive(Debug)]
struct UnexpectedEof {
    pos: usize,
}

impl fmt::Display for UnexpectedEof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected end of input at offset {}", self.pos)
    }
}

impl core::error::Error for UnexpectedEof {}

#[derive(Debug)]
struct TypeMismatch {
    expected: &'static str,
    found: u8,
    pos: usize,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} but found marker {:#04x} at offset {}",
            self.expected, self.found, self.pos
        )
    }
}

impl core::error::Error for TypeMismatch {}

#[derive(Debug)]
struct InvalidMarker {
    pos: usize,
}

impl fmt::Display for InvalidMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reserved marker byte 0xc1 at offset {}", self.pos)
    }
}

impl core::error::Error for InvalidMarker {}

#[derive(Debug)]
struct IntOutOfRange {
    pos: usize,
}

impl fmt::Display for IntOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "integer does not fit the requested width at offset {}",
            self.pos
        )
    }
}

impl core::error::Error for IntOutOfRange {}

#[derive(Debug)]
struct BadUtf8 {
    pos: usize,
}

impl fmt::Display for BadUtf8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "string is not valid UTF-8 at offset {}", self.pos)
    }
}

impl core::error::Error for BadUtf8 {}

/// A positional MessagePack reader over a borrowed byte slice.
///
/// String and binary reads return spans borrowed from the input without
/// copying. When constructed through [`from_shared`](Self::from_shared) the
/// reader can additionally hand out refcounted [`RawBytes`] views of the
/// input buffer.
pub struct MsgPackReader<'a> {
    buf: &'a [u8],
    pos: usize,
    backing: Option<&'a Bytes>,
}

impl<'a> MsgPackReader<'a> {
    /// Creates a reader over a plain byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            backing: None,
        }
    }

    /// Creates a reader over a refcounted buffer, enabling zero-copy
    /// [`RawBytes`] extraction.
    pub fn from_shared(bytes: &'a Bytes) -> Self {
        Self {
            buf: bytes.as_ref(),
            pos: 0,
            backing: Some(bytes),
        }
    }

    /// Returns the current byte offset into the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn peek_byte(&self) -> Result<u8, Error> {
        match self.buf.get(self.pos) {
            Some(&b) => Ok(b),
            None => fail!(UnexpectedEof { pos: self.pos }),
        }
    }

    fn take_byte(&mut self) -> Result<u8, Error> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        match self.buf.get(self.pos..self.pos + len) {
            Some(bytes) => {
                self.pos += len;
                Ok(bytes)
            }
            None => fail!(UnexpectedEof { pos: self.buf.len() }),
        }
    }

    fn take_arr<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn mismatch<T>(&self, expected: &'static str, found: u8) -> Result<T, Error> {
        fail!(TypeMismatch {
            expected,
            found,
            pos: self.pos - 1,
        })
    }

    /// Classifies the next value without consuming anything.
    pub fn peek_kind(&self) -> Result<ValueKind, Error> {
        let m = self.peek_byte()?;
        match ValueKind::classify(m) {
            Some(kind) => Ok(kind),
            None => fail!(InvalidMarker { pos: self.pos }),
        }
    }

    /// Consumes a nil marker if one is next. Returns whether it did.
    pub fn try_read_nil(&mut self) -> Result<bool, Error> {
        if self.peek_byte()? == marker::NIL {
            self.pos += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Reads a nil marker.
    pub fn read_nil(&mut self) -> Result<(), Error> {
        match self.take_byte()? {
            marker::NIL => Ok(()),
            found => self.mismatch("nil", found),
        }
    }

    /// Reads a boolean.
    pub fn read_bool(&mut self) -> Result<bool, Error> {
        match self.take_byte()? {
            marker::FALSE => Ok(false),
            marker::TRUE => Ok(true),
            found => self.mismatch("a boolean", found),
        }
    }

    /// Reads any integer representation as an `i64`.
    pub fn read_int(&mut self) -> Result<i64, Error> {
        match self.take_byte()? {
            m @ (0x00..=0x7f) => Ok(i64::from(m)),
            m @ (0xe0..=0xff) => Ok(i64::from(m as i8)),
            marker::U8 => Ok(i64::from(self.take_byte()?)),
            marker::U16 => Ok(i64::from(u16::from_be_bytes(self.take_arr()?))),
            marker::U32 => Ok(i64::from(u32::from_be_bytes(self.take_arr()?))),
            marker::U64 => {
                let value = u64::from_be_bytes(self.take_arr()?);
                match i64::try_from(value) {
                    Ok(value) => Ok(value),
                    Err(_) => fail!(IntOutOfRange { pos: self.pos }),
                }
            }
            marker::I8 => Ok(i64::from(self.take_byte()? as i8)),
            marker::I16 => Ok(i64::from(i16::from_be_bytes(self.take_arr()?))),
            marker::I32 => Ok(i64::from(i32::from_be_bytes(self.take_arr()?))),
            marker::I64 => Ok(i64::from_be_bytes(self.take_arr()?)),
            found => self.mismatch("an integer", found),
        }
    }

    /// Reads any non-negative integer representation as a `u64`.
    pub fn read_uint(&mut self) -> Result<u64, Error> {
        match self.peek_byte()? {
            marker::U64 => {
                self.pos += 1;
                Ok(u64::from_be_bytes(self.take_arr()?))
            }
            _ => {
                let value = self.read_int()?;
                match u64::try_from(value) {
                    Ok(value) => Ok(value),
                    Err(_) => fail!(IntOutOfRange { pos: self.pos }),
                }
            }
        }
    }

    /// Reads a 32-bit float.
    pub fn read_f32(&mut self) -> Result<f32, Error> {
        match self.take_byte()? {
            marker::F32 => Ok(f32::from_be_bytes(self.take_arr()?)),
            found => self.mismatch("a 32-bit float", found),
        }
    }

    /// Reads a 64-bit float, widening a 32-bit one if that is what was
    /// written.
    pub fn read_f64(&mut self) -> Result<f64, Error> {
        match self.take_byte()? {
            marker::F32 => Ok(f64::from(f32::from_be_bytes(self.take_arr()?))),
            marker::F64 => Ok(f64::from_be_bytes(self.take_arr()?)),
            found => self.mismatch("a float", found),
        }
    }

    /// Reads a string as its raw UTF-8 span, borrowed from the input.
    pub fn read_str_bytes(&mut self) -> Result<&'a [u8], Error> {
        let len = match self.take_byte()? {
            m @ (0xa0..=0xbf) => usize::from(m & 0x1f),
            marker::STR8 => usize::from(self.take_byte()?),
            marker::STR16 => usize::from(u16::from_be_bytes(self.take_arr()?)),
            marker::STR32 => u32::from_be_bytes(self.take_arr()?) as usize,
            found => return self.mismatch("a string", found),
        };
        self.take(len)
    }

    /// Reads a string, validating UTF-8.
    pub fn read_str(&mut self) -> Result<&'a str, Error> {
        let start = self.pos;
        let bytes = self.read_str_bytes()?;
        match str::from_utf8(bytes) {
            Ok(s) => Ok(s),
            Err(_) => fail!(BadUtf8 { pos: start }),
        }
    }

    /// Reads a binary blob, borrowed from the input.
    pub fn read_bin(&mut self) -> Result<&'a [u8], Error> {
        let len = match self.take_byte()? {
            marker::BIN8 => usize::from(self.take_byte()?),
            marker::BIN16 => usize::from(u16::from_be_bytes(self.take_arr()?)),
            marker::BIN32 => u32::from_be_bytes(self.take_arr()?) as usize,
            found => return self.mismatch("a binary blob", found),
        };
        self.take(len)
    }

    /// Reads an array header, returning the element count.
    pub fn read_array_header(&mut self) -> Result<u32, Error> {
        match self.take_byte()? {
            m @ (0x90..=0x9f) => Ok(u32::from(m & 0x0f)),
            marker::ARRAY16 => Ok(u32::from(u16::from_be_bytes(self.take_arr()?))),
            marker::ARRAY32 => Ok(u32::from_be_bytes(self.take_arr()?)),
            found => self.mismatch("an array", found),
        }
    }

    /// Reads a map header, returning the entry count.
    pub fn read_map_header(&mut self) -> Result<u32, Error> {
        match self.take_byte()? {
            m @ (0x80..=0x8f) => Ok(u32::from(m & 0x0f)),
            marker::MAP16 => Ok(u32::from(u16::from_be_bytes(self.take_arr()?))),
            marker::MAP32 => Ok(u32::from_be_bytes(self.take_arr()?)),
            found => self.mismatch("a map", found),
        }
    }

    /// Skips one whole value of any type.
    pub fn skip(&mut self, ctx: &SerializationContext) -> Result<(), Error> {
        ctx.check_cancelled()?;
        match structure_end(&self.buf[self.pos..], self.pos)? {
            Some(len) => {
                self.pos += len;
                Ok(())
            }
            None => fail!(UnexpectedEof { pos: self.buf.len() }),
        }
    }

    /// Reads one whole value as an uninterpreted [`RawBytes`] span.
    ///
    /// With a shared backing buffer the result is an un-owned view into it;
    /// otherwise the span is copied out and the result is owned.
    pub fn read_raw(&mut self, ctx: &SerializationContext) -> Result<RawBytes, Error> {
        let start = self.pos;
        self.skip(ctx)?;
        let end = self.pos;
        match self.backing {
            Some(bytes) => Ok(RawBytes::view(bytes.slice(start..end))),
            None => Ok(RawBytes::copied(&self.buf[start..end])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_reads() {
        let buf = [0x2a, 0xc3, 0xd1, 0xff, 0x00, 0xa2, b'h', b'i'];
        let mut r = MsgPackReader::new(&buf);
        assert_eq!(r.read_int().unwrap(), 42);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_int().unwrap(), -256);
        assert_eq!(r.read_str().unwrap(), "hi");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn uint_rejects_negative() {
        let mut r = MsgPackReader::new(&[0xff]);
        let err = r.read_uint().unwrap_err();
        assert!(err.to_string().contains("requested width"));
    }

    #[test]
    fn mismatch_reports_offset() {
        let mut r = MsgPackReader::new(&[0xc0]);
        let err = r.read_array_header().unwrap_err();
        assert!(err.to_string().contains("expected an array"));
        assert!(err.to_string().contains("offset 0"));
    }

    #[test]
    fn skip_steps_over_nested_values() {
        // {"a": [1, 2]}, then 7
        let buf = [0x81, 0xa1, b'a', 0x92, 0x01, 0x02, 0x07];
        let ctx = SerializationContext::default();
        let mut r = MsgPackReader::new(&buf);
        r.skip(&ctx).unwrap();
        assert_eq!(r.read_int().unwrap(), 7);
    }
}
