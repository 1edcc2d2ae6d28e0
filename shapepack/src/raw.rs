//! The uninterpreted raw-value carrier.

use async_trait::async_trait;
use bytes::Bytes;
use rancor::Error;

use crate::context::SerializationContext;
use crate::converter::Converter;
use crate::wire::{
    structure_end, MsgPackAsyncReader, MsgPackReader, MsgPackWriter, READ_BUDGET,
};

/// One whole MessagePack value carried as its encoded bytes.
///
/// Decoding produces a `RawBytes` that shares the input buffer when the
/// input is refcounted; [`make_owned`](Self::make_owned) promotes it to a
/// private copy that outlives any input buffer. Encoding blits the stored
/// bytes back verbatim, so whatever the producer wrote passes through
/// untouched.
///
/// Equality is byte-wise; ownership does not participate.
#[derive(Clone, Debug)]
pub struct RawBytes {
    bytes: Bytes,
    owned: bool,
}

impl RawBytes {
    /// Wraps pre-encoded MessagePack bytes the caller vouches for, taking
    /// ownership of the allocation.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            owned: true,
        }
    }

    /// Wraps a view that shares a producing buffer's allocation.
    pub(crate) fn view(bytes: Bytes) -> Self {
        Self {
            bytes,
            owned: false,
        }
    }

    /// Copies a span into a fresh private allocation.
    pub(crate) fn copied(bytes: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(bytes),
            owned: true,
        }
    }

    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the backing storage is a private copy rather than a view of
    /// a producing buffer.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Promotes the value to a private copy of its bytes. Idempotent: an
    /// already-owned value is left untouched.
    pub fn make_owned(&mut self) {
        if !self.owned {
            self.bytes = Bytes::copy_from_slice(&self.bytes);
            self.owned = true;
        }
    }
}

impl Default for RawBytes {
    /// An owned raw nil value.
    fn default() -> Self {
        Self {
            bytes: Bytes::from_static(&[0xc0]),
            owned: true,
        }
    }
}

impl PartialEq for RawBytes {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for RawBytes {}

impl AsRef<[u8]> for RawBytes {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Reads one whole value without interpreting it; writes the stored bytes
/// back verbatim.
pub(crate) struct RawBytesConverter;

#[async_trait]
impl Converter<RawBytes> for RawBytesConverter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<RawBytes, Error> {
        reader.read_raw(ctx)
    }

    fn write(
        &self,
        value: &RawBytes,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_raw(value.as_bytes());
        Ok(())
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<RawBytes, Error> {
        reader.fill_structures(1, READ_BUDGET, ctx).await?;
        let len = match structure_end(reader.buffered(), reader.position())? {
            Some(len) => len,
            // fill_structures only returns once a whole structure is
            // buffered, so the span is always delimited here.
            None => unreachable!("fill_structures returned without a whole structure"),
        };
        Ok(RawBytes::view(reader.take_shared(len)))
    }

    fn prefer_async(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_owned_is_idempotent() {
        let backing = Bytes::from_static(&[0x92, 0x01, 0x02]);
        let mut raw = RawBytes::view(backing.slice(..));
        assert!(!raw.is_owned());

        raw.make_owned();
        assert!(raw.is_owned());
        let first = raw.as_bytes().as_ptr();

        raw.make_owned();
        assert!(raw.is_owned());
        assert_eq!(raw.as_bytes().as_ptr(), first);
    }

    #[test]
    fn equality_is_byte_wise() {
        let a = RawBytes::new(vec![0x2a]);
        let b = RawBytes::copied(&[0x2a]);
        let mut c = RawBytes::view(Bytes::from_static(&[0x2a]));
        assert_eq!(a, b);
        assert_eq!(a, c);
        c.make_owned();
        assert_eq!(a, c);
    }

    #[test]
    fn decode_borrows_from_shared_input() {
        let buf = {
            let mut out = Vec::new();
            let mut w = MsgPackWriter::new(&mut out);
            w.write_array_header(2);
            w.write_int(1);
            w.write_str("x");
            out
        };
        let shared = Bytes::from(buf.clone());
        let mut ctx = SerializationContext::default();

        let mut reader = MsgPackReader::from_shared(&shared);
        let raw = RawBytesConverter.read(&mut reader, &mut ctx).unwrap();
        assert!(!raw.is_owned());
        assert_eq!(raw.as_bytes(), &buf[..]);

        let mut reader = MsgPackReader::new(&buf);
        let raw = RawBytesConverter.read(&mut reader, &mut ctx).unwrap();
        assert!(raw.is_owned());
        assert_eq!(raw.as_bytes(), &buf[..]);
    }

    #[test]
    fn write_blits_verbatim() {
        let raw = RawBytes::new(vec![0x81, 0xa1, b'k', 0x07]);
        let mut ctx = SerializationContext::default();
        let mut out = Vec::new();
        RawBytesConverter
            .write(&raw, &mut MsgPackWriter::new(&mut out), &mut ctx)
            .unwrap();
        assert_eq!(out, raw.as_bytes());
    }
}
