//! The buffering async MessagePack reader.

use core::fmt;

use bytes::{Buf, Bytes, BytesMut};
use rancor::{fail, Error};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{count_structures, from_io, MsgPackReader, ValueKind};
use crate::context::SerializationContext;

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

/// An async reader that accumulates input until it holds whole MessagePack
/// structures, which decoders then drain synchronously.
///
/// The contract mirrors the async writer's: a decoder asks for a minimum
/// number of complete structures with [`fill_structures`](Self::fill_structures),
/// reads from [`buffered`](Self::buffered) with a borrowing
/// [`MsgPackReader`], and commits what it consumed with
/// [`advance`](Self::advance).
pub struct MsgPackAsyncReader<'a> {
    inner: &'a mut (dyn AsyncRead + Unpin + Send),
    buffer: BytesMut,
    consumed: usize,
    eof: bool,
}

impl<'a> MsgPackAsyncReader<'a> {
    /// Creates a reader over the given source.
    pub fn new(inner: &'a mut (dyn AsyncRead + Unpin + Send)) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            consumed: 0,
            eof: false,
        }
    }

    /// Returns the absolute offset of the first buffered byte.
    pub fn position(&self) -> usize {
        self.consumed
    }

    /// Returns the buffered, not yet consumed bytes.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Marks `len` buffered bytes as consumed.
    pub fn advance(&mut self, len: usize) {
        self.consumed += len;
        self.buffer.advance(len);
    }

    /// Consumes `len` buffered bytes as a refcounted slice sharing this
    /// reader's buffer.
    pub fn take_shared(&mut self, len: usize) -> Bytes {
        self.consumed += len;
        self.buffer.split_to(len).freeze()
    }

    /// Reads from the source until at least `min` whole structures are
    /// buffered, then returns the number of whole structures available.
    /// Counting stops at the soft `byte_budget`, but the first structure is
    /// always buffered completely. Checks for cancellation around every
    /// read.
    pub async fn fill_structures(
        &mut self,
        min: usize,
        byte_budget: usize,
        ctx: &SerializationContext,
    ) -> Result<usize, Error> {
        loop {
            ctx.check_cancelled()?;
            let count = count_structures(&self.buffer, min, byte_budget)?;
            if count >= min {
                return Ok(count);
            }
            if self.eof {
                fail!(UnexpectedEof {
                    pos: self.consumed + self.buffer.len(),
                });
            }
            let read = self
                .inner
                .read_buf(&mut self.buffer)
                .await
                .map_err(from_io)?;
            if read == 0 {
                self.eof = true;
            }
        }
    }

    async fn fill_bytes(&mut self, len: usize, ctx: &SerializationContext) -> Result<(), Error> {
        while self.buffer.len() < len {
            ctx.check_cancelled()?;
            if self.eof {
                fail!(UnexpectedEof {
                    pos: self.consumed + self.buffer.len(),
                });
            }
            let read = self
                .inner
                .read_buf(&mut self.buffer)
                .await
                .map_err(from_io)?;
            if read == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    /// Classifies the next value without consuming anything.
    pub async fn peek_kind(&mut self, ctx: &SerializationContext) -> Result<ValueKind, Error> {
        self.fill_bytes(1, ctx).await?;
        let mut reader = MsgPackReader::new(&self.buffer);
        reader.peek_kind()
    }

    /// Consumes a nil marker if one is next. Returns whether it did.
    pub async fn try_read_nil(&mut self, ctx: &SerializationContext) -> Result<bool, Error> {
        self.fill_bytes(1, ctx).await?;
        let read = {
            let mut reader = MsgPackReader::new(&self.buffer);
            reader.try_read_nil()?
        };
        if read {
            self.advance(1);
        }
        Ok(read)
    }

    /// Reads an array header, returning the element count.
    pub async fn read_array_header(&mut self, ctx: &SerializationContext) -> Result<u32, Error> {
        self.read_header(ctx, |reader| reader.read_array_header()).await
    }

    /// Reads a map header, returning the entry count.
    pub async fn read_map_header(&mut self, ctx: &SerializationContext) -> Result<u32, Error> {
        self.read_header(ctx, |reader| reader.read_map_header()).await
    }

    async fn read_header(
        &mut self,
        ctx: &SerializationContext,
        parse: impl Fn(&mut MsgPackReader<'_>) -> Result<u32, Error>,
    ) -> Result<u32, Error> {
        // Headers are at most marker + 4 length bytes.
        self.fill_bytes(1, ctx).await?;
        loop {
            let (outcome, used) = {
                let mut reader = MsgPackReader::new(&self.buffer);
                let outcome = parse(&mut reader);
                (outcome, reader.position())
            };
            match outcome {
                Ok(len) => {
                    self.advance(used);
                    return Ok(len);
                }
                Err(err) => {
                    // A short buffer and a genuine mismatch are
                    // indistinguishable here; retry with more input until
                    // the full header fits.
                    if self.buffer.len() < 5 && !self.eof {
                        self.fill_bytes(self.buffer.len() + 1, ctx).await?;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}
