//! The buffering async MessagePack writer.

use rancor::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{from_io, MsgPackWriter};
use crate::context::SerializationContext;

/// An async writer that accumulates encoded bytes in memory and flushes
/// them to the underlying sink at structure boundaries.
///
/// Synchronous encoding borrows a [`MsgPackWriter`] over the pending buffer
/// through [`sub_writer`](Self::sub_writer); the buffer only reaches the
/// sink through [`flush_if_appropriate`](Self::flush_if_appropriate) and
/// [`flush`](Self::flush), so a flush can never split a single value's
/// bytes.
pub struct MsgPackAsyncWriter<'a> {
    inner: &'a mut (dyn AsyncWrite + Unpin + Send),
    buffer: Vec<u8>,
    watermark: usize,
}

impl<'a> MsgPackAsyncWriter<'a> {
    /// Creates a writer over the given sink. `watermark` is the pending
    /// byte count past which [`flush_if_appropriate`](Self::flush_if_appropriate)
    /// actually flushes.
    pub fn new(inner: &'a mut (dyn AsyncWrite + Unpin + Send), watermark: usize) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(watermark.min(64 * 1024)),
            watermark,
        }
    }

    /// Borrows a synchronous writer over the pending buffer.
    ///
    /// The sub-writer reports [`over_watermark`](MsgPackWriter::over_watermark)
    /// relative to this writer's flush watermark.
    pub fn sub_writer(&mut self) -> MsgPackWriter<'_> {
        MsgPackWriter::with_watermark(&mut self.buffer, self.watermark)
    }

    /// Returns the number of bytes waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the pending buffer has grown past the watermark.
    pub fn is_time_to_flush(&self) -> bool {
        self.buffer.len() >= self.watermark
    }

    /// Flushes the pending buffer to the sink if it has grown past the
    /// watermark. Checks for cancellation first.
    pub async fn flush_if_appropriate(&mut self, ctx: &SerializationContext) -> Result<(), Error> {
        ctx.check_cancelled()?;
        if self.is_time_to_flush() {
            self.drain().await?;
        }
        Ok(())
    }

    /// Unconditionally drains the pending buffer and flushes the sink.
    pub async fn flush(&mut self, ctx: &SerializationContext) -> Result<(), Error> {
        ctx.check_cancelled()?;
        self.drain().await?;
        self.inner.flush().await.map_err(from_io)
    }

    async fn drain(&mut self) -> Result<(), Error> {
        if !self.buffer.is_empty() {
            self.inner
                .write_all(&self.buffer)
                .await
                .map_err(from_io)?;
            self.buffer.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flushes_only_past_the_watermark() {
        let mut sink = Vec::new();
        let ctx = SerializationContext::default();
        let mut writer = MsgPackAsyncWriter::new(&mut sink, 4);

        writer.sub_writer().write_int(1);
        writer.flush_if_appropriate(&ctx).await.unwrap();
        assert_eq!(writer.pending(), 1);

        writer.sub_writer().write_str("abcd");
        assert!(writer.is_time_to_flush());
        writer.flush_if_appropriate(&ctx).await.unwrap();
        assert_eq!(writer.pending(), 0);

        writer.sub_writer().write_int(2);
        writer.flush(&ctx).await.unwrap();
        assert_eq!(sink, [0x01, 0xa4, b'a', b'b', b'c', b'd', 0x02]);
    }
}
