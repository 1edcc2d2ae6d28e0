//! The uniform codec contract and the built-in converters.

pub(crate) mod collections;
pub(crate) mod enums;
pub(crate) mod primitive;

use std::sync::Arc;

use async_trait::async_trait;
use rancor::Error;

use crate::context::SerializationContext;
use crate::wire::{
    MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter, READ_BUDGET,
};

pub(crate) use self::enums::EnumConverter;

/// A shared converter handle, as produced by synthesis and stored in the
/// cache.
pub type ArcConverter<T> = Arc<dyn Converter<T>>;

/// The codec for one type: a matched pair of encode and decode procedures,
/// plus their async counterparts.
///
/// `read` and `write` are inverses on every value the type's shape admits.
/// Converters are immutable once synthesized and may be shared freely
/// across threads; all per-call state lives in the
/// [`SerializationContext`].
///
/// The async operations have default implementations that bridge through
/// the sync pair at whole-structure granularity: `write_async` encodes into
/// the writer's pending buffer and offers it a flush, and `read_async`
/// buffers one whole structure and decodes it in place. Converters whose
/// values are large or internally batched override them.
#[async_trait]
pub trait Converter<T: Send + Sync + 'static>: Send + Sync {
    /// Decodes one value.
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error>;

    /// Encodes one value.
    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error>;

    /// Decodes one value from a buffering async reader.
    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        read_buffered(self, reader, ctx).await
    }

    /// Encodes one value into a buffering async writer.
    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        {
            let mut sub = writer.sub_writer();
            self.write(value, &mut sub, ctx)?;
        }
        writer.flush_if_appropriate(ctx).await
    }

    /// Whether async encode and decode paths should route this converter
    /// through its async operations rather than batching it synchronously.
    fn prefer_async(&self) -> bool {
        false
    }
}

/// Buffers one whole structure and decodes it with the sync `read`.
pub(crate) async fn read_buffered<T, C>(
    converter: &C,
    reader: &mut MsgPackAsyncReader<'_>,
    ctx: &mut SerializationContext,
) -> Result<T, Error>
where
    T: Send + Sync + 'static,
    C: Converter<T> + ?Sized,
{
    reader.fill_structures(1, READ_BUDGET, ctx).await?;
    let (value, used) = {
        let mut sub = MsgPackReader::new(reader.buffered());
        let value = converter.read(&mut sub, ctx)?;
        (value, sub.position())
    };
    reader.advance(used);
    Ok(value)
}
