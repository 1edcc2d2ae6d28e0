//! Converters for nullable, sequence, and dictionary types.

use core::hash::Hash;
use std::collections::HashMap;

use async_trait::async_trait;
use rancor::Error;

use super::{ArcConverter, Converter};
use crate::context::SerializationContext;
use crate::wire::{MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter};

/// The converter behind `Option<T>`: nil for `None`, the inner encoding
/// otherwise.
pub(crate) struct NullableConverter<T> {
    pub inner: ArcConverter<T>,
}

#[async_trait]
impl<T: Send + Sync + 'static> Converter<Option<T>> for NullableConverter<T> {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<Option<T>, Error> {
        if reader.try_read_nil()? {
            Ok(None)
        } else {
            Ok(Some(self.inner.read(reader, ctx)?))
        }
    }

    fn write(
        &self,
        value: &Option<T>,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        match value {
            Some(inner) => self.inner.write(inner, writer, ctx),
            None => {
                writer.write_nil();
                Ok(())
            }
        }
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<Option<T>, Error> {
        if reader.try_read_nil(ctx).await? {
            Ok(None)
        } else {
            Ok(Some(self.inner.read_async(reader, ctx).await?))
        }
    }

    async fn write_async(
        &self,
        value: &Option<T>,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        match value {
            Some(inner) => self.inner.write_async(inner, writer, ctx).await,
            None => {
                writer.sub_writer().write_nil();
                writer.flush_if_appropriate(ctx).await
            }
        }
    }

    fn prefer_async(&self) -> bool {
        self.inner.prefer_async()
    }
}

/// The converter behind `Vec<T>`: a MessagePack array of the element
/// encoding.
pub(crate) struct SequenceConverter<T> {
    pub element: ArcConverter<T>,
}

#[async_trait]
impl<T: Send + Sync + 'static> Converter<Vec<T>> for SequenceConverter<T> {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<Vec<T>, Error> {
        ctx.enter()?;
        let len = reader.read_array_header()? as usize;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(self.element.read(reader, ctx)?);
        }
        ctx.leave();
        Ok(out)
    }

    fn write(
        &self,
        value: &Vec<T>,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        ctx.enter()?;
        writer.write_array_header(value.len() as u32);
        for element in value {
            self.element.write(element, writer, ctx)?;
        }
        ctx.leave();
        Ok(())
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<Vec<T>, Error> {
        ctx.enter()?;
        let len = reader.read_array_header(ctx).await? as usize;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(self.element.read_async(reader, ctx).await?);
        }
        ctx.leave();
        Ok(out)
    }

    async fn write_async(
        &self,
        value: &Vec<T>,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        ctx.enter()?;
        writer.sub_writer().write_array_header(value.len() as u32);
        for element in value {
            self.element.write_async(element, writer, ctx).await?;
        }
        ctx.leave();
        Ok(())
    }

    fn prefer_async(&self) -> bool {
        self.element.prefer_async()
    }
}

/// The converter behind `HashMap<K, V>`: a MessagePack map of the key and
/// value encodings.
pub(crate) struct DictionaryConverter<K, V> {
    pub key: ArcConverter<K>,
    pub value: ArcConverter<V>,
}

#[async_trait]
impl<K, V> Converter<HashMap<K, V>> for DictionaryConverter<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<HashMap<K, V>, Error> {
        ctx.enter()?;
        let len = reader.read_map_header()? as usize;
        let mut out = HashMap::with_capacity(len.min(4096));
        for _ in 0..len {
            let key = self.key.read(reader, ctx)?;
            let value = self.value.read(reader, ctx)?;
            out.insert(key, value);
        }
        ctx.leave();
        Ok(out)
    }

    fn write(
        &self,
        value: &HashMap<K, V>,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        ctx.enter()?;
        writer.write_map_header(value.len() as u32);
        for (k, v) in value {
            self.key.write(k, writer, ctx)?;
            self.value.write(v, writer, ctx)?;
        }
        ctx.leave();
        Ok(())
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<HashMap<K, V>, Error> {
        ctx.enter()?;
        let len = reader.read_map_header(ctx).await? as usize;
        let mut out = HashMap::with_capacity(len.min(4096));
        for _ in 0..len {
            let key = self.key.read_async(reader, ctx).await?;
            let value = self.value.read_async(reader, ctx).await?;
            out.insert(key, value);
        }
        ctx.leave();
        Ok(out)
    }

    async fn write_async(
        &self,
        value: &HashMap<K, V>,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        ctx.enter()?;
        writer.sub_writer().write_map_header(value.len() as u32);
        for (k, v) in value {
            self.key.write_async(k, writer, ctx).await?;
            self.value.write_async(v, writer, ctx).await?;
        }
        ctx.leave();
        Ok(())
    }

    fn prefer_async(&self) -> bool {
        self.key.prefer_async() || self.value.prefer_async()
    }
}
