//! The public serializer façade.

use core::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rancor::{fail, Error};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::context::SerializationContext;
use crate::converter::{ArcConverter, Converter};
use crate::engine::{ConverterCache, SubtypeOverrides, TypeGraph};
use crate::shape::{Packable, UnionShape};
use crate::wire::{
    MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter,
    DEFAULT_FLUSH_WATERMARK,
};

#[derive(Debug)]
struct AlreadyRegistered {
    type_name: &'static str,
}

impl fmt::Display for AlreadyRegistered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "a converter for {} is already registered or synthesized",
            self.type_name
        )
    }
}

impl core::error::Error for AlreadyRegistered {}

/// Tunables applied to every call through one [`Serializer`].
#[derive(Clone, Debug)]
pub struct SerializerOptions {
    max_depth: usize,
    flush_watermark: usize,
}

impl SerializerOptions {
    /// Starts from the defaults: a nesting budget of 64 and a 4 KiB async
    /// flush watermark.
    pub fn new() -> Self {
        Self {
            max_depth: crate::context::DEFAULT_MAX_DEPTH,
            flush_watermark: DEFAULT_FLUSH_WATERMARK,
        }
    }

    /// Sets the nesting budget enforced during encode and decode.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the pending-byte watermark past which async encoding flushes.
    pub fn flush_watermark(mut self, watermark: usize) -> Self {
        self.flush_watermark = watermark;
        self
    }
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A MessagePack serializer with a per-instance converter cache.
///
/// Converters are synthesized from type shapes on first use and reused for
/// every later call; the cache is safe to share across threads. A fresh
/// serializer with default options is also available through the
/// crate-level [`to_bytes`] and [`from_bytes`] helpers.
#[derive(Default)]
pub struct Serializer {
    cache: ConverterCache,
    overrides: SubtypeOverrides,
    options: SerializerOptions,
}

impl Serializer {
    /// Creates a serializer with default options.
    pub fn new() -> Self {
        Self::with_options(SerializerOptions::new())
    }

    /// Creates a serializer with the given options.
    pub fn with_options(options: SerializerOptions) -> Self {
        Self {
            cache: ConverterCache::new(),
            overrides: SubtypeOverrides::new(),
            options,
        }
    }

    /// Creates a serialization context carrying this serializer's nesting
    /// budget, for use with the `*_with` call variants.
    pub fn context(&self) -> SerializationContext {
        SerializationContext::new(self.options.max_depth)
    }

    /// Returns the converter for `T`, synthesizing and caching it on first
    /// use.
    pub fn converter_for<T: Packable>(&self) -> Result<ArcConverter<T>, Error> {
        if let Some(cached) = self.cache.get::<T>() {
            return Ok(cached);
        }
        TypeGraph::new(&self.cache, &self.overrides).converter::<T>()
    }

    /// Registers a hand-written converter for `T`.
    ///
    /// Fails once a converter for `T` is already present, whether
    /// registered or synthesized: published converters are never replaced.
    pub fn register_converter<T: Packable>(
        &self,
        converter: impl Converter<T> + 'static,
    ) -> Result<(), Error> {
        let handle: ArcConverter<T> = Arc::new(converter);
        let retained = self.cache.try_insert(Arc::clone(&handle));
        if !Arc::ptr_eq(&handle, &retained) {
            fail!(AlreadyRegistered {
                type_name: core::any::type_name::<T>(),
            });
        }
        Ok(())
    }

    /// Registers the subtype mapping used when `T` is serialized, wholly
    /// replacing any shape-declared union for `T`.
    ///
    /// A previously synthesized converter for `T` is invalidated; the next
    /// use re-synthesizes against this mapping.
    pub fn register_subtypes<T: Packable>(&self, mapping: UnionShape<T>) {
        self.overrides.set(mapping);
        self.cache.evict::<T>();
    }

    /// Serializes a value to a fresh byte vector.
    pub fn to_bytes<T: Packable>(&self, value: &T) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.serialize_into(value, &mut out)?;
        Ok(out)
    }

    /// Serializes a value, appending to the given buffer.
    pub fn serialize_into<T: Packable>(&self, value: &T, out: &mut Vec<u8>) -> Result<(), Error> {
        let converter = self.converter_for::<T>()?;
        let mut ctx = self.context();
        converter.write(value, &mut MsgPackWriter::new(out), &mut ctx)
    }

    /// Deserializes a value from the given bytes.
    pub fn from_bytes<T: Packable>(&self, bytes: &[u8]) -> Result<T, Error> {
        let converter = self.converter_for::<T>()?;
        let mut ctx = self.context();
        converter.read(&mut MsgPackReader::new(bytes), &mut ctx)
    }

    /// Deserializes a value from a refcounted buffer, letting
    /// [`RawBytes`](crate::RawBytes) values share it instead of copying.
    pub fn from_shared<T: Packable>(&self, bytes: &Bytes) -> Result<T, Error> {
        let converter = self.converter_for::<T>()?;
        let mut ctx = self.context();
        converter.read(&mut MsgPackReader::from_shared(bytes), &mut ctx)
    }

    /// Serializes a value to an async writer, flushing in batches.
    pub async fn to_async_writer<T, W>(&self, value: &T, writer: &mut W) -> Result<(), Error>
    where
        T: Packable,
        W: AsyncWrite + Unpin + Send,
    {
        let mut ctx = self.context();
        self.to_async_writer_with(value, writer, &mut ctx).await
    }

    /// Serializes a value to an async writer under an explicit context,
    /// which may carry a cancellation token.
    pub async fn to_async_writer_with<T, W>(
        &self,
        value: &T,
        writer: &mut W,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error>
    where
        T: Packable,
        W: AsyncWrite + Unpin + Send,
    {
        let converter = self.converter_for::<T>()?;
        let mut writer = MsgPackAsyncWriter::new(writer, self.options.flush_watermark);
        converter.write_async(value, &mut writer, ctx).await?;
        writer.flush(ctx).await
    }

    /// Deserializes a value from an async reader.
    pub async fn from_async_reader<T, R>(&self, reader: &mut R) -> Result<T, Error>
    where
        T: Packable,
        R: AsyncRead + Unpin + Send,
    {
        let mut ctx = self.context();
        self.from_async_reader_with(reader, &mut ctx).await
    }

    /// Deserializes a value from an async reader under an explicit
    /// context, which may carry a cancellation token.
    pub async fn from_async_reader_with<T, R>(
        &self,
        reader: &mut R,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error>
    where
        T: Packable,
        R: AsyncRead + Unpin + Send,
    {
        let converter = self.converter_for::<T>()?;
        let mut reader = MsgPackAsyncReader::new(reader);
        converter.read_async(&mut reader, ctx).await
    }
}

/// Serializes a value with a fresh default [`Serializer`].
pub fn to_bytes<T: Packable>(value: &T) -> Result<Vec<u8>, Error> {
    Serializer::new().to_bytes(value)
}

/// Deserializes a value with a fresh default [`Serializer`].
pub fn from_bytes<T: Packable>(bytes: &[u8]) -> Result<T, Error> {
    Serializer::new().from_bytes(bytes)
}
