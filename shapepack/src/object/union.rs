//! The polymorphic envelope: `[alias | nil, payload]`.

use core::any::TypeId;
use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use rancor::{fail, Error};

use crate::context::SerializationContext;
use crate::converter::{ArcConverter, Converter};
use crate::hash::FxBuildHasher;
use crate::shape::Alias;
use crate::wire::{
    MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter, ValueKind,
};

#[derive(Debug)]
struct UnknownAlias {
    alias: Alias,
}

impl fmt::Display for UnknownAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown subtype alias {}", self.alias)
    }
}

impl core::error::Error for UnknownAlias {}

#[derive(Debug)]
struct UnknownSubType {
    base: &'static str,
}

impl fmt::Display for UnknownSubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value's runtime type is not a registered subtype of {}",
            self.base
        )
    }
}

impl core::error::Error for UnknownSubType {}

#[derive(Debug)]
struct MalformedEnvelope {
    len: u32,
}

impl fmt::Display for MalformedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "polymorphic envelope must be a 2-element array, found {} elements",
            self.len
        )
    }
}

impl core::error::Error for MalformedEnvelope {}

#[derive(Debug)]
struct MissingBaseCase {
    base: &'static str,
}

impl fmt::Display for MissingBaseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "envelope carries a nil alias but {} declares no base case",
            self.base
        )
    }
}

impl core::error::Error for MissingBaseCase {}

#[derive(Debug)]
struct CaseMismatch {
    type_name: &'static str,
}

impl fmt::Display for CaseMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value does not project to the dispatched subtype {}",
            self.type_name
        )
    }
}

impl core::error::Error for CaseMismatch {}

/// Adapts a subtype converter to the base type through the union's
/// projection closures.
pub(crate) struct CaseConverter<T, S> {
    pub inner: ArcConverter<S>,
    pub downcast: Arc<dyn Fn(&T) -> Option<&S> + Send + Sync>,
    pub upcast: Arc<dyn Fn(S) -> T + Send + Sync>,
}

#[async_trait]
impl<T, S> Converter<T> for CaseConverter<T, S>
where
    T: Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        Ok((self.upcast)(self.inner.read(reader, ctx)?))
    }

    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let Some(inner) = (self.downcast)(value) else {
            fail!(CaseMismatch {
                type_name: core::any::type_name::<S>(),
            });
        };
        self.inner.write(inner, writer, ctx)
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        Ok((self.upcast)(self.inner.read_async(reader, ctx).await?))
    }

    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let Some(inner) = (self.downcast)(value) else {
            fail!(CaseMismatch {
                type_name: core::any::type_name::<S>(),
            });
        };
        self.inner.write_async(inner, writer, ctx).await
    }

    fn prefer_async(&self) -> bool {
        self.inner.prefer_async()
    }
}

/// Dispatches between a base case and aliased subtype converters through
/// the two-element envelope.
///
/// Both tables are immutable once synthesized. Encode looks the value's
/// runtime type up in `by_type`; decode looks the wire alias up in
/// `by_alias`. An unknown alias is an error, never a skip: dropping it
/// would silently lose the value's identity.
pub(crate) struct UnionConverter<T> {
    pub base_type_name: &'static str,
    pub runtime_type: Option<Arc<dyn Fn(&T) -> TypeId + Send + Sync>>,
    pub base: Option<(TypeId, ArcConverter<T>)>,
    pub by_alias: HashMap<Alias, ArcConverter<T>, FxBuildHasher>,
    pub by_type: HashMap<TypeId, (Alias, ArcConverter<T>), FxBuildHasher>,
    pub any_prefers_async: bool,
}

impl<T: Send + Sync + 'static> UnionConverter<T> {
    /// Picks the encode-side case: `Some(alias)` plus converter for a
    /// subtype, `None` plus converter for the base.
    fn dispatch(&self, value: &T) -> Result<(Option<&Alias>, &ArcConverter<T>), Error> {
        let runtime = match &self.runtime_type {
            Some(project) => project(value),
            None => match &self.base {
                Some((type_id, _)) => *type_id,
                None => TypeId::of::<T>(),
            },
        };
        if let Some((alias, converter)) = self.by_type.get(&runtime) {
            return Ok((Some(alias), converter));
        }
        if let Some((base_id, converter)) = &self.base {
            if runtime == *base_id {
                return Ok((None, converter));
            }
        }
        fail!(UnknownSubType {
            base: self.base_type_name,
        });
    }

    fn alias_converter(&self, alias: Alias) -> Result<&ArcConverter<T>, Error> {
        match self.by_alias.get(&alias) {
            Some(converter) => Ok(converter),
            None => fail!(UnknownAlias { alias }),
        }
    }

    fn base_converter(&self) -> Result<&ArcConverter<T>, Error> {
        match &self.base {
            Some((_, converter)) => Ok(converter),
            None => fail!(MissingBaseCase {
                base: self.base_type_name,
            }),
        }
    }

    fn read_alias(reader: &mut MsgPackReader<'_>) -> Result<Option<Alias>, Error> {
        if reader.try_read_nil()? {
            return Ok(None);
        }
        match reader.peek_kind()? {
            ValueKind::String => Ok(Some(Alias::from(reader.read_str()?))),
            _ => Ok(Some(Alias::Int(reader.read_int()?))),
        }
    }

    fn check_len(len: u32) -> Result<(), Error> {
        if len != 2 {
            fail!(MalformedEnvelope { len });
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Converter<T> for UnionConverter<T> {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        ctx.enter()?;
        Self::check_len(reader.read_array_header()?)?;
        let value = match Self::read_alias(reader)? {
            None => self.base_converter()?.read(reader, ctx)?,
            Some(alias) => self.alias_converter(alias)?.read(reader, ctx)?,
        };
        ctx.leave();
        Ok(value)
    }

    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        ctx.enter()?;
        let (alias, converter) = self.dispatch(value)?;
        writer.write_array_header(2);
        match alias {
            Some(Alias::Int(alias)) => writer.write_int(*alias),
            Some(Alias::Str(alias)) => writer.write_str(alias),
            None => writer.write_nil(),
        }
        converter.write(value, writer, ctx)?;
        ctx.leave();
        Ok(())
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        ctx.enter()?;
        Self::check_len(reader.read_array_header(ctx).await?)?;

        // The alias is one small structure; buffer and parse it in place.
        reader.fill_structures(1, 0, ctx).await?;
        let (alias, used) = {
            let mut sub = MsgPackReader::new(reader.buffered());
            let alias = Self::read_alias(&mut sub)?;
            (alias, sub.position())
        };
        reader.advance(used);

        let value = match alias {
            None => self.base_converter()?.read_async(reader, ctx).await?,
            Some(alias) => {
                self.alias_converter(alias)?
                    .read_async(reader, ctx)
                    .await?
            }
        };
        ctx.leave();
        Ok(value)
    }

    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        ctx.enter()?;
        let (alias, converter) = self.dispatch(value)?;
        {
            let mut sub = writer.sub_writer();
            sub.write_array_header(2);
            match alias {
                Some(Alias::Int(alias)) => sub.write_int(*alias),
                Some(Alias::Str(alias)) => sub.write_str(alias),
                None => sub.write_nil(),
            }
        }
        converter.write_async(value, writer, ctx).await?;
        ctx.leave();
        Ok(())
    }

    fn prefer_async(&self) -> bool {
        self.any_prefers_async
    }
}
