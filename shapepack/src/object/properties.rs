//! Bound property accessors: shape-declared accessors paired with their
//! synthesized converters.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rancor::{fail, Error};

use crate::context::SerializationContext;
use crate::converter::{ArcConverter, Converter};
use crate::wire::{MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter};

#[derive(Debug)]
struct NoAccessor {
    name: &'static str,
}

impl fmt::Display for NoAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property operation `{}` has no accessor", self.name)
    }
}

impl core::error::Error for NoAccessor {}

#[derive(Debug)]
struct BufferedTypeMismatch;

impl fmt::Display for BufferedTypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffered property value does not match the property type")
    }
}

impl core::error::Error for BufferedTypeMismatch {}

/// The type-erased operations of one bound property of `T`.
///
/// Implemented by [`BoundProperty`], which knows the property's concrete
/// type; the object converters only see this object-safe surface.
#[async_trait]
pub(crate) trait PropertyOps<T>: Send + Sync {
    /// Whether the property can be written to the wire (has a getter).
    fn can_write(&self) -> bool;

    /// Whether the property can be read into an existing value (has a
    /// setter).
    fn can_read_into(&self) -> bool;

    /// Whether the property's converter prefers the async operations.
    fn converter_prefers_async(&self) -> bool;

    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error>;

    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error>;

    fn read_into(
        &self,
        value: &mut T,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error>;

    async fn read_into_async(
        &self,
        value: &mut T,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error>;

    /// Reads the property value into a box, for buffering ahead of a
    /// parameterized constructor.
    fn read_arg(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<Box<dyn Any + Send>, Error>;

    /// Applies a previously buffered value through the setter.
    fn apply_arg(&self, value: &mut T, arg: Box<dyn Any + Send>) -> Result<(), Error>;
}

pub(crate) struct BoundProperty<T, P> {
    pub get: Option<Arc<dyn Fn(&T) -> &P + Send + Sync>>,
    pub set: Option<Arc<dyn Fn(&mut T, P) + Send + Sync>>,
    pub converter: ArcConverter<P>,
}

#[async_trait]
impl<T, P> PropertyOps<T> for BoundProperty<T, P>
where
    T: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn can_write(&self) -> bool {
        self.get.is_some()
    }

    fn can_read_into(&self) -> bool {
        self.set.is_some()
    }

    fn converter_prefers_async(&self) -> bool {
        self.converter.prefer_async()
    }

    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let Some(get) = &self.get else {
            fail!(NoAccessor { name: "write" });
        };
        self.converter.write(get(value), writer, ctx)
    }

    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let Some(get) = &self.get else {
            fail!(NoAccessor { name: "write" });
        };
        self.converter.write_async(get(value), writer, ctx).await
    }

    fn read_into(
        &self,
        value: &mut T,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let Some(set) = &self.set else {
            fail!(NoAccessor { name: "read" });
        };
        let read = self.converter.read(reader, ctx)?;
        set(value, read);
        Ok(())
    }

    async fn read_into_async(
        &self,
        value: &mut T,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let Some(set) = &self.set else {
            fail!(NoAccessor { name: "read" });
        };
        let read = self.converter.read_async(reader, ctx).await?;
        set(value, read);
        Ok(())
    }

    fn read_arg(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<Box<dyn Any + Send>, Error> {
        Ok(Box::new(self.converter.read(reader, ctx)?))
    }

    fn apply_arg(&self, value: &mut T, arg: Box<dyn Any + Send>) -> Result<(), Error> {
        let Some(set) = &self.set else {
            fail!(NoAccessor { name: "apply" });
        };
        match arg.downcast::<P>() {
            Ok(read) => {
                set(value, *read);
                Ok(())
            }
            Err(_) => fail!(BufferedTypeMismatch),
        }
    }
}

/// One property of an object converter, fully bound: type-erased
/// operations plus the metadata the layout tables consult.
pub(crate) struct PropertyAccessor<T> {
    pub name: String,
    pub ops: Arc<dyn PropertyOps<T>>,
    pub prefer_async: bool,
    pub should_serialize: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    pub ctor_param: bool,
    /// Whether this property participates in serialization. False for
    /// setter-only properties and for those suppressed by
    /// `suppress_if_no_constructor_param`.
    pub writable: bool,
}

impl<T> PropertyAccessor<T> {
    /// Whether the serialization predicate admits this value. Properties
    /// without a predicate always pass.
    pub fn passes(&self, value: &T) -> bool {
        match &self.should_serialize {
            Some(predicate) => predicate(value),
            None => true,
        }
    }

    /// Whether decode can deliver this property at all, either through a
    /// setter or by buffering for a constructor parameter.
    pub fn can_deliver(&self) -> bool {
        self.ops.can_read_into() || self.ctor_param
    }
}
