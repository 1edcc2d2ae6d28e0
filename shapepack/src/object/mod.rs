//! The object converters: property tables, the two wire layouts, and the
//! polymorphic envelope.

pub(crate) mod array;
pub(crate) mod map;
pub(crate) mod properties;
pub(crate) mod union;

use core::fmt;
use std::sync::Arc;

use rancor::{fail, Error};

use self::properties::{PropertyAccessor, PropertyOps as _};
use crate::context::SerializationContext;
use crate::shape::ArgBag;
use crate::wire::{MsgPackAsyncWriter, MsgPackWriter};

#[derive(Debug)]
pub(crate) struct MissingConstructor {
    pub type_name: &'static str,
}

impl fmt::Display for MissingConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot deserialize {}: its shape declares no usable constructor",
            self.type_name
        )
    }
}

impl core::error::Error for MissingConstructor {}

/// How decode obtains an instance of the object type.
pub(crate) enum ObjectCtor<T> {
    /// No way to construct the type; decode fails.
    Missing,
    /// A parameterless constructor; properties are applied through their
    /// setters as they are read.
    Default(Arc<dyn Fn() -> T + Send + Sync>),
    /// A parameterized constructor; property values are buffered and the
    /// constructor is invoked once all entries are read.
    Parameterized {
        params: Arc<Vec<String>>,
        build: Arc<dyn Fn(&mut ArgBag) -> Result<T, Error> + Send + Sync>,
    },
}

impl<T> ObjectCtor<T> {
    pub fn fail_if_missing(&self, type_name: &'static str) -> Result<(), Error> {
        if matches!(self, Self::Missing) {
            fail!(MissingConstructor { type_name });
        }
        Ok(())
    }
}

/// The shared lifecycle hooks of an object converter.
pub(crate) struct ObjectHooks<T> {
    pub before_serialize: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    pub after_deserialize: Option<Arc<dyn Fn(&mut T) + Send + Sync>>,
}

impl<T> ObjectHooks<T> {
    pub fn before(&self, value: &T) {
        if let Some(hook) = &self.before_serialize {
            hook(value);
        }
    }

    pub fn after(&self, value: &mut T) {
        if let Some(hook) = &self.after_deserialize {
            hook(value);
        }
    }
}

/// The wire prefix written immediately before a property value.
pub(crate) enum StepPrefix<'p> {
    /// Nothing; the value's position carries its identity (array layout).
    None,
    /// The property's integer key (array layout encoded as a map).
    Index(u32),
    /// The property's pre-encoded name (map layout).
    Name(&'p [u8]),
}

/// One property write in an async encode plan.
pub(crate) struct WireStep<'p, T> {
    pub prefix: StepPrefix<'p>,
    /// `None` encodes a nil hole.
    pub prop: Option<&'p PropertyAccessor<T>>,
}

impl<T> WireStep<'_, T> {
    fn prefers_async(&self) -> bool {
        self.prop.is_some_and(|p| p.prefer_async)
    }

    fn write_prefix(&self, writer: &mut MsgPackWriter<'_>) {
        match self.prefix {
            StepPrefix::None => {}
            StepPrefix::Index(key) => writer.write_uint(u64::from(key)),
            StepPrefix::Name(encoded) => writer.write_raw(encoded),
        }
    }

    fn write_sync(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        self.write_prefix(writer);
        match self.prop {
            Some(prop) => prop.ops.write(value, writer, ctx),
            None => {
                writer.write_nil();
                Ok(())
            }
        }
    }
}

/// Drives an async encode plan with batched flushing.
///
/// Runs of properties that do not prefer async are written synchronously
/// into the writer's pending buffer, with a time-to-flush check between
/// properties and a flush offer between batches. Properties that prefer
/// async are awaited one at a time, their prefix written synchronously
/// first. Wire order always equals plan order, and a flush can only land
/// between two property writes.
pub(crate) async fn write_steps<T: Send + Sync + 'static>(
    steps: &[WireStep<'_, T>],
    value: &T,
    writer: &mut MsgPackAsyncWriter<'_>,
    ctx: &mut SerializationContext,
) -> Result<(), Error> {
    let total = steps.len();
    let mut i = 0;

    while i < total {
        let run_end = i + steps[i..]
            .iter()
            .take_while(|step| !step.prefers_async())
            .count();

        while i < run_end {
            {
                let mut sub = writer.sub_writer();
                while i < run_end && !sub.over_watermark() {
                    steps[i].write_sync(value, &mut sub, ctx)?;
                    i += 1;
                }
            }
            writer.flush_if_appropriate(ctx).await?;
        }

        while i < total && steps[i].prefers_async() {
            let step = &steps[i];
            step.write_prefix(&mut writer.sub_writer());
            match step.prop {
                Some(prop) => prop.ops.write_async(value, writer, ctx).await?,
                None => writer.sub_writer().write_nil(),
            }
            writer.flush_if_appropriate(ctx).await?;
            i += 1;
        }
    }

    Ok(())
}
