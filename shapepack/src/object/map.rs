//! The object-as-map converter: properties encoded as `{name → value}`.

use async_trait::async_trait;
use hashbrown::HashMap;
use rancor::Error;

use super::properties::{PropertyAccessor, PropertyOps as _};
use super::{write_steps, ObjectCtor, ObjectHooks, StepPrefix, WireStep};
use crate::context::SerializationContext;
use crate::converter::{read_buffered, Converter};
use crate::hash::FxBuildHasher;
use crate::shape::ArgBag;
use crate::wire::{
    MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter, READ_BUDGET,
};

/// One property of the map layout, with its pre-encoded wire name.
pub(crate) struct NamedProperty<T> {
    pub encoded_name: Box<[u8]>,
    pub accessor: PropertyAccessor<T>,
}

/// Encodes and decodes an object as a MessagePack map keyed by property
/// name.
///
/// The serializable side is an ordered list walked in declaration order;
/// the deserializable side is keyed by the property name's UTF-8 bytes and
/// matched against raw key spans from the wire without allocating. Unknown
/// keys are skipped, never errors.
pub(crate) struct MapObjectConverter<T> {
    pub type_name: &'static str,
    pub props: Vec<NamedProperty<T>>,
    /// Indexes into `props` with a getter, in declaration order.
    pub serial_order: Vec<usize>,
    /// Property-name UTF-8 to index into `props`, for deliverable
    /// properties.
    pub by_key: HashMap<Box<[u8]>, usize, FxBuildHasher>,
    pub ctor: ObjectCtor<T>,
    pub hooks: ObjectHooks<T>,
    pub any_prefers_async: bool,
}

impl<T: Send + Sync + 'static> MapObjectConverter<T> {
    fn read_with_default(
        &self,
        ctor: &(dyn Fn() -> T + Send + Sync),
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        let mut value = ctor();
        let entries = reader.read_map_header()?;
        for _ in 0..entries {
            let key = reader.read_str_bytes()?;
            match self.by_key.get(key) {
                Some(&index) if self.props[index].accessor.ops.can_read_into() => {
                    self.props[index]
                        .accessor
                        .ops
                        .read_into(&mut value, reader, ctx)?;
                }
                _ => reader.skip(ctx)?,
            }
        }
        self.hooks.after(&mut value);
        Ok(value)
    }

    fn read_with_params(
        &self,
        build: &(dyn Fn(&mut ArgBag) -> Result<T, Error> + Send + Sync),
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        let mut bag = ArgBag::new();
        let entries = reader.read_map_header()?;
        for _ in 0..entries {
            let key = reader.read_str_bytes()?;
            match self.by_key.get(key) {
                Some(&index) => {
                    let prop = &self.props[index];
                    let arg = prop.accessor.ops.read_arg(reader, ctx)?;
                    bag.insert(&prop.accessor.name, arg);
                }
                None => reader.skip(ctx)?,
            }
        }
        let mut value = build(&mut bag)?;
        // Deliver whatever the constructor left behind through setters.
        for prop in &self.props {
            if prop.accessor.ops.can_read_into() {
                if let Some(arg) = bag.take_boxed(&prop.accessor.name) {
                    prop.accessor.ops.apply_arg(&mut value, arg)?;
                }
            }
        }
        self.hooks.after(&mut value);
        Ok(value)
    }

    fn included<'a>(&'a self, value: &T) -> impl Iterator<Item = &'a NamedProperty<T>> + 'a
    where
        T: 'a,
    {
        let passes: Vec<bool> = self
            .serial_order
            .iter()
            .map(|&index| self.props[index].accessor.passes(value))
            .collect();
        self.serial_order
            .iter()
            .zip(passes)
            .filter_map(|(&index, pass)| pass.then(|| &self.props[index]))
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Converter<T> for MapObjectConverter<T> {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        self.ctor.fail_if_missing(self.type_name)?;
        ctx.enter()?;
        let value = match &self.ctor {
            ObjectCtor::Default(ctor) => self.read_with_default(ctor.as_ref(), reader, ctx)?,
            ObjectCtor::Parameterized { build, .. } => {
                self.read_with_params(build.as_ref(), reader, ctx)?
            }
            ObjectCtor::Missing => unreachable!("checked above"),
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
        self.hooks.before(value);
        ctx.enter()?;
        let included: Vec<&NamedProperty<T>> = self.included(value).collect();
        writer.write_map_header(included.len() as u32);
        for prop in included {
            writer.write_raw(&prop.encoded_name);
            prop.accessor.ops.write(value, writer, ctx)?;
        }
        ctx.leave();
        Ok(())
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        let ObjectCtor::Default(ctor) = &self.ctor else {
            // Parameterized decoding buffers every property anyway, so
            // buffer the whole object and decode it in place.
            return read_buffered(self, reader, ctx).await;
        };

        ctx.enter()?;
        let mut value = ctor();
        let entries = reader.read_map_header(ctx).await? as usize;
        let mut done = 0;

        while done < entries {
            // An entry is two structures; never leave a key without its
            // value in the buffer.
            let available = reader.fill_structures(2, READ_BUDGET, ctx).await?;

            // Route this entry to the async path when its property asks
            // for it.
            let (async_index, key_len) = {
                let mut sub = MsgPackReader::new(reader.buffered());
                let key = sub.read_str_bytes()?;
                let index = self.by_key.get(key).copied();
                let prefers = index.is_some_and(|index| {
                    let accessor = &self.props[index].accessor;
                    accessor.prefer_async && accessor.ops.can_read_into()
                });
                (prefers.then_some(index).flatten(), sub.position())
            };
            if let Some(index) = async_index {
                reader.advance(key_len);
                self.props[index]
                    .accessor
                    .ops
                    .read_into_async(&mut value, reader, ctx)
                    .await?;
                done += 1;
                continue;
            }

            // Drain as many whole sync entries as are buffered.
            let pairs = (available / 2).max(1).min(entries - done);
            let (used, processed) = {
                let mut sub = MsgPackReader::new(reader.buffered());
                let mut committed = 0;
                let mut processed = 0;
                for _ in 0..pairs {
                    let key = sub.read_str_bytes()?;
                    let index = self.by_key.get(key).copied();
                    if index.is_some_and(|index| {
                        let accessor = &self.props[index].accessor;
                        accessor.prefer_async && accessor.ops.can_read_into()
                    }) {
                        break;
                    }
                    match index {
                        Some(index) if self.props[index].accessor.ops.can_read_into() => {
                            self.props[index]
                                .accessor
                                .ops
                                .read_into(&mut value, &mut sub, ctx)?;
                        }
                        _ => sub.skip(ctx)?,
                    }
                    committed = sub.position();
                    processed += 1;
                }
                (committed, processed)
            };
            reader.advance(used);
            done += processed;
        }

        self.hooks.after(&mut value);
        ctx.leave();
        Ok(value)
    }

    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        self.hooks.before(value);
        ctx.enter()?;

        let included: Vec<&NamedProperty<T>> = self.included(value).collect();
        writer
            .sub_writer()
            .write_map_header(included.len() as u32);

        let steps: Vec<WireStep<'_, T>> = included
            .iter()
            .map(|prop| WireStep {
                prefix: StepPrefix::Name(&prop.encoded_name),
                prop: Some(&prop.accessor),
            })
            .collect();
        write_steps(&steps, value, writer, ctx).await?;

        ctx.leave();
        Ok(())
    }

    fn prefer_async(&self) -> bool {
        self.any_prefers_async
    }
}
